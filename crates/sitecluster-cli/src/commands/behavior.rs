//! Behavior command implementation.

use anyhow::Result;

use super::common::load_config;

/// Print the behavior document as a JSON object (`{}` when none is configured).
pub fn execute() -> Result<()> {
    let (_, config) = load_config()?;
    println!("{}", config.behavior()?.to_json()?);
    Ok(())
}
