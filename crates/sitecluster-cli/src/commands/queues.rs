//! Queues command implementation.

use anyhow::Result;

use super::common::connect_cluster;

/// Print queue names, one per line.
pub async fn execute() -> Result<()> {
    let cluster = connect_cluster()?;
    for queue in cluster.queues().await? {
        println!("{queue}");
    }
    Ok(())
}
