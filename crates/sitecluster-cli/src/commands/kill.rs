//! Kill command implementation.

use anyhow::Result;
use tracing::info;

use super::common::connect_cluster;

/// Kill jobs and print the aggregate result code.
pub async fn execute(job_ids: &[String]) -> Result<()> {
    let cluster = connect_cluster()?;
    let outcome = cluster.kill(job_ids).await?;
    info!(jobs = job_ids.len(), ?outcome, "kill");
    println!("{}", outcome.code());
    Ok(())
}
