//! Status command implementation.

use anyhow::Result;
use tracing::info;

use super::common::connect_cluster;

/// Print `STATE` or, with `add_exit_status`, `COMPLETED <code>` for finished jobs.
pub async fn execute(job_id: &str, add_exit_status: bool) -> Result<()> {
    let cluster = connect_cluster()?;
    let status = cluster.status(job_id, add_exit_status).await?;
    info!(job_id, state = %status.state(), "status");
    println!("{status}");
    Ok(())
}
