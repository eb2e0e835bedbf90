//! Node commands: `nodecount` and `startnode`.

use anyhow::Result;

use super::common::connect_cluster;

/// Print the number of addressable nodes.
pub async fn execute_count() -> Result<()> {
    let cluster = connect_cluster()?;
    println!("{}", cluster.node_count().await?);
    Ok(())
}

/// Run a command on node `index` and print the returned identifier.
pub async fn execute_start(index: usize, command: &[String]) -> Result<()> {
    let cluster = connect_cluster()?;
    println!("{}", cluster.start_node(index, command).await?);
    Ok(())
}
