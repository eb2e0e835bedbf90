//! Shared helpers for CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use sitecluster_sched::{Cluster, ClusterConfig, ExecContext, SystemRunner, connect};

/// Snapshot the process environment and derive the configuration.
pub fn load_config() -> Result<(ExecContext, ClusterConfig)> {
    let ctx = ExecContext::from_process().context("Failed to read the execution environment")?;
    let config = ClusterConfig::from_context(&ctx);
    Ok((ctx, config))
}

/// Connect to the backend selected by the environment.
pub fn connect_cluster() -> Result<Box<dyn Cluster>> {
    let (ctx, config) = load_config()?;
    let kind = config.require_backend()?;
    debug!(backend = %kind, work_dir = %ctx.work_dir().display(), "selected backend");
    Ok(connect(kind, &config, ctx, Arc::new(SystemRunner)))
}
