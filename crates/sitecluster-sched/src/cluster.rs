//! The cluster contract implemented by every backend.
//!
//! ```text
//!   queues()      submit() ──(start_node set)──→ start_node()
//!                    │
//!                    ▼
//!               status() ──→ kill()        node_count()
//! ```
//!
//! | Method | Returns |
//! |--------|---------|
//! | `queues()` | queue names in backend order |
//! | `submit()` | job identifier, `""` when unparseable |
//! | `status()` | [`JobStatus`]; unknown ids are `UNKNOWNID`, never errors |
//! | `kill()` | [`KillOutcome`] aggregated over all ids |
//! | `node_count()` | addressable nodes of the current allocation |
//! | `start_node()` | identifier of the launched work |
//!
//! Exactly one backend is active per invocation; see [`connect`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, ClusterConfig};
use crate::context::ExecContext;
use crate::error::SchedResult;
use crate::job::{JobStatus, KillOutcome, SubmitRequest};
use crate::lsf::LsfCluster;
use crate::pbs::PbsCluster;
use crate::process::ProcessCluster;
use crate::runner::CommandRunner;
use crate::sge::SgeCluster;
use crate::slurm::SlurmCluster;

/// Scheduler-neutral job control.
///
/// Implementations are stateless between calls: each method builds one
/// native command line (occasionally two), runs it, and normalizes the
/// output.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Which batch system this is.
    fn kind(&self) -> BackendKind;

    /// List queue (partition) names.
    async fn queues(&self) -> SchedResult<Vec<String>>;

    /// Submit a new top-level job and return its identifier.
    ///
    /// Returns an empty string when the batch system accepted the job but
    /// its identifier could not be found in the output.
    async fn submit_job(&self, request: &SubmitRequest) -> SchedResult<String>;

    /// Submit a job, or launch on a sub-node when the request names one.
    async fn submit(&self, request: &SubmitRequest) -> SchedResult<String> {
        match request.start_node() {
            Some(index) => self.start_node(index, request.command()).await,
            None => self.submit_job(request).await,
        }
    }

    /// Query the canonical status of a job.
    ///
    /// With `with_exit`, a `COMPLETED` status carries the exit code.
    async fn status(&self, job_id: &str, with_exit: bool) -> SchedResult<JobStatus>;

    /// Terminate jobs. Already finished or unknown jobs count as success.
    async fn kill(&self, job_ids: &[String]) -> SchedResult<KillOutcome>;

    /// Number of nodes addressable by [`Cluster::start_node`].
    async fn node_count(&self) -> SchedResult<usize>;

    /// Run `command` on node `index` of the current allocation.
    async fn start_node(&self, index: usize, command: &[String]) -> SchedResult<String>;
}

/// Construct the adapter for `kind`.
pub fn connect(
    kind: BackendKind,
    config: &ClusterConfig,
    ctx: ExecContext,
    runner: Arc<dyn CommandRunner>,
) -> Box<dyn Cluster> {
    match kind {
        BackendKind::Pbs => Box::new(PbsCluster::new(ctx, runner).allow_user(config.allow_user)),
        BackendKind::Lsf => Box::new(LsfCluster::new(ctx, runner)),
        BackendKind::Sge => Box::new(SgeCluster::new(ctx, runner)),
        BackendKind::Slurm => {
            Box::new(SlurmCluster::new(ctx, runner).allow_user(config.allow_user))
        }
        BackendKind::Process => Box::new(ProcessCluster::new(ctx, runner)),
    }
}
