//! Scheduler-neutral job control for HPC batch systems
//!
//! This crate puts one small contract in front of five very different job
//! schedulers, so that a workflow engine can submit, monitor and cancel
//! jobs without knowing which batch system the site runs.
//!
//! # Overview
//!
//! Every operation translates to a native command line, runs it, and
//! normalizes the output:
//! 1. **Submission**: request fields become scheduler flags in a fixed order
//! 2. **Status**: native state codes map onto five canonical states
//! 3. **Kill**: per-identifier interpretation of the kill tool's output
//! 4. **Nodes**: sub-node launches inside the current allocation
//!
//! # Supported Schedulers
//!
//! | Backend | Commands | Marker |
//! |---------|----------|--------|
//! | PBS/Torque | qsub, qstat, qdel, pbsdsh | `SITE_CLUSTER_USE_PBS` |
//! | LSF | bsub, bjobs, bhist, bkill, blaunch | `SITE_CLUSTER_USE_LSF` |
//! | Grid Engine | qsub, qstat, qacct, qdel, qrsh | `SITE_CLUSTER_USE_SGE` |
//! | SLURM | sbatch, squeue, scancel, srun | `SITE_CLUSTER_USE_SLURM` |
//! | Local processes | ps, kill | `SITE_CLUSTER_USE_SUBPROCESS` |
//!
//! # Canonical States
//!
//! `PENDING`, `RUNNING`, `SUSPENDED`, `COMPLETED` and `UNKNOWNID`. An exit
//! code accompanies `COMPLETED` only when asked for.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sitecluster_sched::{ClusterConfig, ExecContext, SubmitRequest, SystemRunner, connect};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = ExecContext::from_process()?;
//!     let config = ClusterConfig::from_context(&ctx);
//!     let cluster = connect(config.require_backend()?, &config, ctx, Arc::new(SystemRunner));
//!
//!     let request = SubmitRequest::new(["./simulate.sh", "input.dat"])
//!         .with_queue("batch")
//!         .with_job_name("sim");
//!     let job_id = cluster.submit(&request).await?;
//!
//!     println!("{}", cluster.status(&job_id, true).await?);
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod context;
pub mod depend;
pub mod error;
pub mod job;
pub mod lsf;
pub mod nodes;
pub mod pbs;
pub mod process;
pub mod runner;
mod scan;
pub mod sge;
pub mod slurm;

// Re-exports
pub use cluster::{Cluster, connect};
pub use config::{API_VERSIONS, BackendKind, Behavior, BehaviorProfile, ClusterConfig, MemoryMapping};
pub use context::ExecContext;
pub use error::{SchedError, SchedResult};
pub use job::{JobState, JobStatus, KillOutcome, SubmitRequest};
pub use lsf::LsfCluster;
pub use nodes::NodeAllocation;
pub use pbs::PbsCluster;
pub use process::ProcessCluster;
pub use runner::{Capture, CommandOutput, CommandRunner, Invocation, MockRunner, SystemRunner};
pub use sge::SgeCluster;
pub use slurm::SlurmCluster;
