//! PBS (Portable Batch System) integration.
//!
//! Supports PBS/Torque and PBS Pro through `qsub`, `qstat`, `qdel` and
//! `pbsdsh`. Allocation metadata comes from `PBS_JOBID`, `PBS_NUM_NODES`
//! and `PBS_NP`.

mod adapter;
pub mod parser;

pub use adapter::PbsCluster;
