//! Sun/Univa/Son of Grid Engine integration.
//!
//! `qsub` submits, `qstat` lists live jobs and `qacct` answers for jobs
//! that have left the queue. Parallel-environment hosts come from the file
//! named by `PE_HOSTFILE`.

mod adapter;
pub mod parser;

pub use adapter::SgeCluster;
