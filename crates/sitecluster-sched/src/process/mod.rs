//! Local process execution.
//!
//! Treats the current host as a one-node cluster: jobs are detached
//! processes, identifiers are pids and `ps`/`kill` stand in for the batch
//! tools.

mod adapter;
pub mod parser;

pub use adapter::{LOCAL_QUEUE, ProcessCluster};
