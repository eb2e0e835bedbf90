//! SLURM integration for HPC job submission.
//!
//! `sbatch` submits, `squeue` reports live state and `scancel` kills.
//! Inside an allocation `srun --relative` places work on a single node.

mod adapter;
pub mod parser;

pub use adapter::SlurmCluster;
