//! IBM Spectrum LSF integration.
//!
//! Jobs are submitted with `bsub`, tracked with `bjobs` and `bhist`, and
//! killed with `bkill`. Sub-node launches go through `blaunch` using the
//! host list LSF exports as `LSB_MCPU_HOSTS` or `LSB_HOSTS`.

mod adapter;
pub mod parser;

pub use adapter::LsfCluster;
