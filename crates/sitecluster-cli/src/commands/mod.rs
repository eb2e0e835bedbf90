//! CLI command implementations.

pub mod api;
pub mod behavior;
pub mod common;
pub mod kill;
pub mod nodes;
pub mod queues;
pub mod status;
pub mod submit;
