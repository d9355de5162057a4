//! The working side of the protocol: claims tasks from the shared task list,
//! runs them and commits their results.

pub mod core;

pub use crate::core::{Worker, WorkerState, WorkerStats};
