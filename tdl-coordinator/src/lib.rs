//! The coordinating side of the protocol: turns a client submission into
//! tasks on the shared task list and aggregates what workers commit.

pub mod core;
pub mod jobs;

pub use crate::core::{Coordinator, CoordinatorState};
pub use jobs::{Job, JobId};
