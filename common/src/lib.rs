//! A coordinator splits a computation into bounded tasks and publishes them
//! to a shared key-value store. Any number of workers race to claim those
//! tasks, run them and commit results back. All coordination goes through
//! per-key optimistic transactions on the store; there are no locks.
//!
//! This crate holds everything the coordinator and worker share: the task
//! model, the payload codec, the host seam both roles are driven through,
//! and an in-memory store that implements the transaction semantics.

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod host;
pub mod reactor;
pub mod retry;
pub mod store;
pub mod task;
pub mod utils;

/////////////////////////////////////////////////////////////////////////////
// Re-exports
/////////////////////////////////////////////////////////////////////////////

pub use config::{ProtocolArgs, ProtocolConfig};
pub use error::{CodecError, ConfigError, ProtocolError};
pub use event::{commands, ClientToken, Event, Reply};
pub use host::{Host, QueueHost, RecordingHost, Request};
pub use reactor::{Plugin, Reactor, UnwindNote};
pub use retry::RetryPolicy;
pub use store::{MemoryStore, SessionId, StoreHost};
pub use task::{SlotState, Task, TaskKind};

/////////////////////////////////////////////////////////////////////////////
// Store addressing
/////////////////////////////////////////////////////////////////////////////

/// Address of a slot in the shared store.
pub type Key = u64;
