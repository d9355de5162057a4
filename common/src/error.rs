use thiserror::Error;

use crate::Key;

/// Errors of the task protocol.
///
/// Everything except [`ProtocolError::Conflict`] is reported back to the
/// client that caused it. Conflicts are retried by whoever issued the write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Malformed or wrong-arity submission.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A job is already in flight on this coordinator.
    #[error("already computing")]
    AlreadyComputing,

    /// An optimistic write lost a race.
    #[error("write to slot {key} conflicted")]
    Conflict { key: Key },

    /// The handler does not know this command kind.
    #[error("unknown command {0}")]
    UnknownCommand(u32),
}

/// Failure to encode or decode a store payload.
#[derive(Debug, Error)]
#[error("malformed payload: {0}")]
pub struct CodecError(#[from] serde_json::Error);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("claim window must be greater than zero")]
    ZeroClaimWindow,

    #[error("max tasks must be greater than zero")]
    ZeroMaxTasks,

    #[error("result slots must not start at the task list slot {0}")]
    OverlappingSlots(Key),

    #[error("retry multiplier must be >= 1.0, got {0}")]
    RetryMultiplier(String),

    #[error("initial retry delay cannot exceed the maximum retry delay")]
    RetryDelays,
}
