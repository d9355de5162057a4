use std::time::Duration;

use clap::Args;

use crate::error::{ConfigError, ProtocolError};
use crate::retry::RetryPolicy;
use crate::Key;

/// Well-known slot holding the list of unclaimed tasks.
pub const TASK_LIST_SLOT: Key = 10000;

/// First result slot; task `i` of a job writes to `RESULT_BASE_SLOT + i`.
pub const RESULT_BASE_SLOT: Key = 10001;

/// Number of values per task.
pub const CHUNK_SIZE: u64 = 10000;

/// Workers pick their task among this many entries at the head of the list.
pub const CLAIM_WINDOW: usize = 5;

/// Largest number of tasks a single job may be split into.
pub const MAX_TASKS: u64 = 100_000;

/// Settings shared by the coordinator and the workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    pub task_list_slot: Key,
    pub result_base_slot: Key,
    pub chunk_size: u64,
    pub claim_window: usize,

    /// Submissions needing more tasks than this are refused.
    pub max_tasks: u64,

    /// Delay before re-reading a slot that had nothing for us.
    pub poll_interval: Duration,

    /// Backoff for conflicted writes.
    pub retry: RetryPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            task_list_slot: TASK_LIST_SLOT,
            result_base_slot: RESULT_BASE_SLOT,
            chunk_size: CHUNK_SIZE,
            claim_window: CLAIM_WINDOW,
            max_tasks: MAX_TASKS,
            poll_interval: Duration::from_millis(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.claim_window == 0 {
            return Err(ConfigError::ZeroClaimWindow);
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::ZeroMaxTasks);
        }
        if self.result_base_slot == self.task_list_slot {
            return Err(ConfigError::OverlappingSlots(self.task_list_slot));
        }
        self.retry.validate()
    }

    /// Key of the result slot for task `index`.
    pub fn result_slot(&self, index: usize) -> Key {
        self.result_base_slot + index as Key
    }

    /// Number of tasks a job over `[1, n]` is split into.
    ///
    /// Fails if the job needs more than `max_tasks` tasks, or if its result
    /// slots would run past the key space or cover the task list slot.
    /// Nothing is allocated, so any `n` is safe to check.
    pub fn task_count(&self, n: u64) -> Result<u64, ProtocolError> {
        if self.chunk_size == 0 {
            return Err(ProtocolError::InvalidArgument("chunk size is zero".to_string()));
        }

        let count = n.div_ceil(self.chunk_size);
        if count == 0 {
            return Ok(0);
        }

        if count > self.max_tasks {
            return Err(ProtocolError::InvalidArgument(format!(
                "n = {} needs {} tasks, at most {} allowed",
                n, count, self.max_tasks
            )));
        }

        let last_slot = self.result_base_slot.checked_add(count - 1).ok_or_else(|| {
            ProtocolError::InvalidArgument(format!(
                "{} result slots from {} run past the last key",
                count, self.result_base_slot
            ))
        })?;

        if self.result_base_slot <= self.task_list_slot && last_slot >= self.task_list_slot {
            return Err(ProtocolError::InvalidArgument(format!(
                "{} tasks would need result slots covering the task list slot {}",
                count, self.task_list_slot
            )));
        }

        Ok(count)
    }
}

/// Command line view of [`ProtocolConfig`], meant to be flattened into a
/// binary's own arguments.
#[derive(Args, Debug, Clone)]
pub struct ProtocolArgs {
    /// Store slot holding the task list.
    #[arg(long, default_value_t = TASK_LIST_SLOT)]
    pub task_list_slot: Key,

    /// First store slot used for results.
    #[arg(long, default_value_t = RESULT_BASE_SLOT)]
    pub result_base_slot: Key,

    /// Number of values per task.
    #[arg(long, default_value_t = CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Workers claim a random task among this many at the head of the list.
    #[arg(long, default_value_t = CLAIM_WINDOW)]
    pub claim_window: usize,

    /// Refuse jobs that would need more tasks than this.
    #[arg(long, default_value_t = MAX_TASKS)]
    pub max_tasks: u64,

    /// Milliseconds between polls of a slot that had nothing ready.
    #[arg(long, default_value_t = 1)]
    pub poll_ms: u64,

    /// Milliseconds before the first retry of a conflicted write.
    #[arg(long, default_value_t = 1)]
    pub retry_initial_ms: u64,

    /// Upper bound in milliseconds for a single retry delay.
    #[arg(long, default_value_t = 250)]
    pub retry_max_ms: u64,

    /// Growth factor of the retry delay.
    #[arg(long, default_value_t = 2.0)]
    pub retry_multiplier: f64,

    /// Disable retry jitter.
    #[arg(long)]
    pub no_jitter: bool,
}

impl TryFrom<ProtocolArgs> for ProtocolConfig {
    type Error = ConfigError;

    fn try_from(args: ProtocolArgs) -> Result<Self, Self::Error> {
        let config = ProtocolConfig {
            task_list_slot: args.task_list_slot,
            result_base_slot: args.result_base_slot,
            chunk_size: args.chunk_size,
            claim_window: args.claim_window,
            max_tasks: args.max_tasks,
            poll_interval: Duration::from_millis(args.poll_ms),
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(args.retry_initial_ms),
                max_delay: Duration::from_millis(args.retry_max_ms),
                multiplier: args.retry_multiplier,
                jitter: !args.no_jitter,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
