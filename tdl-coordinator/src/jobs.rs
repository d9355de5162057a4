use std::time::{Duration, Instant};

use bytes::Bytes;

use common::utils::u64_from_bytes;
use common::{ClientToken, Key, ProtocolError, Task, TaskKind};

pub type JobId = u64;

/// A job context.
///
/// Lives from a valid submission until its result slots are drained.
#[derive(Debug, Clone)]
pub struct Job {
    /// Sequence number of the job on its coordinator.
    id: JobId,

    /// The kernel every task of the job runs.
    kind: TaskKind,

    /// Upper bound of the input range `[1, n]`.
    n: u64,

    /// Tasks generated at decomposition time, in index order.
    tasks: Vec<Task>,

    /// Results collected so far, in arrival order.
    results: Vec<u64>,

    /// Where the final reply goes.
    client: ClientToken,

    /// When the submission was accepted.
    started: Instant,
}

impl Job {
    pub fn new(id: JobId, kind: TaskKind, n: u64, tasks: Vec<Task>, client: ClientToken) -> Self {
        Self {
            id,
            kind,
            n,
            tasks,
            results: Vec::new(),
            client,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Result slot of task `index`.
    pub fn slot(&self, index: usize) -> Key {
        self.tasks[index].result_slot
    }

    pub fn client(&self) -> ClientToken {
        self.client
    }

    pub fn results(&self) -> &[u64] {
        &self.results
    }

    pub fn record(&mut self, value: u64) {
        self.results.push(value);
    }

    /// True once every task has reported.
    pub fn is_complete(&self) -> bool {
        self.results.len() == self.tasks.len()
    }

    pub fn aggregate(&self) -> u64 {
        self.results.iter().sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Split `[1, n]` into tasks of at most `chunk_size` values.
///
/// Task `i` covers `[i * chunk_size + 1, (i + 1) * chunk_size]`, the last one
/// clamped to `n`, and writes its result to `base_slot + i`. Callers size the
/// job with [`ProtocolConfig::task_count`] first.
///
/// [`ProtocolConfig::task_count`]: common::ProtocolConfig::task_count
pub fn decompose(kind: TaskKind, n: u64, chunk_size: u64, base_slot: Key) -> Vec<Task> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let count = n.div_ceil(chunk_size);
    (0..count)
        .map(|i| Task {
            kind,
            range_start: i * chunk_size + 1,
            range_end: (i + 1).saturating_mul(chunk_size).min(n),
            result_slot: base_slot + i,
        })
        .collect()
}

/// Parse the arguments of a job submission: exactly one, the decimal `n`.
pub fn parse_submission(args: &[Bytes]) -> Result<u64, ProtocolError> {
    match args {
        [arg] => u64_from_bytes(arg.clone())
            .map_err(|e| ProtocolError::InvalidArgument(format!("{:#}", e))),
        _ => Err(ProtocolError::InvalidArgument(format!(
            "expected 1 argument, got {}",
            args.len()
        ))),
    }
}

/// Text of the reply sent once a job is aggregated.
pub fn format_result(elapsed: Duration, total: u64) -> String {
    format!("Took: {:.3} seconds | Result: {}", elapsed.as_secs_f64(), total)
}
