//! Kernels that tasks can run, and the table mapping task kinds to them.
//!
//! Every kernel is a pure function of an inclusive range and returns a
//! count. Results of the tasks of one job are summed by the coordinator, so
//! a kernel must be additive over adjacent ranges.

use common::{Task, TaskKind};
use tracing::debug;

pub mod count_primes;

/// A kernel takes an inclusive `[start, end]` range.
pub type Kernel = fn(start: u64, end: u64) -> u64;

/// The kernel for a task kind.
pub fn kernel(kind: TaskKind) -> Kernel {
    match kind {
        TaskKind::CountPrimes => count_primes::count_primes,
    }
}

/// Run a task to completion on the calling thread.
pub fn execute(task: &Task) -> u64 {
    let kernel = kernel(task.kind);
    let value = kernel(task.range_start, task.range_end);
    debug!("{} = {}", task, value);
    value
}
