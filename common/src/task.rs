use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::commands;
use crate::Key;

/// The kernels a task can name.
///
/// Tasks never carry code. A worker maps the kind to a kernel through a
/// fixed table in the `workload` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Count the primes in an inclusive range.
    CountPrimes,
}

impl TaskKind {
    /// All kinds, in command order.
    pub const ALL: [TaskKind; 1] = [TaskKind::CountPrimes];

    /// The client command kind that submits a job of this kind.
    pub const fn command(self) -> u32 {
        match self {
            TaskKind::CountPrimes => commands::COUNT_PRIMES,
        }
    }

    pub fn from_command(kind: u32) -> Option<TaskKind> {
        Self::ALL.into_iter().find(|k| k.command() == kind)
    }

    pub const fn name(self) -> &'static str {
        match self {
            TaskKind::CountPrimes => "count_primes",
        }
    }

    pub fn try_named(name: &str) -> Option<TaskKind> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Task {
    /// Which kernel to run.
    pub kind: TaskKind,

    /// First value of the range, inclusive.
    pub range_start: u64,

    /// Last value of the range, inclusive.
    pub range_end: u64,

    /// Store key the result must be written to.
    pub result_slot: Key,
}

impl Task {
    /// Number of values covered by the range.
    pub fn len(&self) -> u64 {
        (self.range_end + 1).saturating_sub(self.range_start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..={}] -> slot {}",
            self.kind, self.range_start, self.range_end, self.result_slot
        )
    }
}

/// Content of a result slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SlotState {
    /// Nothing has been written yet.
    #[default]
    Empty,

    /// A worker committed this value.
    Ready(u64),

    /// The coordinator collected the value and freed the slot.
    Reclaimed,
}

impl SlotState {
    pub fn value(&self) -> Option<u64> {
        match self {
            SlotState::Ready(value) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kinds_map_back_to_task_kinds() {
        assert_eq!(
            TaskKind::from_command(commands::COUNT_PRIMES),
            Some(TaskKind::CountPrimes)
        );
        assert_eq!(TaskKind::from_command(commands::STATUS), None);
        assert_eq!(TaskKind::from_command(999), None);
    }

    #[test]
    fn kinds_are_addressable_by_name() {
        assert_eq!(TaskKind::try_named("count_primes"), Some(TaskKind::CountPrimes));
        assert_eq!(TaskKind::try_named("wc"), None);
    }

    #[test]
    fn task_len_is_inclusive() {
        let task = Task {
            kind: TaskKind::CountPrimes,
            range_start: 10001,
            range_end: 10005,
            result_slot: 10002,
        };
        assert_eq!(task.len(), 5);
        assert!(!task.is_empty());
    }

    #[test]
    fn only_ready_slots_carry_a_value() {
        assert_eq!(SlotState::Ready(7).value(), Some(7));
        assert_eq!(SlotState::Empty.value(), None);
        assert_eq!(SlotState::Reclaimed.value(), None);
    }
}
