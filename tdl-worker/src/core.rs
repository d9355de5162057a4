use std::cmp;
use std::mem;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use common::codec::{decode_tasks, encode_slot, encode_tasks};
use common::{
    Event, Host, Plugin, ProtocolConfig, ProtocolError, Reply, Request, SlotState, Task,
    UnwindNote,
};

#[derive(Debug, Default)]
pub enum WorkerState {
    /// Waiting for a task list snapshot.
    #[default]
    Polling,

    /// Removed `task` from the snapshot, waiting for the shorter list to commit.
    Claiming { task: Task },

    /// Ran `task`, waiting for its encoded result to land.
    Committing { task: Task, payload: Bytes },
}

impl WorkerState {
    pub fn is_polling(&self) -> bool {
        matches!(self, WorkerState::Polling)
    }

    pub fn task(&self) -> Option<&Task> {
        match self {
            WorkerState::Polling => None,
            WorkerState::Claiming { task } | WorkerState::Committing { task, .. } => Some(task),
        }
    }
}

/// Counters kept by a worker over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tasks this worker removed from the list.
    pub claimed: u64,

    /// Claims that lost a race on the task list.
    pub claim_conflicts: u64,

    /// Result writes that had to be retried.
    pub commit_conflicts: u64,

    /// Results that landed.
    pub committed: u64,
}

pub struct Worker {
    id: usize,
    config: ProtocolConfig,
    state: WorkerState,
    stats: WorkerStats,
    name: String,

    /// Consecutive conflicted writes, drives the backoff.
    conflicts: u32,

    rng: StdRng,
}

impl Worker {
    pub fn new(id: usize, config: ProtocolConfig) -> Self {
        Self::with_rng(id, config, StdRng::from_entropy())
    }

    /// Worker with a seeded source for task choice and jitter.
    pub fn with_seed(id: usize, config: ProtocolConfig, seed: u64) -> Self {
        Self::with_rng(id, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(id: usize, config: ProtocolConfig, rng: StdRng) -> Self {
        Self {
            id,
            config,
            state: WorkerState::Polling,
            stats: WorkerStats::default(),
            name: format!("worker-{}", id),
            conflicts: 0,
            rng,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// The task this worker has claimed and not yet committed, if any.
    pub fn held_task(&self) -> Option<&Task> {
        self.state.task()
    }

    fn backoff(&mut self) -> Duration {
        let delay = self.config.retry.delay(self.conflicts, &mut self.rng);
        self.conflicts = self.conflicts.saturating_add(1);
        delay
    }

    fn poll_later(&mut self, host: &mut dyn Host) {
        host.submit_after(
            self.config.poll_interval,
            Request::Get {
                key: self.config.task_list_slot,
            },
        );
    }

    fn advance(
        &mut self,
        state: WorkerState,
        event: Event,
        host: &mut dyn Host,
    ) -> anyhow::Result<WorkerState> {
        use WorkerState::*;

        let list_slot = self.config.task_list_slot;

        let next = match (state, event) {
            (Polling, Event::Fetched { key, payload }) if key == list_slot => {
                self.claim(payload, host)
            }

            (Claiming { task }, Event::Committed { key }) if key == list_slot => {
                self.stats.claimed += 1;
                self.conflicts = 0;
                debug!("{} claimed {}", self.name, task);
                self.execute(task, host)?
            }

            (Claiming { task }, Event::Conflicted { key }) if key == list_slot => {
                // The snapshot is stale; the task goes back to whoever wins.
                self.stats.claim_conflicts += 1;
                let delay = self.backoff();
                debug!(
                    "{} lost the race for {}, re-reading in {:?}",
                    self.name, task, delay
                );
                host.submit_after(delay, Request::Get { key: list_slot });
                Polling
            }

            (Committing { task, .. }, Event::Committed { key }) if key == task.result_slot => {
                self.stats.committed += 1;
                self.conflicts = 0;
                info!("{} committed {}", self.name, task);
                host.get(list_slot);
                Polling
            }

            (Committing { task, payload }, Event::Conflicted { key })
                if key == task.result_slot =>
            {
                self.stats.commit_conflicts += 1;
                let delay = self.backoff();
                warn!(
                    "{}: result write to slot {} conflicted, retrying in {:?}",
                    self.name, key, delay
                );
                host.submit_after(
                    delay,
                    Request::Put {
                        key,
                        payload: payload.clone(),
                    },
                );
                Committing { task, payload }
            }

            (state, event) => {
                warn!("{}: ignoring {:?} while {:?}", self.name, event, state);
                state
            }
        };
        Ok(next)
    }

    /// Take one task out of the snapshot and try to write the rest back.
    fn claim(&mut self, payload: Option<Bytes>, host: &mut dyn Host) -> WorkerState {
        let mut tasks = match decode_tasks(payload.as_deref()) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("{}: unreadable task list: {}", self.name, e);
                self.poll_later(host);
                return WorkerState::Polling;
            }
        };

        if tasks.is_empty() {
            self.poll_later(host);
            return WorkerState::Polling;
        }

        let window = cmp::min(self.config.claim_window, tasks.len());
        let index = self.rng.gen_range(0..window);
        let task = tasks.remove(index);

        match encode_tasks(&tasks) {
            Ok(rest) => {
                host.put(self.config.task_list_slot, rest);
                WorkerState::Claiming { task }
            }
            Err(e) => {
                warn!("{}: cannot encode task list: {}", self.name, e);
                self.poll_later(host);
                WorkerState::Polling
            }
        }
    }

    /// Run a claimed task and write its result.
    ///
    /// The claim is already committed. Once the result is encoded, the task
    /// stays held until the write lands; an encoding error names it.
    fn execute(&mut self, task: Task, host: &mut dyn Host) -> anyhow::Result<WorkerState> {
        let value = workload::execute(&task);
        let payload = encode_slot(&SlotState::Ready(value))
            .with_context(|| format!("encoding the result of {}", task))?;

        host.put(task.result_slot, payload.clone());
        Ok(WorkerState::Committing { task, payload })
    }
}

impl Plugin for Worker {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, host: &mut dyn Host) {
        host.get(self.config.task_list_slot);
    }

    fn handle(&mut self, event: Event, host: &mut dyn Host) -> anyhow::Result<()> {
        match event {
            Event::Command { kind, token, .. } => {
                let e = ProtocolError::UnknownCommand(kind);
                host.reply(Reply::text(token, e.to_string()));
            }
            event => {
                let state = mem::take(&mut self.state);
                let _note = state
                    .task()
                    .map(|task| UnwindNote::new(format!("{} dropped {}", self.name, task)));

                match self.advance(state, event, host) {
                    Ok(next) => self.state = next,
                    Err(e) => {
                        // Back to polling so the worker keeps taking tasks.
                        host.get(self.config.task_list_slot);
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}
