use std::fmt;
use std::mem;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use common::codec::{decode_slot, decode_tasks, encode_slot, encode_tasks};
use common::{
    commands, ClientToken, Event, Host, Plugin, ProtocolConfig, ProtocolError, Reply, Request,
    SlotState, TaskKind, UnwindNote,
};

use crate::jobs::{self, Job, JobId};

/// Where a publish attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    /// Waiting for the current task list.
    Reading,

    /// Waiting for the extended task list to commit.
    Writing,
}

/// Where the reset of one result slot stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStage {
    /// Waiting for the sentinel write to commit.
    Writing,

    /// The write conflicted; waiting for a fresh read before writing again.
    Refreshing,
}

/// Lifecycle of the coordinator. Every state but `Idle` owns the active job.
#[derive(Debug, Default)]
pub enum CoordinatorState {
    #[default]
    Idle,

    PublishingTasks { job: Job, stage: PublishStage },

    /// Polling the result slot of task `next`.
    CollectingResults { job: Job, next: usize },

    /// Resetting the result slot of task `index`, last to first.
    Draining {
        job: Job,
        index: usize,
        stage: DrainStage,
    },
}

impl CoordinatorState {
    pub fn job(&self) -> Option<&Job> {
        match self {
            CoordinatorState::Idle => None,
            CoordinatorState::PublishingTasks { job, .. }
            | CoordinatorState::CollectingResults { job, .. }
            | CoordinatorState::Draining { job, .. } => Some(job),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CoordinatorState::Idle)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::PublishingTasks { job, .. } => write!(
                f,
                "job {} (n={}): publishing {} tasks",
                job.id(),
                job.n(),
                job.task_count()
            ),
            CoordinatorState::CollectingResults { job, .. } => write!(
                f,
                "job {} (n={}): collecting {}/{} results",
                job.id(),
                job.n(),
                job.results().len(),
                job.task_count()
            ),
            CoordinatorState::Draining { job, index, .. } => write!(
                f,
                "job {} (n={}): draining {} result slots",
                job.id(),
                job.n(),
                index + 1
            ),
        }
    }
}

/// Accepts one job at a time, publishes its tasks to the shared task list and
/// gathers the results workers commit.
pub struct Coordinator {
    config: ProtocolConfig,
    state: CoordinatorState,
    next_job_id: JobId,

    /// Consecutive conflicted writes, drives the backoff.
    conflicts: u32,

    rng: StdRng,
}

impl Coordinator {
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Coordinator with a seeded jitter source, for reproducible runs.
    pub fn with_seed(config: ProtocolConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: ProtocolConfig, rng: StdRng) -> Self {
        Self {
            config,
            state: CoordinatorState::Idle,
            next_job_id: 1,
            conflicts: 0,
            rng,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// One-line description of what the coordinator is doing.
    pub fn status(&self) -> String {
        self.state.to_string()
    }

    fn on_command(&mut self, kind: u32, args: &[Bytes], token: ClientToken, host: &mut dyn Host) {
        if kind == commands::STATUS {
            host.reply(Reply::text(token, self.status()));
            return;
        }

        let result = match TaskKind::from_command(kind) {
            Some(task_kind) => self.submit(task_kind, args, token, host),
            None => Err(ProtocolError::UnknownCommand(kind)),
        };

        if let Err(e) = result {
            info!("Rejected command {} from {}: {}", kind, token, e);
            host.reply(Reply::text(token, e.to_string()));
        }
    }

    /// Validate a submission and start its job.
    fn submit(
        &mut self,
        kind: TaskKind,
        args: &[Bytes],
        token: ClientToken,
        host: &mut dyn Host,
    ) -> Result<(), ProtocolError> {
        if !self.state.is_idle() {
            return Err(ProtocolError::AlreadyComputing);
        }

        let n = jobs::parse_submission(args)?;
        self.config.task_count(n)?;
        let tasks = jobs::decompose(
            kind,
            n,
            self.config.chunk_size,
            self.config.result_base_slot,
        );

        let id = self.next_job_id;
        self.next_job_id += 1;
        let job = Job::new(id, kind, n, tasks, token);

        if job.task_count() == 0 {
            info!("Job {} has nothing to compute", id);
            host.reply(Reply::text(token, jobs::format_result(job.elapsed(), 0)));
            return Ok(());
        }

        info!("Job {} accepted: {} n={} in {} tasks", id, kind, n, job.task_count());
        self.conflicts = 0;
        host.get(self.config.task_list_slot);
        self.state = CoordinatorState::PublishingTasks {
            job,
            stage: PublishStage::Reading,
        };

        Ok(())
    }

    fn backoff(&mut self) -> std::time::Duration {
        let delay = self.config.retry.delay(self.conflicts, &mut self.rng);
        self.conflicts = self.conflicts.saturating_add(1);
        delay
    }

    /// Move the state machine forward on a store notification.
    ///
    /// Notifications that do not match the current state are logged and
    /// ignored; the state is never lost.
    fn advance(
        &mut self,
        state: CoordinatorState,
        event: Event,
        host: &mut dyn Host,
    ) -> CoordinatorState {
        use CoordinatorState::*;

        let list_slot = self.config.task_list_slot;

        match (state, event) {
            (
                PublishingTasks {
                    job,
                    stage: PublishStage::Reading,
                },
                Event::Fetched { key, payload },
            ) if key == list_slot => self.publish(job, payload, host),

            (
                PublishingTasks {
                    job,
                    stage: PublishStage::Writing,
                },
                Event::Committed { key },
            ) if key == list_slot => {
                self.conflicts = 0;
                info!("Job {} published {} tasks", job.id(), job.task_count());
                host.get(job.slot(0));
                CollectingResults { job, next: 0 }
            }

            (
                PublishingTasks {
                    job,
                    stage: PublishStage::Writing,
                },
                Event::Conflicted { key },
            ) if key == list_slot => {
                let delay = self.backoff();
                warn!(
                    "Job {}: task list changed under us, re-reading in {:?}",
                    job.id(),
                    delay
                );
                host.submit_after(delay, Request::Get { key: list_slot });
                PublishingTasks {
                    job,
                    stage: PublishStage::Reading,
                }
            }

            (CollectingResults { job, next }, Event::Fetched { key, payload })
                if key == job.slot(next) =>
            {
                self.collect(job, next, payload, host)
            }

            (
                Draining {
                    job,
                    index,
                    stage: DrainStage::Writing,
                },
                Event::Committed { key },
            ) if key == job.slot(index) => {
                self.conflicts = 0;
                if index == 0 {
                    info!("Job {} drained, ready for the next job", job.id());
                    Idle
                } else {
                    self.reclaim(job, index - 1, host)
                }
            }

            (
                Draining {
                    job,
                    index,
                    stage: DrainStage::Writing,
                },
                Event::Conflicted { key },
            ) if key == job.slot(index) => {
                let delay = self.backoff();
                warn!(
                    "Job {}: reset of slot {} conflicted, re-reading in {:?}",
                    job.id(),
                    key,
                    delay
                );
                host.submit_after(delay, Request::Get { key });
                Draining {
                    job,
                    index,
                    stage: DrainStage::Refreshing,
                }
            }

            (
                Draining {
                    job,
                    index,
                    stage: DrainStage::Refreshing,
                },
                Event::Fetched { key, .. },
            ) if key == job.slot(index) => self.reclaim(job, index, host),

            (state, event) => {
                warn!("Ignoring {:?} while {}", event, state);
                state
            }
        }
    }

    /// Append the job's tasks to the task list we just read and write it back.
    fn publish(
        &mut self,
        job: Job,
        payload: Option<Bytes>,
        host: &mut dyn Host,
    ) -> CoordinatorState {
        let list_slot = self.config.task_list_slot;

        let encoded = decode_tasks(payload.as_deref()).and_then(|mut list| {
            list.extend_from_slice(job.tasks());
            encode_tasks(&list)
        });

        match encoded {
            Ok(bytes) => {
                debug!("Job {}: appending {} tasks to the task list", job.id(), job.task_count());
                host.put(list_slot, bytes);
                CoordinatorState::PublishingTasks {
                    job,
                    stage: PublishStage::Writing,
                }
            }
            Err(e) => {
                // Overwriting a list we cannot read could drop someone's tasks.
                let delay = self.backoff();
                error!("Job {}: cannot use task list ({}), re-reading in {:?}", job.id(), e, delay);
                host.submit_after(delay, Request::Get { key: list_slot });
                CoordinatorState::PublishingTasks {
                    job,
                    stage: PublishStage::Reading,
                }
            }
        }
    }

    /// Handle the content of the result slot of task `next`.
    fn collect(
        &mut self,
        mut job: Job,
        next: usize,
        payload: Option<Bytes>,
        host: &mut dyn Host,
    ) -> CoordinatorState {
        let slot = job.slot(next);

        let value = match decode_slot(payload.as_deref()) {
            Ok(state) => state.value(),
            Err(e) => {
                warn!("Job {}: unreadable result in slot {}: {}", job.id(), slot, e);
                None
            }
        };

        let Some(value) = value else {
            host.submit_after(self.config.poll_interval, Request::Get { key: slot });
            return CoordinatorState::CollectingResults { job, next };
        };

        job.record(value);
        debug!(
            "Job {}: received {}/{} results",
            job.id(),
            job.results().len(),
            job.task_count()
        );

        if !job.is_complete() {
            host.get(job.slot(next + 1));
            return CoordinatorState::CollectingResults { job, next: next + 1 };
        }

        let total = job.aggregate();
        let elapsed = job.elapsed();
        info!("Job {} done: {} = {} in {:?}", job.id(), job.kind(), total, elapsed);
        host.reply(Reply::text(job.client(), jobs::format_result(elapsed, total)));

        let last = job.task_count() - 1;
        self.reclaim(job, last, host)
    }

    /// Write the sentinel into the result slot of task `index`.
    fn reclaim(&mut self, job: Job, index: usize, host: &mut dyn Host) -> CoordinatorState {
        let slot = job.slot(index);

        match encode_slot(&SlotState::Reclaimed) {
            Ok(bytes) => {
                host.put(slot, bytes);
                CoordinatorState::Draining {
                    job,
                    index,
                    stage: DrainStage::Writing,
                }
            }
            Err(e) => {
                let delay = self.backoff();
                error!("Job {}: cannot encode sentinel for slot {}: {}", job.id(), slot, e);
                host.submit_after(delay, Request::Get { key: slot });
                CoordinatorState::Draining {
                    job,
                    index,
                    stage: DrainStage::Refreshing,
                }
            }
        }
    }
}

impl Plugin for Coordinator {
    fn name(&self) -> &str {
        "coordinator"
    }

    fn handle(&mut self, event: Event, host: &mut dyn Host) -> anyhow::Result<()> {
        match event {
            Event::Command { kind, args, token } => self.on_command(kind, &args, token, host),
            event => {
                let state = mem::take(&mut self.state);
                let _note = state.job().map(|job| {
                    UnwindNote::new(format!("coordinator dropped job {} (n={})", job.id(), job.n()))
                });
                self.state = self.advance(state, event, host);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.status())
            .field("next_job_id", &self.next_job_id)
            .field("conflicts", &self.conflicts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use common::{Key, RecordingHost, RetryPolicy, Task};

    use super::*;

    const LIST: Key = 10000;

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            retry: RetryPolicy::immediate(),
            poll_interval: Duration::from_millis(3),
            ..Default::default()
        }
    }

    fn submit(coordinator: &mut Coordinator, host: &mut RecordingHost, n: &str, token: u64) {
        coordinator
            .handle(
                Event::Command {
                    kind: commands::COUNT_PRIMES,
                    args: vec![Bytes::copy_from_slice(n.as_bytes())],
                    token: ClientToken(token),
                },
                host,
            )
            .unwrap();
    }

    fn deliver(coordinator: &mut Coordinator, host: &mut RecordingHost, event: Event) {
        coordinator.handle(event, host).unwrap();
    }

    fn ready(value: u64) -> Option<Bytes> {
        Some(encode_slot(&SlotState::Ready(value)).unwrap())
    }

    fn reclaimed(key: Key) -> Request {
        Request::Put {
            key,
            payload: encode_slot(&SlotState::Reclaimed).unwrap(),
        }
    }

    fn published_tasks(request: &Request) -> Vec<Task> {
        match request {
            Request::Put { key, payload } if *key == LIST => {
                decode_tasks(Some(&payload[..])).unwrap()
            }
            other => panic!("expected a task list write, got {:?}", other),
        }
    }

    /// Drive a submission up to the point where results are being collected.
    fn publish(coordinator: &mut Coordinator, host: &mut RecordingHost, n: &str) {
        submit(coordinator, host, n, 1);
        assert_eq!(host.take_requests(), vec![Request::Get { key: LIST }]);

        deliver(coordinator, host, Event::Fetched { key: LIST, payload: None });
        host.take_requests();

        deliver(coordinator, host, Event::Committed { key: LIST });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10001 }]);
    }

    #[test]
    fn small_job_runs_to_completion() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();

        submit(&mut coordinator, &mut host, "30", 4);
        assert_eq!(host.take_requests(), vec![Request::Get { key: LIST }]);

        deliver(&mut coordinator, &mut host, Event::Fetched { key: LIST, payload: None });
        let requests = host.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            published_tasks(&requests[0]),
            vec![Task {
                kind: TaskKind::CountPrimes,
                range_start: 1,
                range_end: 30,
                result_slot: 10001,
            }]
        );

        deliver(&mut coordinator, &mut host, Event::Committed { key: LIST });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10001 }]);

        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10001, payload: ready(10) });
        let replies = host.take_replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].token, ClientToken(4));
        let text = replies[0].to_text();
        assert!(text.starts_with("Took: "), "{text}");
        assert!(text.ends_with(" seconds | Result: 10"), "{text}");
        assert_eq!(host.take_requests(), vec![reclaimed(10001)]);

        deliver(&mut coordinator, &mut host, Event::Committed { key: 10001 });
        assert!(coordinator.state().is_idle());
        assert!(host.requests.is_empty());
    }

    #[test]
    fn tasks_are_appended_to_what_is_already_listed() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        submit(&mut coordinator, &mut host, "20000", 1);
        host.take_requests();

        let leftover = Task {
            kind: TaskKind::CountPrimes,
            range_start: 1,
            range_end: 5,
            result_slot: 20001,
        };
        let existing = encode_tasks(&[leftover]).unwrap();
        deliver(&mut coordinator, &mut host, Event::Fetched { key: LIST, payload: Some(existing) });

        let listed = published_tasks(&host.take_requests()[0]);
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0], leftover);
        assert_eq!(
            listed[1..].iter().map(|t| t.result_slot).collect::<Vec<_>>(),
            vec![10001, 10002]
        );
    }

    #[test]
    fn conflicted_publish_rereads_the_list() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        submit(&mut coordinator, &mut host, "30", 1);
        deliver(&mut coordinator, &mut host, Event::Fetched { key: LIST, payload: None });
        host.take_requests();

        deliver(&mut coordinator, &mut host, Event::Conflicted { key: LIST });
        assert_eq!(host.take_requests(), vec![Request::Get { key: LIST }]);
        assert!(matches!(
            coordinator.state(),
            CoordinatorState::PublishingTasks {
                stage: PublishStage::Reading,
                ..
            }
        ));

        // The retry builds on the fresh read, not on the stale one.
        let other = Task {
            kind: TaskKind::CountPrimes,
            range_start: 7,
            range_end: 9,
            result_slot: 30000,
        };
        let fresh = encode_tasks(&[other]).unwrap();
        deliver(&mut coordinator, &mut host, Event::Fetched { key: LIST, payload: Some(fresh) });
        let listed = published_tasks(&host.take_requests()[0]);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], other);
    }

    #[test]
    fn one_job_at_a_time() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        submit(&mut coordinator, &mut host, "30", 1);
        host.take_requests();

        submit(&mut coordinator, &mut host, "100", 2);
        assert!(host.requests.is_empty());
        assert_eq!(
            host.take_replies(),
            vec![Reply::text(ClientToken(2), "already computing")]
        );
        assert_eq!(coordinator.state().job().map(|job| job.n()), Some(30));

        // Busy wins over a malformed request.
        submit(&mut coordinator, &mut host, "banana", 3);
        assert_eq!(
            host.take_replies(),
            vec![Reply::text(ClientToken(3), "already computing")]
        );
    }

    #[test]
    fn malformed_submissions_touch_nothing() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();

        for args in [vec![], vec!["1", "2"], vec!["ten"], vec!["-4"]] {
            let event = Event::Command {
                kind: commands::COUNT_PRIMES,
                args: args.into_iter().map(Bytes::from).collect(),
                token: ClientToken(5),
            };
            deliver(&mut coordinator, &mut host, event);

            let replies = host.take_replies();
            assert_eq!(replies.len(), 1);
            assert!(replies[0].to_text().starts_with("invalid argument: "));
        }

        assert!(host.requests.is_empty());
        assert!(coordinator.state().is_idle());
    }

    #[test]
    fn huge_jobs_are_refused_before_decomposing() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();

        submit(&mut coordinator, &mut host, &u64::MAX.to_string(), 4);
        let replies = host.take_replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].to_text().starts_with("invalid argument: "));
        assert!(host.requests.is_empty());
        assert!(coordinator.state().is_idle());

        // Still accepting work afterwards.
        submit(&mut coordinator, &mut host, "30", 5);
        assert_eq!(host.take_requests(), vec![Request::Get { key: LIST }]);
    }

    /// Panics on any write.
    #[derive(Default)]
    struct ReadOnlyStore(RecordingHost);

    impl Host for ReadOnlyStore {
        fn submit(&mut self, request: Request) {
            assert!(matches!(request, Request::Get { .. }), "store is read only");
            self.0.submit(request);
        }

        fn submit_after(&mut self, delay: Duration, request: Request) {
            self.0.submit_after(delay, request);
        }

        fn reply(&mut self, reply: Reply) {
            self.0.reply(reply);
        }
    }

    #[test]
    fn a_panicking_transition_frees_the_coordinator() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = ReadOnlyStore::default();
        let command = |token| Event::Command {
            kind: commands::COUNT_PRIMES,
            args: vec![Bytes::from("30")],
            token: ClientToken(token),
        };

        coordinator.handle(command(1), &mut host).unwrap();
        assert!(!coordinator.state().is_idle());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            coordinator.handle(Event::Fetched { key: LIST, payload: None }, &mut host)
        }));
        assert!(outcome.is_err());
        assert!(coordinator.state().is_idle());

        host.0.take_requests();
        coordinator.handle(command(2), &mut host).unwrap();
        assert_eq!(host.0.take_requests(), vec![Request::Get { key: LIST }]);
    }

    #[test]
    fn jobs_that_would_cover_the_task_list_are_rejected() {
        let config = ProtocolConfig {
            task_list_slot: 10002,
            ..config()
        };
        let mut coordinator = Coordinator::with_seed(config, 7);
        let mut host = RecordingHost::new();

        submit(&mut coordinator, &mut host, "25000", 1);
        assert!(host.requests.is_empty());
        assert!(host.take_replies()[0].to_text().starts_with("invalid argument: "));
        assert!(coordinator.state().is_idle());

        // A single task only needs slot 10001 and fits.
        submit(&mut coordinator, &mut host, "10000", 2);
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10002 }]);
        assert!(host.replies.is_empty());
    }

    #[test]
    fn unknown_commands_are_refused() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        let event = Event::Command {
            kind: 99,
            args: vec![],
            token: ClientToken(8),
        };
        deliver(&mut coordinator, &mut host, event);

        assert_eq!(
            host.take_replies(),
            vec![Reply::text(ClientToken(8), "unknown command 99")]
        );
        assert!(host.requests.is_empty());
    }

    #[test]
    fn zero_answers_immediately() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        submit(&mut coordinator, &mut host, "0", 6);

        let replies = host.take_replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].to_text().ends_with("| Result: 0"));
        assert!(host.requests.is_empty());
        assert!(coordinator.state().is_idle());
    }

    #[test]
    fn unfinished_slots_are_polled_again() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        publish(&mut coordinator, &mut host, "30");

        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10001, payload: None });
        assert_eq!(host.last_delay(), Some(Duration::from_millis(3)));
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10001 }]);

        let empty = encode_slot(&SlotState::Empty).unwrap();
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10001, payload: Some(empty) });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10001 }]);

        let garbage = Event::Fetched {
            key: 10001,
            payload: Some(Bytes::from_static(b"{oops")),
        };
        deliver(&mut coordinator, &mut host, garbage);
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10001 }]);
        assert!(host.replies.is_empty());
    }

    #[test]
    fn results_are_drained_last_to_first() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        publish(&mut coordinator, &mut host, "25000");

        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10001, payload: ready(1229) });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10002 }]);
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10002, payload: ready(1033) });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10003 }]);
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10003, payload: ready(500) });

        assert!(host.take_replies()[0].to_text().ends_with("| Result: 2762"));
        assert_eq!(host.take_requests(), vec![reclaimed(10003)]);

        deliver(&mut coordinator, &mut host, Event::Committed { key: 10003 });
        assert_eq!(host.take_requests(), vec![reclaimed(10002)]);

        // A conflicted reset refreshes the slot, then writes the sentinel again.
        deliver(&mut coordinator, &mut host, Event::Conflicted { key: 10002 });
        assert_eq!(host.take_requests(), vec![Request::Get { key: 10002 }]);
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10002, payload: ready(1033) });
        assert_eq!(host.take_requests(), vec![reclaimed(10002)]);

        deliver(&mut coordinator, &mut host, Event::Committed { key: 10002 });
        assert_eq!(host.take_requests(), vec![reclaimed(10001)]);
        assert!(!coordinator.state().is_idle());

        deliver(&mut coordinator, &mut host, Event::Committed { key: 10001 });
        assert!(coordinator.state().is_idle());
        assert_eq!(coordinator.status(), "idle");
    }

    #[test]
    fn stray_notifications_keep_the_state() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        deliver(&mut coordinator, &mut host, Event::Committed { key: 10001 });
        assert!(coordinator.state().is_idle());

        publish(&mut coordinator, &mut host, "30");
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10005, payload: ready(1) });
        assert!(matches!(
            coordinator.state(),
            CoordinatorState::CollectingResults { next: 0, .. }
        ));
        assert!(host.requests.is_empty());
    }

    #[test]
    fn status_describes_the_active_job() {
        let mut coordinator = Coordinator::with_seed(config(), 7);
        let mut host = RecordingHost::new();
        publish(&mut coordinator, &mut host, "25000");
        deliver(&mut coordinator, &mut host, Event::Fetched { key: 10001, payload: ready(1229) });
        host.take_requests();

        let event = Event::Command {
            kind: commands::STATUS,
            args: vec![],
            token: ClientToken(2),
        };
        deliver(&mut coordinator, &mut host, event);
        assert_eq!(
            host.take_replies(),
            vec![Reply::text(ClientToken(2), "job 1 (n=25000): collecting 1/3 results")]
        );
    }
}
