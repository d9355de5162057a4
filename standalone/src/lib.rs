//! Runs a coordinator and a pool of workers in one process, over a shared
//! [`MemoryStore`].
//!
//! Every participant gets its own [`Reactor`] task and store session, so the
//! workers race on the task list exactly as separate processes would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::{
    commands, ClientToken, Event, MemoryStore, ProtocolConfig, Reactor, Reply, StoreHost,
};
use tdl_coordinator::Coordinator;
use tdl_worker::Worker;

pub mod args;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of workers to spawn.
    pub workers: usize,

    /// Time between two events handed to the same plugin.
    pub tick: Duration,

    pub protocol: ProtocolConfig,

    /// Seed for task choice and retry jitter. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            tick: Duration::from_millis(1),
            protocol: ProtocolConfig::default(),
            seed: None,
        }
    }
}

type Pending = Arc<DashMap<ClientToken, oneshot::Sender<Reply>>>;

/// Sends commands to the coordinator of a running cluster.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    coordinator: UnboundedSender<Event>,
    pending: Pending,
    next_token: Arc<AtomicU64>,
}

impl ClusterClient {
    /// Send a raw command and wait for its reply.
    pub async fn request(&self, kind: u32, args: Vec<Bytes>) -> anyhow::Result<Reply> {
        let token = ClientToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(token, tx);

        if self.coordinator.send(Event::Command { kind, args, token }).is_err() {
            self.pending.remove(&token);
            return Err(anyhow!("coordinator is not running"));
        }

        rx.await
            .with_context(|| format!("no reply for {}", token))
    }

    /// Count the primes in `[1, n]`, returning the reply text.
    pub async fn count_primes(&self, n: u64) -> anyhow::Result<String> {
        let reply = self
            .request(commands::COUNT_PRIMES, vec![Bytes::from(n.to_string())])
            .await?;
        Ok(reply.to_text())
    }

    pub async fn status(&self) -> anyhow::Result<String> {
        let reply = self.request(commands::STATUS, vec![]).await?;
        Ok(reply.to_text())
    }
}

/// What the participants looked like when the cluster stopped.
#[derive(Debug)]
pub struct ClusterReport {
    pub coordinator: Coordinator,
    pub workers: Vec<Worker>,
}

pub struct LocalCluster {
    store: Arc<MemoryStore>,
    client: ClusterClient,
    shutdown: CancellationToken,
    coordinator: JoinHandle<Coordinator>,
    workers: Vec<JoinHandle<Worker>>,
    router: JoinHandle<()>,
}

impl LocalCluster {
    /// Spawn the coordinator, the workers and the reply router on the
    /// current runtime.
    pub fn start(config: ClusterConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let pending: Pending = Arc::new(DashMap::new());
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();

        let (coordinator_tx, coordinator_rx) = mpsc::unbounded_channel();
        let host = StoreHost::new(store.clone(), coordinator_tx.clone(), replies_tx.clone());
        let coordinator = match config.seed {
            Some(seed) => Coordinator::with_seed(config.protocol.clone(), seed),
            None => Coordinator::new(config.protocol.clone()),
        };
        let coordinator = tokio::spawn(
            Reactor::new(coordinator, host, coordinator_rx, config.tick).run(shutdown.clone()),
        );

        let workers = (0..config.workers)
            .map(|id| {
                let (tx, rx) = mpsc::unbounded_channel();
                let host = StoreHost::new(store.clone(), tx, replies_tx.clone());
                let worker = match config.seed {
                    Some(seed) => {
                        Worker::with_seed(id, config.protocol.clone(), seed + 1 + id as u64)
                    }
                    None => Worker::new(id, config.protocol.clone()),
                };
                tokio::spawn(Reactor::new(worker, host, rx, config.tick).run(shutdown.clone()))
            })
            .collect();

        let router = tokio::spawn(route_replies(replies_rx, pending.clone(), shutdown.clone()));

        info!("Local cluster started with {} workers", config.workers);

        Self {
            store,
            client: ClusterClient {
                coordinator: coordinator_tx,
                pending,
                next_token: Arc::new(AtomicU64::new(1)),
            },
            shutdown,
            coordinator,
            workers,
            router,
        }
    }

    pub fn client(&self) -> ClusterClient {
        self.client.clone()
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub async fn count_primes(&self, n: u64) -> anyhow::Result<String> {
        self.client.count_primes(n).await
    }

    pub async fn status(&self) -> anyhow::Result<String> {
        self.client.status().await
    }

    /// Poll the coordinator until it is idle again.
    pub async fn wait_idle(&self, poll: Duration) -> anyhow::Result<()> {
        while self.status().await? != "idle" {
            tokio::time::sleep(poll).await;
        }
        Ok(())
    }

    /// Stop every reactor and hand back the participants.
    pub async fn shutdown(self) -> anyhow::Result<ClusterReport> {
        self.shutdown.cancel();

        let coordinator = self.coordinator.await.context("coordinator task failed")?;
        let mut workers = Vec::with_capacity(self.workers.len());
        for handle in self.workers {
            workers.push(handle.await.context("worker task failed")?);
        }
        self.router.await.context("reply router failed")?;

        for worker in &workers {
            info!("worker-{}: {:?}", worker.id(), worker.stats());
        }

        Ok(ClusterReport {
            coordinator,
            workers,
        })
    }
}

async fn route_replies(
    mut replies: UnboundedReceiver<Reply>,
    pending: Pending,
    shutdown: CancellationToken,
) {
    loop {
        let reply = tokio::select! {
            _ = shutdown.cancelled() => break,
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
        };

        match pending.remove(&reply.token) {
            Some((_, tx)) => {
                // The caller may have stopped waiting.
                let _ = tx.send(reply);
            }
            None => warn!("Dropping reply for unknown {}", reply.token),
        }
    }
}
