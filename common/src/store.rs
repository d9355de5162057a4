//! In-memory shared store with per-key optimistic transactions.
//!
//! Every key carries a version that goes up on each successful write. A
//! `get` remembers, per session, which version it saw. A `put` from a
//! session that has read the key only succeeds if the version is still the
//! one it saw; a session that never read the key writes blindly. A `put`
//! ends the transaction either way: whether it commits or conflicts, the
//! session has to read the key again before its next write is validated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::error::ProtocolError;
use crate::event::{Event, Reply};
use crate::host::{Host, Request};
use crate::Key;

/// One client of the store. Read versions are tracked per session.
pub type SessionId = u64;

#[derive(Debug)]
struct Slot {
    version: u64,
    payload: Bytes,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<Key, Slot>,

    /// Version of each key as last read by each session.
    observed: DashMap<(SessionId, Key), u64>,

    next_session: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Read a key and remember the version `session` saw.
    pub fn get(&self, session: SessionId, key: Key) -> Option<Bytes> {
        // NOTE: The slot guard is held while recording the version, so the
        //       payload and the version always belong together.
        match self.slots.get(&key) {
            Some(slot) => {
                self.observed.insert((session, key), slot.version);
                Some(slot.payload.clone())
            }
            None => {
                self.observed.insert((session, key), 0);
                None
            }
        }
    }

    /// Write a key if it has not changed since `session` last read it.
    ///
    /// Returns the new version of the key.
    pub fn put(&self, session: SessionId, key: Key, payload: Bytes) -> Result<u64, ProtocolError> {
        let mut slot = self.slots.entry(key).or_insert(Slot {
            version: 0,
            payload: Bytes::new(),
        });

        let seen = self.observed.remove(&(session, key)).map(|(_, version)| version);
        if let Some(seen) = seen {
            if seen != slot.version {
                trace!("session {session} saw v{seen} of slot {key}, now v{}", slot.version);
                return Err(ProtocolError::Conflict { key });
            }
        }

        slot.version += 1;
        slot.payload = payload;

        Ok(slot.version)
    }

    /// Read a key without touching any session's read version.
    pub fn peek(&self, key: Key) -> Option<Bytes> {
        self.slots
            .get(&key)
            .filter(|slot| slot.version > 0)
            .map(|slot| slot.payload.clone())
    }

    pub fn version(&self, key: Key) -> u64 {
        self.slots.get(&key).map_or(0, |slot| slot.version)
    }

    /// Run a request and turn its outcome into the event the issuer expects.
    pub fn apply(&self, session: SessionId, request: Request) -> Event {
        match request {
            Request::Get { key } => Event::Fetched {
                key,
                payload: self.get(session, key),
            },
            Request::Put { key, payload } => match self.put(session, key, payload) {
                Ok(_) => Event::Committed { key },
                Err(_) => Event::Conflicted { key },
            },
        }
    }
}

/// Host backed by a shared [`MemoryStore`], for plugins running inside a
/// [`crate::Reactor`].
///
/// Outcomes are pushed to the plugin's own inbox; delayed requests are
/// parked on a tokio timer, so this host must be used from inside a
/// runtime.
#[derive(Debug, Clone)]
pub struct StoreHost {
    store: Arc<MemoryStore>,
    session: SessionId,
    inbox: UnboundedSender<Event>,
    replies: UnboundedSender<Reply>,
}

impl StoreHost {
    pub fn new(
        store: Arc<MemoryStore>,
        inbox: UnboundedSender<Event>,
        replies: UnboundedSender<Reply>,
    ) -> Self {
        let session = store.open_session();
        Self {
            store,
            session,
            inbox,
            replies,
        }
    }
}

impl Host for StoreHost {
    fn submit(&mut self, request: Request) {
        let event = self.store.apply(self.session, request);
        if self.inbox.send(event).is_err() {
            debug!("session {} inbox closed, dropping store outcome", self.session);
        }
    }

    fn submit_after(&mut self, delay: Duration, request: Request) {
        if delay.is_zero() {
            return self.submit(request);
        }

        let mut host = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            host.submit(request);
        });
    }

    fn reply(&mut self, reply: Reply) {
        if self.replies.send(reply).is_err() {
            debug!("reply channel closed, dropping reply");
        }
    }
}
