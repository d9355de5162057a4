//! The seam between a plugin and whatever hosts it.
//!
//! Plugins never talk to the store directly. They hand requests to a
//! [`Host`] and later receive the outcome as an [`Event`]. The runtime host
//! lives in [`crate::store`]; the two hosts below drive plugins
//! synchronously and are what the state machines are tested against.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::event::{Event, Reply};
use crate::store::{MemoryStore, SessionId};
use crate::Key;

/// A store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { key: Key },
    Put { key: Key, payload: Bytes },
}

/// Services a plugin can ask of its host.
pub trait Host {
    /// Issue a store request; the outcome arrives later as an event.
    fn submit(&mut self, request: Request);

    /// Issue a store request once `delay` has passed.
    fn submit_after(&mut self, delay: Duration, request: Request);

    /// Send a reply to a client. Fire and forget.
    fn reply(&mut self, reply: Reply);

    fn get(&mut self, key: Key) {
        self.submit(Request::Get { key });
    }

    fn put(&mut self, key: Key, payload: Bytes) {
        self.submit(Request::Put { key, payload });
    }
}

/// Host that only records what it was asked to do.
///
/// Tests feed a plugin hand-written events and inspect the requests it
/// issued in response.
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Issued requests with the delay they were scheduled with.
    pub requests: Vec<(Duration, Request)>,

    pub replies: Vec<Reply>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded requests, dropping their delays.
    pub fn take_requests(&mut self) -> Vec<Request> {
        self.requests.drain(..).map(|(_, request)| request).collect()
    }

    pub fn take_replies(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.replies)
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.requests.last().map(|(delay, _)| *delay)
    }
}

impl Host for RecordingHost {
    fn submit(&mut self, request: Request) {
        self.requests.push((Duration::ZERO, request));
    }

    fn submit_after(&mut self, delay: Duration, request: Request) {
        self.requests.push((delay, request));
    }

    fn reply(&mut self, reply: Reply) {
        self.replies.push(reply);
    }
}

/// Host that applies requests to a [`MemoryStore`] on the spot and queues
/// the resulting events for the caller to deliver.
///
/// Delays are ignored. Several plugins, each with its own `QueueHost` over
/// one store, can be stepped in any order to replay a specific
/// interleaving.
#[derive(Debug)]
pub struct QueueHost {
    store: Arc<MemoryStore>,
    session: SessionId,
    pending: VecDeque<Event>,
    replies: Vec<Reply>,
}

impl QueueHost {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        let session = store.open_session();
        Self {
            store,
            session,
            pending: VecDeque::new(),
            replies: Vec::new(),
        }
    }

    /// Queue an event from outside, e.g. a client command.
    pub fn push_event(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    pub fn take_replies(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.replies)
    }
}

impl Host for QueueHost {
    fn submit(&mut self, request: Request) {
        let event = self.store.apply(self.session, request);
        self.pending.push_back(event);
    }

    fn submit_after(&mut self, _delay: Duration, request: Request) {
        self.submit(request);
    }

    fn reply(&mut self, reply: Reply) {
        self.replies.push(reply);
    }
}
