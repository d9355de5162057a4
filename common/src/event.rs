use std::fmt;

use bytes::Bytes;

use crate::Key;

/// Client command kinds understood by the plugins.
pub mod commands {
    /// Report what the coordinator is doing. Takes no arguments.
    pub const STATUS: u32 = 1;

    /// Count the primes in `[1, n]`. Takes one argument, the decimal `n`.
    pub const COUNT_PRIMES: u32 = 10;
}

/// Opaque token routing a reply back to the client that sent a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientToken(pub u64);

impl fmt::Display for ClientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// One inbound notification for a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A client request.
    Command {
        kind: u32,
        args: Vec<Bytes>,
        token: ClientToken,
    },

    /// Answer to a `get`. `None` if the key has never been written.
    Fetched { key: Key, payload: Option<Bytes> },

    /// A `put` went through.
    Committed { key: Key },

    /// A `put` lost an optimistic race.
    Conflicted { key: Key },
}

/// Response to a client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub token: ClientToken,
    pub payloads: Vec<Bytes>,
}

impl Reply {
    /// A reply carrying a single UTF-8 message.
    pub fn text(token: ClientToken, message: impl Into<String>) -> Self {
        Self {
            token,
            payloads: vec![Bytes::from(message.into())],
        }
    }

    /// Payloads joined by spaces, lossily decoded.
    pub fn to_text(&self) -> String {
        self.payloads
            .iter()
            .map(|payload| String::from_utf8_lossy(payload).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
