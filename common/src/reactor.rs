use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::event::Event;
use crate::host::Host;

/// A single-threaded participant of the protocol.
///
/// Handlers run to completion on one event and must not block on I/O; any
/// store access goes through the [`Host`] and comes back as a later event.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Called once before the first event.
    fn on_start(&mut self, _host: &mut dyn Host) {}

    fn handle(&mut self, event: Event, host: &mut dyn Host) -> anyhow::Result<()>;
}

/// Logs `message` if dropped while the thread unwinds.
///
/// Plugins that move their state out for a transition hold one of these for
/// the duration, naming what a panic would lose. [`Reactor::step`] survives
/// the panic, so without the note the loss would go unreported.
#[must_use]
pub struct UnwindNote(String);

impl UnwindNote {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl Drop for UnwindNote {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("{}", self.0);
        }
    }
}

/// Drives one plugin, handing it at most one event per tick.
pub struct Reactor<P, H> {
    plugin: P,
    host: H,
    inbox: UnboundedReceiver<Event>,
    tick: Duration,
}

impl<P: Plugin, H: Host> Reactor<P, H> {
    pub fn new(plugin: P, host: H, inbox: UnboundedReceiver<Event>, tick: Duration) -> Self {
        Self {
            plugin,
            host,
            inbox,
            tick,
        }
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    /// Hand one event to the plugin.
    ///
    /// Errors and panics from the handler are logged and swallowed so a bad
    /// event never takes the reactor down.
    pub fn step(&mut self, event: Event) {
        let plugin = &mut self.plugin;
        let host = &mut self.host;

        match catch_unwind(AssertUnwindSafe(|| plugin.handle(event, host))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{}: failed to handle event: {:#}", plugin.name(), e),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("{}: handler panicked: {}", plugin.name(), message);
            }
        }
    }

    /// Run until `shutdown` fires or the inbox closes, then hand the plugin
    /// back.
    pub async fn run(mut self, shutdown: CancellationToken) -> P {
        info!("{} started", self.plugin.name());
        self.plugin.on_start(&mut self.host);

        let mut ticker = interval(self.tick.max(Duration::from_micros(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.inbox.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("{} inbox closed", self.plugin.name());
                        break;
                    }
                },
            };

            self.step(event);
        }

        info!("{} stopped", self.plugin.name());
        self.plugin
    }
}
