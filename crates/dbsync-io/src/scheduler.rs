//! One poll, one wait per turn, ready tokens handed to a handler.

use std::io;
use std::time::{Duration, Instant};

use mio::event::{Event, Source};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use tracing::trace;

use crate::error::{IoError, IoResult};

/// Readiness flags of one event, detached from the `mio` event buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub read_closed: bool,
    pub write_closed: bool,
}

impl From<&Event> for Readiness {
    fn from(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            read_closed: event.is_read_closed(),
            write_closed: event.is_write_closed(),
        }
    }
}

/// Registration change requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Keep the current interest.
    Unchanged,
    /// Wait for the source to become readable.
    Readable,
    /// Wait for the source to become writable.
    Writable,
    /// Stop polling the source.
    Deregister,
}

impl Registration {
    /// Applies the change to `source`.
    ///
    /// `registered` tracks whether the source is currently known to the
    /// poll, so the first interest registers and later ones re-register.
    /// Deregistering an unregistered source is a no-op.
    pub fn apply<S>(
        self,
        registry: &Registry,
        source: &mut S,
        token: Token,
        registered: &mut bool,
    ) -> IoResult<()>
    where
        S: Source + ?Sized,
    {
        let outcome = match self {
            Self::Unchanged => return Ok(()),
            Self::Deregister if !*registered => return Ok(()),
            Self::Deregister => registry.deregister(source).map(|()| false),
            Self::Readable | Self::Writable => {
                let interest = if self == Self::Readable {
                    Interest::READABLE
                } else {
                    Interest::WRITABLE
                };
                let result = if *registered {
                    registry.reregister(source, token, interest)
                } else {
                    registry.register(source, token, interest)
                };
                result.map(|()| true)
            }
        };

        *registered = outcome.map_err(|source| IoError::Registration { token, source })?;
        Ok(())
    }
}

/// Receives the events of a [`Scheduler::turn`].
///
/// Each turn calls [`charge`](Self::charge) once with the duration of the
/// wait, then [`on_ready`](Self::on_ready) per ready token, then
/// [`sweep`](Self::sweep). Activity seen in `on_ready` can therefore refresh
/// a budget after it was charged, and `sweep` only closes what stayed idle.
pub trait ReadyHandler {
    /// Charges every live budget with the wall-clock time of the wait.
    fn charge(&mut self, elapsed: Duration) {
        let _ = elapsed;
    }

    /// Called once per ready token, in the order the poll reported them.
    fn on_ready(&mut self, registry: &Registry, token: Token, readiness: Readiness);

    /// Closes whatever ran out of budget.
    fn sweep(&mut self, registry: &Registry) {
        let _ = registry;
    }
}

/// Summary of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    /// Time spent waiting.
    pub elapsed: Duration,
    /// Number of events delivered.
    pub ready: usize,
}

impl Turn {
    /// The wait ended without any readiness.
    pub fn timed_out(&self) -> bool {
        self.ready == 0
    }
}

/// A poll registry plus its event buffer.
pub struct Scheduler {
    poll: Poll,
    events: Events,
}

impl Scheduler {
    /// Creates a scheduler delivering at most `event_capacity` events per turn.
    pub fn new(event_capacity: usize) -> IoResult<Self> {
        Ok(Self {
            poll: Poll::new().map_err(IoError::Poll)?,
            events: Events::with_capacity(event_capacity),
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Creates a waker that interrupts the wait with an event on `token`.
    pub fn waker(&self, token: Token) -> IoResult<Waker> {
        Waker::new(self.poll.registry(), token).map_err(IoError::Poll)
    }

    /// Waits once and delivers the ready tokens to `handler`.
    ///
    /// A wait interrupted by a signal counts as a turn with no events.
    pub fn turn<H>(&mut self, timeout: Option<Duration>, handler: &mut H) -> IoResult<Turn>
    where
        H: ReadyHandler + ?Sized,
    {
        let started = Instant::now();
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => self.events.clear(),
            Err(e) => return Err(IoError::Poll(e)),
        }
        let elapsed = started.elapsed();

        handler.charge(elapsed);
        let registry = self.poll.registry();
        let mut ready = 0;
        for event in &self.events {
            ready += 1;
            handler.on_ready(registry, event.token(), Readiness::from(event));
        }
        handler.sweep(registry);

        trace!(ready, elapsed_ms = elapsed.as_millis(), "scheduler turn");
        Ok(Turn { elapsed, ready })
    }
}
