//! # dbsync-io: Readiness-driven I/O plumbing for dbsync
//!
//! Both the daemon and the fan-out client are single-threaded state
//! machines driven by one `mio` poll. This crate holds the parts they share:
//!
//! - **[`Scheduler`]**: owns the poll and its event buffer. Each [`turn`]
//!   waits once, charges the handler with the wait's duration, then hands
//!   it every ready token.
//! - **[`Registration`]**: the registration change a pure state transition
//!   asks for. The driving loop applies it with [`Registration::apply`].
//! - **[`TimeBudget`]**: remaining time for one connection or target.
//! - **[`CappedBuf`] / [`SendCursor`]**: receive buffer with a hard cap and a
//!   send buffer with a progress offset, for partial non-blocking I/O.
//! - **[`BytesMutPool`]**: bounded recycling of receive buffers.
//!
//! ```text
//!   turn(timeout)
//!     poll(timeout) ─── elapsed ───> handler.charge(elapsed)
//!     for each event ──────────────> handler.on_ready(registry, token, readiness)
//!     done ────────────────────────> handler.sweep(registry)
//! ```
//!
//! [`turn`]: Scheduler::turn

mod budget;
mod buffer;
mod error;
mod pool;
mod scheduler;

pub use budget::TimeBudget;
pub use buffer::{CappedBuf, Fill, SendCursor};
pub use error::{IoError, IoResult};
pub use pool::BytesMutPool;
pub use scheduler::{Readiness, ReadyHandler, Registration, Scheduler, Turn};

#[cfg(test)]
mod tests;
