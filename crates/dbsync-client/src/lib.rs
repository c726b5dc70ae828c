//! # dbsync-client: fan-out client for dbsync daemons
//!
//! A [`Session`] sends the same command to every configured daemon at once
//! and returns the reply only if all daemons agree on it.
//!
//! ```text
//!                 ┌──> daemon A ──┐
//! send("SET k v") ├──> daemon B ──┼──> every reply == first reply ? reply : error
//!                 └──> daemon C ──┘
//! ```
//!
//! Each daemon is a target with its own state machine
//! (`Init -> Connecting -> Sending -> Receiving -> Done | Error`), driven by
//! one poll on the calling thread. A target failure does not stop its
//! peers, but the command as a whole fails. Replicas are only compared;
//! disagreement is reported, never repaired.

mod config;
mod consistency;
mod error;
mod session;
mod target;

pub use config::ClientConfig;
pub use consistency::{Inconsistency, check_consistency};
pub use error::{ClientError, ClientResult};
pub use session::Session;
pub use target::{HEADER_CAPACITY, TargetEvent, TargetState, next_state};
