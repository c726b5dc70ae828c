//! Client error types.

use std::net::SocketAddr;

use dbsync_io::IoError;
use dbsync_wire::WireError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by a fan-out session.
///
/// Per-target problems (refused connections, timeouts, malformed replies)
/// are logged where they happen and reported here as the session-level
/// outcome.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A target list entry could not be parsed or resolved.
    #[error("invalid target '{entry}': {reason}")]
    InvalidTarget { entry: String, reason: String },

    /// The session has no targets.
    #[error("at least one target must be configured")]
    NoTargets,

    /// The command could not be encoded.
    #[error("invalid command: {0}")]
    Command(#[from] WireError),

    /// Poll or registration failure.
    #[error("event loop error: {0}")]
    EventLoop(#[from] IoError),

    /// No target became ready before the session timed out.
    #[error("timed out waiting for targets")]
    TimedOut,

    /// Some targets did not deliver a reply.
    #[error("{failed} of {total} targets failed")]
    TargetsFailed { failed: usize, total: usize },

    /// A reply could not be unwrapped or verified.
    #[error("bad reply from {target}: {source}")]
    BadReply {
        target: SocketAddr,
        source: WireError,
    },

    /// A target answered with an empty payload: the daemon's backends failed.
    #[error("empty reply from {target}")]
    EmptyReply { target: SocketAddr },

    /// A target's reply differs from the first target's.
    #[error("reply from {target} differs from {reference}")]
    Inconsistent {
        target: SocketAddr,
        reference: SocketAddr,
    },
}
