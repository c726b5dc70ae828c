//! Server error types.

use std::net::SocketAddr;

use dbsync_io::IoError;
use thiserror::Error;

use crate::backend::BackendError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while configuring or running the daemon.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Poll or registration failure.
    #[error("event loop error: {0}")]
    EventLoop(#[from] IoError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind failed.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// A database list entry could not be parsed.
    #[error("invalid database entry '{entry}': {reason}")]
    InvalidBackend { entry: String, reason: String },

    /// No backend was configured.
    #[error("at least one database must be configured")]
    NoBackends,

    /// A backend could not be set up.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    Signals(String),
}
