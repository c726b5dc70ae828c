//! Scheduler error types.

use mio::Token;

/// Result type for scheduler operations.
pub type IoResult<T> = Result<T, IoError>;

/// Errors from the poll loop.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Creating or waiting on the poll failed.
    #[error("poll failed: {0}")]
    Poll(#[source] std::io::Error),

    /// Registering, re-registering or deregistering a source failed.
    #[error("registration change for token {} failed: {source}", token.0)]
    Registration {
        token: Token,
        source: std::io::Error,
    },
}
