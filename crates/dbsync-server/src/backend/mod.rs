//! Backend store adapters.
//!
//! A backend runs one command against one local store and returns the
//! reply bytes. The dispatcher frames each reply under the backend's
//! [`kind`](Backend::kind) tag.

mod redis;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use thiserror::Error;

pub use self::redis::{REDIS_TIMEOUT, RedisBackend};

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors from a backend call. Any of them aborts the whole response.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store could not be reached.
    #[error("cannot connect to {kind} at {addr}: {reason}")]
    Connect {
        kind: BackendKind,
        addr: String,
        reason: String,
    },

    /// The store rejected the command.
    #[error("{kind} command failed: {reason}")]
    Command { kind: BackendKind, reason: String },

    /// The store answered with nothing (nil or an empty collection).
    #[error("{kind} returned no reply")]
    NoReply { kind: BackendKind },

    /// The command had no words.
    #[error("empty command")]
    EmptyCommand,

    /// Unknown backend kind in the database list.
    #[error("unknown backend kind '{0}'")]
    UnknownKind(String),
}

/// Supported backend stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Redis,
}

impl BackendKind {
    /// The kind's name, also used as the reply frame tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "redis" => Ok(Self::Redis),
            other => Err(BackendError::UnknownKind(other.to_string())),
        }
    }
}

/// One local backend store.
pub trait Backend: Send {
    /// Tag under which this backend's replies are framed.
    fn kind(&self) -> &str;

    /// Runs `command` (without its NUL terminator) and returns the reply.
    ///
    /// An empty reply must be reported as [`BackendError::NoReply`].
    fn run_command(&mut self, command: &str) -> BackendResult<Bytes>;
}
