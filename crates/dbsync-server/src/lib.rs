//! # dbsync-server: the dbsync daemon
//!
//! The daemon accepts commands from fan-out clients over TCP, forwards each
//! command to every configured local backend store, and answers with one
//! envelope holding the combined replies.
//!
//! ## Architecture
//!
//! A single thread drives every connection through one `mio` poll. There
//! is no async runtime.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        dbsync-server                         │
//! │  ┌──────────┐   ┌─────────────────┐   ┌──────────────────┐   │
//! │  │ Listener │ → │   Connections   │ → │    Dispatcher    │   │
//! │  │  (TCP)   │   │ (state machine) │   │ (→ redis, ...)   │   │
//! │  └──────────┘   └─────────────────┘   └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A request is one `ds` envelope (signed when the daemon has a public key)
//! whose payload is a NUL-terminated command. The response is
//!
//! ```text
//! ds:<n>:<kind>:<len>:<reply><kind>:<len>:<reply>...
//! ```
//!
//! with one frame per backend in configuration order. If any backend fails
//! the payload is empty (`ds:0:`). Malformed or unverifiable requests close
//! the connection without an answer.
//!
//! ## Usage
//!
//! ```ignore
//! use dbsync_server::{BackendAddr, Server, ServerConfig};
//!
//! let config = ServerConfig::new(([0, 0, 0, 0], 6000))
//!     .with_backends(BackendAddr::parse_list("redis:127.0.0.1:6379")?)
//!     .with_keepalive(true);
//! let mut server = Server::new(config)?.with_signal_handling()?;
//! server.run()?;
//! ```

pub mod backend;
mod config;
mod connection;
mod dispatch;
mod error;
mod server;

pub use backend::{Backend, BackendError, BackendKind, BackendResult, RedisBackend};
pub use config::{
    BackendAddr, DEFAULT_DATABASES, DEFAULT_LISTEN_ADDRESS, DEFAULT_PORT, ServerConfig,
};
pub use connection::{ConnEvent, ConnState, next_state};
pub use dispatch::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use server::{Server, ShutdownHandle};
