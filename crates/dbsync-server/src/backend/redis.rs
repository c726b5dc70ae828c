//! Redis backend.

use std::time::Duration;

use ::redis::{Client, Value};
use bytes::Bytes;
use tracing::{debug, trace};

use super::{Backend, BackendError, BackendKind, BackendResult};

/// Timeout for connecting to Redis and for each reply.
pub const REDIS_TIMEOUT: Duration = Duration::from_millis(1500);

/// Runs commands against one Redis server, one connection per command.
///
/// Replies are rendered as text followed by a NUL byte. Array elements are
/// joined with `\n`. Nil and empty arrays count as no reply.
pub struct RedisBackend {
    client: Client,
    addr: String,
    timeout: Duration,
}

impl RedisBackend {
    /// Prepares a backend for `host:port`. No connection is made yet.
    pub fn open(host: &str, port: u16) -> BackendResult<Self> {
        let addr = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let client = Client::open(format!("redis://{addr}/")).map_err(|e| BackendError::Connect {
            kind: BackendKind::Redis,
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            addr,
            timeout: REDIS_TIMEOUT,
        })
    }

    fn connect_error(&self, e: &::redis::RedisError) -> BackendError {
        BackendError::Connect {
            kind: BackendKind::Redis,
            addr: self.addr.clone(),
            reason: e.to_string(),
        }
    }
}

impl Backend for RedisBackend {
    fn kind(&self) -> &str {
        BackendKind::Redis.as_str()
    }

    fn run_command(&mut self, command: &str) -> BackendResult<Bytes> {
        let mut words = command.split_whitespace();
        let name = words.next().ok_or(BackendError::EmptyCommand)?;

        let mut conn = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(|e| self.connect_error(&e))?;
        conn.set_read_timeout(Some(self.timeout))
            .map_err(|e| self.connect_error(&e))?;

        let mut cmd = ::redis::cmd(name);
        for word in words {
            cmd.arg(word);
        }

        trace!(addr = %self.addr, command, "running redis command");
        let value: Value = cmd.query(&mut conn).map_err(|e| {
            debug!(addr = %self.addr, error = %e, "redis command failed");
            BackendError::Command {
                kind: BackendKind::Redis,
                reason: e.to_string(),
            }
        })?;

        render(&value)
            .map(Bytes::from)
            .ok_or(BackendError::NoReply {
                kind: BackendKind::Redis,
            })
    }
}

/// Renders a reply as NUL-terminated text, or `None` for an empty reply.
fn render(value: &Value) -> Option<Vec<u8>> {
    let mut out = match value {
        Value::Nil => return None,
        Value::Array(items) if items.is_empty() => return None,
        Value::Array(items) => {
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b'\n');
                }
                out.extend_from_slice(&text(item));
            }
            out
        }
        scalar => text(scalar),
    };
    out.push(0);
    Some(out)
}

fn text(value: &Value) -> Vec<u8> {
    match value {
        Value::BulkString(bytes) => bytes.clone(),
        Value::SimpleString(status) => status.as_bytes().to_vec(),
        Value::Okay => b"OK".to_vec(),
        Value::Int(n) => n.to_string().into_bytes(),
        // Nested aggregates and nil elements render as empty text.
        _ => Vec::new(),
    }
}
