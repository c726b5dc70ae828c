//! Command dispatch across the configured backends.

use bytes::{Bytes, BytesMut};
use dbsync_wire::{Command, frame_into};
use tracing::{debug, warn};

use crate::backend::{Backend, BackendKind, RedisBackend};
use crate::config::BackendAddr;
use crate::error::ServerResult;

/// Runs each command on every backend, in configuration order.
pub struct Dispatcher {
    backends: Vec<Box<dyn Backend>>,
}

impl Dispatcher {
    pub fn new(backends: Vec<Box<dyn Backend>>) -> Self {
        Self { backends }
    }

    /// Builds one adapter per database list entry.
    pub fn from_addrs(addrs: &[BackendAddr]) -> ServerResult<Self> {
        let mut backends: Vec<Box<dyn Backend>> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            match addr.kind {
                BackendKind::Redis => {
                    backends.push(Box::new(RedisBackend::open(&addr.host, addr.port)?));
                }
            }
        }
        Ok(Self::new(backends))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Runs `command` everywhere and concatenates the replies, each framed
    /// under its backend's tag.
    ///
    /// Returns `None` as soon as one backend fails: a partial answer is
    /// never produced.
    pub fn dispatch(&mut self, command: &Command) -> Option<Bytes> {
        let mut out = BytesMut::new();

        for backend in &mut self.backends {
            match backend.run_command(command.as_str()) {
                Ok(reply) if reply.is_empty() => {
                    warn!(backend = backend.kind(), %command, "backend returned an empty reply");
                    return None;
                }
                Ok(reply) => frame_into(backend.kind(), &reply, &mut out),
                Err(e) => {
                    warn!(backend = backend.kind(), %command, error = %e, "backend call failed");
                    return None;
                }
            }
        }

        debug!(%command, backends = self.backends.len(), bytes = out.len(), "command dispatched");
        Some(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult};
    use dbsync_wire::split_backend_replies;

    struct Fixed {
        tag: &'static str,
        reply: Option<&'static [u8]>,
        calls: usize,
    }

    impl Backend for Fixed {
        fn kind(&self) -> &str {
            self.tag
        }

        fn run_command(&mut self, _command: &str) -> BackendResult<Bytes> {
            self.calls += 1;
            self.reply
                .map(Bytes::from_static)
                .ok_or(BackendError::EmptyCommand)
        }
    }

    fn fixed(tag: &'static str, reply: Option<&'static [u8]>) -> Box<dyn Backend> {
        Box::new(Fixed {
            tag,
            reply,
            calls: 0,
        })
    }

    #[test]
    fn replies_are_framed_per_backend() {
        let mut dispatcher = Dispatcher::new(vec![
            fixed("redis", Some(b"PONG\0")),
            fixed("redis", Some(b"PONG\0")),
        ]);
        let payload = dispatcher.dispatch(&Command::new("PING").unwrap()).unwrap();

        assert_eq!(&payload[..], b"redis:5:PONG\0redis:5:PONG\0");
        assert_eq!(split_backend_replies(&payload).unwrap().len(), 2);
    }

    #[test]
    fn any_failure_discards_everything() {
        let mut dispatcher =
            Dispatcher::new(vec![fixed("redis", Some(b"OK\0")), fixed("redis", None)]);
        assert!(dispatcher.dispatch(&Command::new("SET a b").unwrap()).is_none());
    }

    #[test]
    fn empty_reply_counts_as_failure() {
        let mut dispatcher = Dispatcher::new(vec![fixed("redis", Some(b""))]);
        assert!(dispatcher.dispatch(&Command::new("GET a").unwrap()).is_none());
    }

    #[test]
    fn builds_adapters_from_addresses() {
        let addrs = BackendAddr::parse_list("redis:127.0.0.1:6379,redis:127.0.0.1:6380").unwrap();
        let dispatcher = Dispatcher::from_addrs(&addrs).unwrap();
        assert_eq!(dispatcher.len(), 2);
    }
}
