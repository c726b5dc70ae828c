//! Session configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use dbsync_crypto::{SigningKey, VerifyingKey};

use crate::error::{ClientError, ClientResult};

/// Immutable fan-out session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Daemons to send every command to, in comparison order.
    pub targets: Vec<SocketAddr>,
    /// When set, commands are signed with this key.
    pub signing_key: Option<SigningKey>,
    /// When set, replies must be signed by the matching private key.
    pub verifying_key: Option<VerifyingKey>,
    /// Keep connections open between commands.
    pub keepalive: bool,
    /// Budget per target, refreshed on every byte transferred.
    pub timeout: Duration,
    /// Largest reply envelope accepted, header included.
    pub max_reply_len: usize,
}

impl ClientConfig {
    pub fn new(targets: Vec<SocketAddr>) -> Self {
        Self {
            targets,
            signing_key: None,
            verifying_key: None,
            keepalive: false,
            timeout: Duration::from_secs(3),
            max_reply_len: 16 * 1024 * 1024,
        }
    }

    /// Parses a comma-separated `host:port` list, resolving host names.
    ///
    /// The first resolved address of each entry is used.
    pub fn parse_targets(list: &str) -> ClientResult<Vec<SocketAddr>> {
        let mut targets = Vec::new();

        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = |reason: String| ClientError::InvalidTarget {
                entry: entry.to_string(),
                reason,
            };

            let addr = match entry.parse::<SocketAddr>() {
                Ok(addr) => addr,
                Err(_) => entry
                    .to_socket_addrs()
                    .map_err(|e| invalid(e.to_string()))?
                    .next()
                    .ok_or_else(|| invalid("name resolved to no addresses".to_string()))?,
            };
            targets.push(addr);
        }

        if targets.is_empty() {
            return Err(ClientError::NoTargets);
        }
        Ok(targets)
    }

    /// Signs every command.
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Verifies every reply.
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_reply_len(mut self, max_reply_len: usize) -> Self {
        self.max_reply_len = max_reply_len;
        self
    }
}
