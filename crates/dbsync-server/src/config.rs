//! Server configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use dbsync_crypto::{SigningKey, VerifyingKey};

use crate::backend::BackendKind;
use crate::error::{ServerError, ServerResult};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 1111;

/// Default listen address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";

/// Database list used when none is configured.
pub const DEFAULT_DATABASES: &str = "redis:127.0.0.1:6379";

/// One entry of the database list: `kind:host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddr {
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
}

impl BackendAddr {
    /// Parses a comma-separated list such as
    /// `redis:127.0.0.1:6379,redis:10.0.0.2:6380`.
    ///
    /// Order is preserved; it is the dispatch order.
    pub fn parse_list(list: &str) -> ServerResult<Vec<Self>> {
        let backends = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::parse)
            .collect::<ServerResult<Vec<_>>>()?;

        if backends.is_empty() {
            return Err(ServerError::NoBackends);
        }
        Ok(backends)
    }
}

impl FromStr for BackendAddr {
    type Err = ServerError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ServerError::InvalidBackend {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        let (kind, rest) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected format 'kind:host:port'"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected format 'kind:host:port'"))?;

        let kind = kind.parse().map_err(|e| invalid(&format!("{e}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = port
            .parse()
            .map_err(|_| invalid("port must be a number 0-65535"))?;

        Ok(Self {
            kind,
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.host, self.port)
    }
}

/// Immutable daemon configuration.
///
/// Keys and the database list are loaded once and never change while the
/// daemon runs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Backends, in dispatch order.
    pub backends: Vec<BackendAddr>,
    /// When set, requests must be signed by the matching private key.
    pub verifying_key: Option<VerifyingKey>,
    /// When set, responses are signed with this key.
    pub signing_key: Option<SigningKey>,
    /// Keep trusted connections open for further requests.
    pub keepalive: bool,
    /// Open connections above this count are closed on accept.
    pub max_connections: usize,
    /// Idle budget per connection, refreshed on every byte transferred.
    pub connection_timeout: Duration,
    /// Largest request envelope accepted, header included.
    pub read_capacity: usize,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything but the address.
    pub fn new(bind_addr: impl Into<SocketAddr>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            backends: Vec::new(),
            verifying_key: None,
            signing_key: None,
            keepalive: false,
            max_connections: 1024,
            connection_timeout: Duration::from_secs(3),
            read_capacity: 64 * 1024,
        }
    }

    pub fn with_backends(mut self, backends: Vec<BackendAddr>) -> Self {
        self.backends = backends;
        self
    }

    /// Requires signed requests.
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    /// Signs responses.
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_read_capacity(mut self, capacity: usize) -> Self {
        self.read_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parse_list_keeps_order() {
        let backends =
            BackendAddr::parse_list("redis:127.0.0.1:6379, redis:db2.local:6380").unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].host, "127.0.0.1");
        assert_eq!(backends[1].host, "db2.local");
        assert_eq!(backends[1].port, 6380);
        assert_eq!(backends[0].to_string(), "redis:127.0.0.1:6379");
    }

    #[test]
    fn parse_bracketed_ipv6() {
        let addr: BackendAddr = "redis:[::1]:6379".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 6379);
    }

    #[test_case("redis" ; "kind only")]
    #[test_case("redis:localhost" ; "missing port")]
    #[test_case("redis::6379" ; "empty host")]
    #[test_case("redis:localhost:port" ; "non numeric port")]
    #[test_case("redis:localhost:70000" ; "port out of range")]
    #[test_case("memcached:localhost:11211" ; "unknown kind")]
    fn parse_rejects(entry: &str) {
        assert!(matches!(
            entry.parse::<BackendAddr>(),
            Err(ServerError::InvalidBackend { .. })
        ));
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            BackendAddr::parse_list(" , "),
            Err(ServerError::NoBackends)
        ));
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::new(([127, 0, 0, 1], DEFAULT_PORT));
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.connection_timeout, Duration::from_secs(3));
        assert!(!config.keepalive);
        assert!(config.verifying_key.is_none());
    }
}
