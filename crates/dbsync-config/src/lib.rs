//! Configuration management for dbsync
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the binary)
//! 2. Environment variables (`DBSYNC_<SECTION>__<KEY>`)
//! 3. dbsync.local.toml (gitignored, local overrides)
//! 4. dbsync.toml (git-tracked, project config)
//! 5. ~/.config/dbsync/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)
//!
//! ```toml
//! [daemon]
//! listen_address = "0.0.0.0"
//! port = 1111
//! public_key = "keys/client.pub.pem"
//! databases = "redis:127.0.0.1:6379,redis:127.0.0.1:6380"
//!
//! [client]
//! targets = "10.0.0.1:1111,10.0.0.2:1111"
//! sign = true
//! private_key = "keys/client.pem"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main dbsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DbsyncConfig {
    pub daemon: DaemonSection,
    pub client: ClientSection,
}

/// `[daemon]`: settings for `dbsync daemon`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub listen_address: String,
    pub port: u16,
    /// Public key that incoming requests must be signed with.
    pub public_key: Option<PathBuf>,
    /// Private key used to sign responses.
    pub signing_key: Option<PathBuf>,
    /// Comma-separated `kind:host:port` list.
    pub databases: String,
    pub keepalive: bool,
    pub max_connections: usize,
    pub connection_timeout_ms: u64,
    pub read_capacity: usize,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            port: 1111,
            public_key: None,
            signing_key: None,
            databases: "redis:127.0.0.1:6379".to_string(),
            keepalive: false,
            max_connections: 1024,
            connection_timeout_ms: 3000,
            read_capacity: 64 * 1024,
        }
    }
}

impl DaemonSection {
    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "daemon.databases must name at least one backend".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "daemon.max_connections must be positive".to_string(),
            ));
        }
        if self.read_capacity < 64 {
            return Err(ConfigError::ValidationError(
                "daemon.read_capacity must be at least 64 bytes".to_string(),
            ));
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "daemon.connection_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[client]`: settings for `dbsync send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Comma-separated `host:port` list.
    pub targets: String,
    /// Sign outgoing commands with `private_key`.
    pub sign: bool,
    pub private_key: Option<PathBuf>,
    /// Public key that daemon replies must be signed with.
    pub verifying_key: Option<PathBuf>,
    pub keepalive: bool,
    pub timeout_ms: u64,
    pub max_reply_len: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            targets: "127.0.0.1:1111".to_string(),
            sign: false,
            private_key: None,
            verifying_key: None,
            keepalive: false,
            timeout_ms: 3000,
            max_reply_len: 16 * 1024 * 1024,
        }
    }
}

impl ClientSection {
    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sign && self.private_key.is_none() {
            return Err(ConfigError::ValidationError(
                "client.sign requires a private key (client.private_key)".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "client.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl DbsyncConfig {
    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Parses a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the configuration as TOML to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_toml()?).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve relative key paths against `base_dir`
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        for path in [
            &mut self.daemon.public_key,
            &mut self.daemon.signing_key,
            &mut self.client.private_key,
            &mut self.client.verifying_key,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}
