//! Daemon command - runs the dbsync daemon in the foreground.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use dbsync_crypto::{SigningKey, VerifyingKey};
use dbsync_server::{BackendAddr, Server, ServerConfig};
use tracing::info;

use crate::DaemonArgs;

pub fn run(project_dir: &Path, args: DaemonArgs) -> Result<()> {
    let mut section = super::load_config(project_dir)?.daemon;

    if let Some(bind) = args.bind {
        section.listen_address = bind;
    }
    if let Some(port) = args.port {
        section.port = port;
    }
    if let Some(databases) = args.databases {
        section.databases = databases;
    }
    if args.public_key.is_some() {
        section.public_key = args.public_key;
    }
    if args.signing_key.is_some() {
        section.signing_key = args.signing_key;
    }
    if let Some(max_connections) = args.max_connections {
        section.max_connections = max_connections;
    }
    section.keepalive |= args.keepalive;
    section.validate().context("Invalid daemon configuration")?;

    let bind_addr = resolve_bind(&section.listen_address, section.port)?;
    let backends =
        BackendAddr::parse_list(&section.databases).context("Invalid database list")?;

    let mut config = ServerConfig::new(bind_addr)
        .with_backends(backends)
        .with_keepalive(section.keepalive)
        .with_max_connections(section.max_connections)
        .with_connection_timeout(Duration::from_millis(section.connection_timeout_ms))
        .with_read_capacity(section.read_capacity);

    if let Some(path) = &section.public_key {
        let key = VerifyingKey::from_pem_file(path)
            .with_context(|| format!("Failed to load public key {}", path.display()))?;
        config = config.with_verifying_key(key);
    }
    if let Some(path) = &section.signing_key {
        let key = SigningKey::from_pem_file(path)
            .with_context(|| format!("Failed to load signing key {}", path.display()))?;
        config = config.with_signing_key(key);
    }

    info!(%bind_addr, databases = %section.databases, "starting dbsync daemon");

    let mut server = Server::new(config)
        .context("Failed to create server")?
        .with_signal_handling()
        .context("Failed to install signal handlers")?;

    println!("dbsync daemon listening on {}", server.local_addr()?);
    println!("Press Ctrl+C to stop.");

    server.run().context("Server error during operation")?;

    println!("dbsync daemon stopped.");
    Ok(())
}

/// Accepts an IP literal or a host name.
fn resolve_bind(address: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (address, port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve listen address '{address}'"))?
        .next()
        .ok_or_else(|| anyhow!("Listen address '{address}' resolved to nothing"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_accepts_ip_literals() {
        assert_eq!(
            resolve_bind("127.0.0.1", 1111).unwrap(),
            "127.0.0.1:1111".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_bind("::1", 1111).unwrap(),
            "[::1]:1111".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn bind_resolves_localhost() {
        assert!(resolve_bind("localhost", 1111).unwrap().ip().is_loopback());
    }
}
