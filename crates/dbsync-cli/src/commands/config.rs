//! Configuration display.

use std::path::Path;

use anyhow::{Result, bail};

fn show_path(path: Option<&Path>) -> String {
    path.map_or_else(|| "none".to_string(), |p| p.display().to_string())
}

/// Show current configuration.
pub fn show(project_dir: &Path, format: &str) -> Result<()> {
    let config = super::load_config(project_dir)?;

    match format {
        "toml" => print!("{}", config.to_toml()?),
        "text" => {
            println!("dbsync configuration");
            println!("====================\n");

            println!("Daemon:");
            println!(
                "  Listen:           {}:{}",
                config.daemon.listen_address, config.daemon.port
            );
            println!("  Databases:        {}", config.daemon.databases);
            println!(
                "  Public key:       {}",
                show_path(config.daemon.public_key.as_deref())
            );
            println!(
                "  Signing key:      {}",
                show_path(config.daemon.signing_key.as_deref())
            );
            println!("  Keepalive:        {}", config.daemon.keepalive);
            println!("  Max connections:  {}", config.daemon.max_connections);
            println!(
                "  Timeout:          {} ms",
                config.daemon.connection_timeout_ms
            );
            println!("  Read capacity:    {} bytes", config.daemon.read_capacity);
            println!();

            println!("Client:");
            println!("  Targets:          {}", config.client.targets);
            println!("  Sign:             {}", config.client.sign);
            println!(
                "  Private key:      {}",
                show_path(config.client.private_key.as_deref())
            );
            println!(
                "  Verifying key:    {}",
                show_path(config.client.verifying_key.as_deref())
            );
            println!("  Keepalive:        {}", config.client.keepalive);
            println!("  Timeout:          {} ms", config.client.timeout_ms);
        }
        other => bail!("Unknown format '{other}' (expected toml or text)"),
    }

    Ok(())
}
