//! Keygen command - writes an Ed25519 key pair as PEM files.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dbsync_config::Paths;
use dbsync_crypto::SigningKey;

pub fn run(out: Option<PathBuf>, name: &str, force: bool) -> Result<()> {
    let dir = match out {
        Some(dir) => dir,
        None => Paths::new().user_key_dir()?,
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create key directory {}", dir.display()))?;

    let private_path = dir.join(format!("{name}.pem"));
    let public_path = dir.join(format!("{name}.pub.pem"));
    if !force {
        for path in [&private_path, &public_path] {
            if path.exists() {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }

    let key = SigningKey::generate();
    write_private(&private_path, key.to_pem().as_bytes())?;
    fs::write(&public_path, key.verifying_key().to_pem())
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    println!("Private key: {}", private_path.display());
    println!("Public key:  {}", public_path.display());
    Ok(())
}

/// Writes a private key readable by the owner only.
fn write_private(path: &Path, pem: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(pem)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
