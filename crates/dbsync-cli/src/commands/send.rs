//! Send command - fans commands out to every daemon.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dbsync_client::{ClientConfig, Session};
use dbsync_crypto::{SigningKey, VerifyingKey};
use dbsync_wire::split_backend_replies;

use crate::SendArgs;

pub fn run(project_dir: &Path, args: SendArgs) -> Result<()> {
    let mut section = super::load_config(project_dir)?.client;

    if let Some(targets) = args.targets {
        section.targets = targets;
    }
    if args.private_key.is_some() {
        section.private_key = args.private_key;
    }
    if args.verify_key.is_some() {
        section.verifying_key = args.verify_key;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        section.timeout_ms = timeout_ms;
    }
    section.sign |= args.sign;
    section.keepalive |= args.keepalive;
    section.validate().context("Invalid client configuration")?;

    let targets = ClientConfig::parse_targets(&section.targets).context("Invalid target list")?;
    let mut config = ClientConfig::new(targets)
        .with_keepalive(section.keepalive)
        .with_timeout(Duration::from_millis(section.timeout_ms))
        .with_max_reply_len(section.max_reply_len);

    if section.sign {
        let Some(path) = &section.private_key else {
            bail!("--sign requires a private key (--private-key or client.private_key)");
        };
        let key = SigningKey::from_pem_file(path)
            .with_context(|| format!("Failed to load private key {}", path.display()))?;
        config = config.with_signing_key(key);
    }
    if let Some(path) = &section.verifying_key {
        let key = VerifyingKey::from_pem_file(path)
            .with_context(|| format!("Failed to load verifying key {}", path.display()))?;
        config = config.with_verifying_key(key);
    }

    let mut session = Session::open(config).context("Failed to open session")?;
    let mut stdout = std::io::stdout().lock();

    for command in &args.commands {
        let reply = session
            .send(command)
            .with_context(|| format!("Command '{command}' failed"))?;

        if args.raw {
            stdout.write_all(&reply)?;
            stdout.write_all(b"\n")?;
            continue;
        }
        for backend in split_backend_replies(&reply).context("Malformed reply")? {
            let text = backend.reply.strip_suffix(b"\0").unwrap_or(backend.reply);
            writeln!(
                stdout,
                "{}: {}",
                backend.backend,
                String::from_utf8_lossy(text)
            )?;
        }
    }

    session.close();
    Ok(())
}
