//! Integration tests for CLI commands.
//!
//! `send` is exercised against daemons running inside the test process.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::thread::{self, JoinHandle};

use assert_cmd::Command;
use bytes::Bytes;
use dbsync_crypto::VerifyingKey;
use dbsync_server::{
    Backend, BackendResult, Dispatcher, Server, ServerConfig, ServerResult, ShutdownHandle,
};
use predicates::prelude::*;
use tempfile::TempDir;

fn dbsync(project_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dbsync").unwrap();
    cmd.arg("--project-dir").arg(project_dir);
    cmd
}

struct Fixed(&'static [u8]);

impl Backend for Fixed {
    fn kind(&self) -> &str {
        "redis"
    }

    fn run_command(&mut self, _command: &str) -> BackendResult<Bytes> {
        Ok(Bytes::from_static(self.0))
    }
}

struct Daemon {
    addr: SocketAddr,
    handle: ShutdownHandle,
    thread: Option<JoinHandle<ServerResult<()>>>,
}

impl Daemon {
    fn start(reply: &'static [u8], config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new(vec![Box::new(Fixed(reply))]);
        let mut server = Server::with_dispatcher(config, dispatcher).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());
        Self {
            addr,
            handle,
            thread: Some(thread),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn loopback() -> ServerConfig {
    ServerConfig::new(([127, 0, 0, 1], 0))
}

// ============================================================================
// Keygen
// ============================================================================

#[test]
fn keygen_writes_a_loadable_pair() {
    let temp = TempDir::new().unwrap();

    dbsync(temp.path())
        .args(["keygen", "--name", "client", "--out"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("client.pem"));

    let public = temp.path().join("client.pub.pem");
    assert!(temp.path().join("client.pem").exists());
    VerifyingKey::from_pem_file(&public).unwrap();
}

#[test]
fn keygen_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("client.pem"), "existing").unwrap();

    dbsync(temp.path())
        .args(["keygen", "--name", "client", "--out"])
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(
        fs::read_to_string(temp.path().join("client.pem")).unwrap(),
        "existing"
    );
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_shows_project_values() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("dbsync.toml"),
        "[daemon]\nport = 7311\ndatabases = \"redis:10.0.0.9:6379\"\n",
    )
    .unwrap();

    dbsync(temp.path())
        .args(["config", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("7311"))
        .stdout(predicate::str::contains("redis:10.0.0.9:6379"));
}

#[test]
fn config_rejects_unknown_format() {
    let temp = TempDir::new().unwrap();
    dbsync(temp.path())
        .args(["config", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

// ============================================================================
// Send
// ============================================================================

#[test]
fn send_prints_agreed_reply() {
    let temp = TempDir::new().unwrap();
    let (a, b) = (Daemon::start(b"OK\0", loopback()), Daemon::start(b"OK\0", loopback()));

    dbsync(temp.path())
        .args(["send", "-t", &format!("{},{}", a.addr, b.addr), "SET key value"])
        .assert()
        .success()
        .stdout(predicate::str::contains("redis: OK"));
}

#[test]
fn send_fails_when_replicas_disagree() {
    let temp = TempDir::new().unwrap();
    let (a, b) = (Daemon::start(b"1\0", loopback()), Daemon::start(b"2\0", loopback()));

    dbsync(temp.path())
        .args(["send", "-t", &format!("{},{}", a.addr, b.addr), "GET key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("differs"));
}

#[test]
fn send_fails_for_unreachable_target() {
    let temp = TempDir::new().unwrap();
    let closed = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    dbsync(temp.path())
        .args(["send", "--timeout-ms", "500", "-t", &closed.to_string(), "PING"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed"));
}

#[test]
fn signed_send_with_generated_keys() {
    let temp = TempDir::new().unwrap();
    dbsync(temp.path())
        .args(["keygen", "--name", "client", "--out"])
        .arg(temp.path())
        .assert()
        .success();

    let public = VerifyingKey::from_pem_file(temp.path().join("client.pub.pem")).unwrap();
    let daemon = Daemon::start(b"PONG\0", loopback().with_verifying_key(public));
    let target = daemon.addr.to_string();

    dbsync(temp.path())
        .args(["send", "-t", &target, "PING"])
        .assert()
        .failure();

    dbsync(temp.path())
        .args(["send", "-t", &target, "--sign", "-k"])
        .arg(temp.path().join("client.pem"))
        .arg("PING")
        .assert()
        .success()
        .stdout(predicate::str::contains("redis: PONG"));
}

#[test]
fn sign_without_key_is_rejected() {
    let temp = TempDir::new().unwrap();
    dbsync(temp.path())
        .args(["send", "--sign", "-t", "127.0.0.1:1111", "PING"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("private key"));
}

#[test]
fn sign_from_project_config_with_key_flag() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("dbsync.toml"), "[client]\nsign = true\n").unwrap();
    dbsync(temp.path())
        .args(["keygen", "--name", "client", "--out"])
        .arg(temp.path())
        .assert()
        .success();

    let public = VerifyingKey::from_pem_file(temp.path().join("client.pub.pem")).unwrap();
    let daemon = Daemon::start(b"PONG\0", loopback().with_verifying_key(public));

    dbsync(temp.path())
        .args(["send", "-t", &daemon.addr.to_string(), "-k"])
        .arg(temp.path().join("client.pem"))
        .arg("PING")
        .assert()
        .success()
        .stdout(predicate::str::contains("redis: PONG"));

    // The incomplete client section does not affect other commands.
    dbsync(temp.path())
        .args(["config", "--format", "text"])
        .assert()
        .success();
}
