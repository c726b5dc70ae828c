//! Fan-out sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use dbsync_crypto::VerifyingKey;
use dbsync_io::{Readiness, ReadyHandler, Scheduler, TimeBudget};
use dbsync_wire::{Command, ENVELOPE_TAG, HexDump, frame, sign, unframe_exact, verify_and_unwrap};
use mio::{Registry, Token};
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::consistency::{Inconsistency, check_consistency};
use crate::error::{ClientError, ClientResult};
use crate::target::{Target, TargetEvent, TargetState};

/// Sends commands to every configured daemon and cross-checks the replies.
///
/// One command is in flight at a time. All targets are driven concurrently
/// by a single poll; a command succeeds only if every target answered with
/// the same non-empty payload.
///
/// ```ignore
/// use dbsync_client::{ClientConfig, Session};
///
/// let targets = ClientConfig::parse_targets("10.0.0.1:6000,10.0.0.2:6000")?;
/// let mut session = Session::open(ClientConfig::new(targets).with_keepalive(true))?;
/// let reply = session.send("GET key")?;
/// ```
pub struct Session {
    config: ClientConfig,
    scheduler: Scheduler,
    driver: Driver,
}

impl Session {
    /// Creates a session. Connections are made by the first [`send`](Self::send).
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        if config.targets.is_empty() {
            return Err(ClientError::NoTargets);
        }

        let scheduler = Scheduler::new(config.targets.len())?;
        let targets: Vec<Target> = config
            .targets
            .iter()
            .enumerate()
            .map(|(index, addr)| Target::new(*addr, Token(index), TimeBudget::new(config.timeout)))
            .collect();
        let by_token = targets
            .iter()
            .enumerate()
            .map(|(index, target)| (target.token, index))
            .collect();

        debug!(
            targets = targets.len(),
            sign = config.signing_key.is_some(),
            verify = config.verifying_key.is_some(),
            keepalive = config.keepalive,
            "session opened"
        );

        Ok(Self {
            driver: Driver {
                targets,
                by_token,
                max_reply_len: config.max_reply_len,
            },
            config,
            scheduler,
        })
    }

    /// Sends `command` to every target and returns the agreed reply payload.
    ///
    /// The payload is the daemon's aggregated reply: one frame per backend,
    /// see [`dbsync_wire::split_backend_replies`].
    pub fn send(&mut self, command: &str) -> ClientResult<Bytes> {
        let command = Command::new(command)?;
        let payload = command.encode();
        let request = match &self.config.signing_key {
            Some(key) => sign(ENVELOPE_TAG, &payload, key),
            None => frame(ENVELOPE_TAG, &payload),
        };
        trace!(%command, request = %HexDump(&request), "sending command");

        self.driver.begin(self.scheduler.registry(), &request);
        let result = self
            .drive()
            .and_then(|()| self.driver.collect(self.config.verifying_key.as_ref()));
        self.driver
            .finish(self.scheduler.registry(), self.config.keepalive);

        match &result {
            Ok(reply) => debug!(%command, bytes = reply.len(), "command succeeded"),
            Err(e) => info!(%command, error = %e, "command failed"),
        }
        result
    }

    /// Closes every connection and returns all targets to their initial
    /// state.
    pub fn reset(&mut self) {
        let registry = self.scheduler.registry();
        for target in &mut self.driver.targets {
            target.transition(registry, TargetEvent::Reset);
        }
        debug!("session reset");
    }

    /// Closes the session.
    pub fn close(mut self) {
        self.reset();
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.config.targets
    }

    /// Current state of each target, in configuration order.
    pub fn target_states(&self) -> Vec<TargetState> {
        self.driver.targets.iter().map(|t| t.state).collect()
    }

    /// Number of targets holding an open connection.
    pub fn open_connections(&self) -> usize {
        self.driver.targets.iter().filter(|t| t.is_connected()).count()
    }

    fn drive(&mut self) -> ClientResult<()> {
        while self.driver.has_pending() {
            let timeout = self.driver.next_timeout();
            let turn = self.scheduler.turn(timeout, &mut self.driver)?;

            if turn.timed_out() && timeout.is_some_and(|t| turn.elapsed >= t) {
                self.driver.fail_pending(self.scheduler.registry());
                return Err(ClientError::TimedOut);
            }
        }
        Ok(())
    }
}

/// Routes readiness to targets. Owned by the session.
struct Driver {
    targets: Vec<Target>,
    by_token: HashMap<Token, usize>,
    max_reply_len: usize,
}

impl ReadyHandler for Driver {
    fn charge(&mut self, elapsed: Duration) {
        for target in self.targets.iter_mut().filter(|t| t.state.is_pending()) {
            target.budget.charge(elapsed);
        }
    }

    fn on_ready(&mut self, registry: &Registry, token: Token, readiness: Readiness) {
        let Some(&index) = self.by_token.get(&token) else {
            trace!(token = token.0, "event for unknown token");
            return;
        };
        self.targets[index].on_ready(registry, readiness, self.max_reply_len);
    }

    fn sweep(&mut self, registry: &Registry) {
        for target in &mut self.targets {
            if target.state.is_pending() && target.budget.is_exhausted() {
                debug!(peer = %target.addr, state = ?target.state, "target timed out");
                target.transition(registry, TargetEvent::Failed);
            }
        }
    }
}

impl Driver {
    fn begin(&mut self, registry: &Registry, request: &Bytes) {
        for target in &mut self.targets {
            target.begin(registry, request.clone());
        }
    }

    fn has_pending(&self) -> bool {
        self.targets.iter().any(|t| t.state.is_pending())
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.targets
            .iter()
            .filter(|t| t.state.is_pending())
            .map(|t| t.budget.remaining())
            .min()
    }

    fn fail_pending(&mut self, registry: &Registry) {
        for target in self.targets.iter_mut().filter(|t| t.state.is_pending()) {
            debug!(peer = %target.addr, state = ?target.state, "no readiness before timeout");
            target.transition(registry, TargetEvent::Failed);
        }
    }

    /// Unwraps every reply and checks that they agree.
    fn collect(&self, verifying_key: Option<&VerifyingKey>) -> ClientResult<Bytes> {
        let total = self.targets.len();
        let failed = self
            .targets
            .iter()
            .filter(|t| t.state != TargetState::Done)
            .count();
        if failed > 0 {
            return Err(ClientError::TargetsFailed { failed, total });
        }

        let mut payloads = Vec::with_capacity(total);
        for target in &self.targets {
            let response = target.response().cloned().unwrap_or_default();
            let payload = match verifying_key {
                Some(key) => verify_and_unwrap(ENVELOPE_TAG, &response, key),
                None => unframe_exact(ENVELOPE_TAG, &response),
            }
            .map_err(|source| ClientError::BadReply {
                target: target.addr,
                source,
            })?;
            payloads.push(response.slice_ref(payload));
        }

        match check_consistency(&payloads) {
            Ok(reply) => Ok(reply.clone()),
            Err(Inconsistency::NoReplies) => Err(ClientError::NoTargets),
            Err(Inconsistency::Empty { index }) => Err(ClientError::EmptyReply {
                target: self.targets[index].addr,
            }),
            Err(Inconsistency::Mismatch { index }) => {
                warn!(
                    peer = %self.targets[index].addr,
                    reference = %self.targets[0].addr,
                    "replicas disagree"
                );
                Err(ClientError::Inconsistent {
                    target: self.targets[index].addr,
                    reference: self.targets[0].addr,
                })
            }
        }
    }

    /// Settles the targets after a command: finished targets keep their
    /// connection when `keepalive` is set, everything else is closed.
    fn finish(&mut self, registry: &Registry, keepalive: bool) {
        for target in &mut self.targets {
            let keep = keepalive && target.state == TargetState::Done;
            if !keep {
                target.transition(registry, TargetEvent::Reset);
            }
        }
    }
}
