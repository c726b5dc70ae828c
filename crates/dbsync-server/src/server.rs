//! The daemon event loop.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use dbsync_io::{
    BytesMutPool, CappedBuf, Readiness, ReadyHandler, Registration, Scheduler, TimeBudget,
};
use dbsync_wire::{
    Command, Completeness, Detection, ENVELOPE_TAG, HexDump, WireResult, frame, is_complete,
    sign, try_detect_length, unframe_exact, verify_and_unwrap,
};
use mio::net::TcpListener;
use mio::{Registry, Token, Waker};
use tracing::{debug, error, info, trace, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnEvent, ConnState, Connection};
use crate::dispatch::Dispatcher;
use crate::error::{ServerError, ServerResult};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
#[cfg(unix)]
const SIGNALS: Token = Token(2);
const FIRST_CONNECTION: usize = 3;

const EVENT_CAPACITY: usize = 1024;

/// Initial receive buffer size; buffers grow up to the read capacity.
const INITIAL_READ_BUFFER: usize = 1024;

/// Stops a running [`Server`] from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Asks the event loop to stop after the current turn.
    pub fn shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake event loop");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// The dbsync daemon.
///
/// Accepts connections, reads one `ds` envelope per request, verifies it
/// when a public key is configured, dispatches the command to every backend
/// and writes back one `ds` envelope holding the framed replies.
pub struct Server {
    scheduler: Scheduler,
    daemon: Daemon,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Binds the listener and prepares one adapter per configured backend.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        if config.backends.is_empty() {
            return Err(ServerError::NoBackends);
        }
        let dispatcher = Dispatcher::from_addrs(&config.backends)?;
        Self::with_dispatcher(config, dispatcher)
    }

    /// Binds the listener and dispatches to the given backends.
    pub fn with_dispatcher(config: ServerConfig, dispatcher: Dispatcher) -> ServerResult<Self> {
        if dispatcher.is_empty() {
            return Err(ServerError::NoBackends);
        }

        let scheduler = Scheduler::new(EVENT_CAPACITY)?;
        let mut listener =
            TcpListener::bind(config.bind_addr).map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        let mut registered = false;
        Registration::Readable.apply(
            scheduler.registry(),
            &mut listener,
            LISTENER,
            &mut registered,
        )?;

        let requested = Arc::new(AtomicBool::new(false));
        let shutdown = ShutdownHandle {
            waker: Arc::new(scheduler.waker(WAKER)?),
            requested: Arc::clone(&requested),
        };

        info!(
            addr = %listener.local_addr()?,
            backends = dispatcher.len(),
            verify = config.verifying_key.is_some(),
            sign = config.signing_key.is_some(),
            keepalive = config.keepalive,
            "dbsync daemon listening"
        );

        let pool = BytesMutPool::new(
            config.max_connections.max(1),
            INITIAL_READ_BUFFER.min(config.read_capacity).max(1),
        );

        Ok(Self {
            scheduler,
            daemon: Daemon {
                config,
                listener,
                connections: HashMap::new(),
                next_token: FIRST_CONNECTION,
                dispatcher,
                pool,
                shutdown: requested,
                #[cfg(unix)]
                signals: None,
            },
            shutdown,
        })
    }

    /// Stops the loop on SIGINT or SIGTERM.
    #[cfg(unix)]
    pub fn with_signal_handling(mut self) -> ServerResult<Self> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook_mio::v1_0::Signals;

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|e| ServerError::Signals(e.to_string()))?;
        let mut registered = false;
        Registration::Readable.apply(
            self.scheduler.registry(),
            &mut signals,
            SIGNALS,
            &mut registered,
        )?;
        self.daemon.signals = Some(signals);
        Ok(self)
    }

    /// Stops the loop on Ctrl-C.
    #[cfg(windows)]
    pub fn with_signal_handling(self) -> ServerResult<Self> {
        let handle = self.shutdown_handle();
        ctrlc::set_handler(move || handle.shutdown())
            .map_err(|e| ServerError::Signals(e.to_string()))?;
        Ok(self)
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.daemon.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of open connection slots.
    pub fn connection_count(&self) -> usize {
        self.daemon.connections.len()
    }

    /// Runs the event loop until shutdown is requested.
    pub fn run(&mut self) -> ServerResult<()> {
        while !self.shutdown.is_shutdown() {
            let timeout = self.daemon.next_timeout();
            self.scheduler.turn(timeout, &mut self.daemon)?;
        }

        self.daemon.close_all(self.scheduler.registry());
        info!("dbsync daemon stopped");
        Ok(())
    }
}

struct Daemon {
    config: ServerConfig,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    dispatcher: Dispatcher,
    pool: BytesMutPool,
    shutdown: Arc<AtomicBool>,
    #[cfg(unix)]
    signals: Option<signal_hook_mio::v1_0::Signals>,
}

impl ReadyHandler for Daemon {
    fn charge(&mut self, elapsed: Duration) {
        for conn in self.connections.values_mut() {
            conn.budget.charge(elapsed);
        }
    }

    fn on_ready(&mut self, registry: &Registry, token: Token, readiness: Readiness) {
        match token {
            LISTENER => self.accept(registry),
            WAKER => trace!("event loop woken"),
            #[cfg(unix)]
            SIGNALS => self.drain_signals(),
            token => self.service(registry, token, readiness),
        }
    }

    fn sweep(&mut self, registry: &Registry) {
        let expired: Vec<Token> = self
            .connections
            .values()
            .filter(|conn| conn.budget.is_exhausted())
            .map(|conn| conn.token)
            .collect();

        for token in expired {
            if let Some(conn) = self.connections.get_mut(&token) {
                debug!(token = token.0, peer = %conn.peer, state = ?conn.state, "connection timed out");
                if let Err(e) = conn.transition(registry, ConnEvent::TimedOut) {
                    debug!(token = token.0, error = %e, "deregistration failed");
                }
            }
            self.release(token);
        }
    }
}

impl Daemon {
    /// Shortest remaining budget, used as the poll timeout.
    fn next_timeout(&self) -> Option<Duration> {
        self.connections
            .values()
            .map(|conn| conn.budget.remaining())
            .min()
    }

    fn accept(&mut self, registry: &Registry) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.connections.len() >= self.config.max_connections {
                        debug!(%peer, limit = self.config.max_connections, "connection limit reached, closing");
                        drop(stream);
                        continue;
                    }

                    let token = self.allocate_token();
                    let recv = CappedBuf::with_buffer(self.pool.get(), self.config.read_capacity);
                    let budget = TimeBudget::new(self.config.connection_timeout);
                    let mut conn = Connection::new(token, peer, stream, recv, budget);

                    if let Err(e) = conn.transition(registry, ConnEvent::Registered) {
                        warn!(%peer, error = %e, "failed to register connection");
                        self.pool.put(conn.recv.into_inner());
                        continue;
                    }

                    debug!(token = token.0, %peer, "connection accepted");
                    self.connections.insert(token, conn);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn allocate_token(&mut self) -> Token {
        loop {
            let token = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1).max(FIRST_CONNECTION);
            if !self.connections.contains_key(&token) {
                return token;
            }
        }
    }

    fn service(&mut self, registry: &Registry, token: Token, readiness: Readiness) {
        let Some(conn) = self.connections.get_mut(&token) else {
            trace!(token = token.0, "event for released connection");
            return;
        };

        let event = match conn.state {
            ConnState::Reading if readiness.readable || readiness.read_closed || readiness.error => {
                read_request(conn, &mut self.dispatcher, &self.config)
            }
            ConnState::Writing if readiness.writable || readiness.error => {
                write_response(conn, self.config.keepalive)
            }
            _ if readiness.error => ConnEvent::Failed,
            _ => return,
        };

        let registration_failed = match conn.transition(registry, event) {
            Ok(()) => false,
            Err(e) => {
                warn!(token = token.0, peer = %conn.peer, error = %e, "registration change failed");
                true
            }
        };

        if registration_failed || conn.is_closed() {
            self.release(token);
        }
    }

    /// Drops a connection slot and recycles its receive buffer.
    fn release(&mut self, token: Token) {
        if let Some(conn) = self.connections.remove(&token) {
            trace!(token = token.0, peer = %conn.peer, "connection released");
            self.pool.put(conn.recv.into_inner());
        }
    }

    fn close_all(&mut self, registry: &Registry) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(conn) = self.connections.get_mut(&token) {
                if let Err(e) = conn.transition(registry, ConnEvent::Failed) {
                    debug!(token = token.0, error = %e, "deregistration failed");
                }
            }
            self.release(token);
        }
    }

    #[cfg(unix)]
    fn drain_signals(&mut self) {
        if let Some(signals) = self.signals.as_mut() {
            for signal in signals.pending() {
                info!(signal, "shutdown signal received");
                self.shutdown.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Completeness of a request, treating a declared total above the read
/// capacity as malformed since it can never fit.
fn request_status(buf: &[u8], capacity: usize) -> Completeness {
    match try_detect_length(ENVELOPE_TAG, buf) {
        Detection::Length(total) if total > capacity => Completeness::Malformed,
        _ => is_complete(ENVELOPE_TAG, buf),
    }
}

fn decode_request(buf: &[u8], config: &ServerConfig) -> WireResult<Command> {
    let payload = match &config.verifying_key {
        Some(key) => verify_and_unwrap(ENVELOPE_TAG, buf, key)?,
        None => unframe_exact(ENVELOPE_TAG, buf)?,
    };
    Command::decode(payload)
}

fn encode_response(payload: &[u8], config: &ServerConfig) -> Bytes {
    match &config.signing_key {
        Some(key) => sign(ENVELOPE_TAG, payload, key),
        None => frame(ENVELOPE_TAG, payload),
    }
}

fn read_request(
    conn: &mut Connection,
    dispatcher: &mut Dispatcher,
    config: &ServerConfig,
) -> ConnEvent {
    let fill = match conn.recv.fill_from(&mut conn.stream) {
        Ok(fill) => fill,
        Err(e) => {
            debug!(peer = %conn.peer, error = %e, "read failed");
            return ConnEvent::Failed;
        }
    };

    if fill.bytes > 0 {
        conn.budget.refresh();
        trace!(peer = %conn.peer, bytes = fill.bytes, buffered = %HexDump(conn.recv.as_slice()), "request bytes");
    }
    if fill.eof {
        conn.peer_eof = true;
    }

    match request_status(conn.recv.as_slice(), config.read_capacity) {
        Completeness::Incomplete if fill.eof => {
            debug!(peer = %conn.peer, buffered = conn.recv.len(), "peer closed before a complete request");
            ConnEvent::PeerClosed
        }
        Completeness::Incomplete => ConnEvent::Incomplete,
        Completeness::Malformed => {
            debug!(peer = %conn.peer, buffered = conn.recv.len(), "malformed request");
            ConnEvent::Malformed
        }
        Completeness::Exact => match decode_request(conn.recv.as_slice(), config) {
            Ok(command) => {
                conn.trusted = true;
                debug!(peer = %conn.peer, %command, "request accepted");

                let payload = dispatcher.dispatch(&command).unwrap_or_default();
                let response = encode_response(&payload, config);
                trace!(peer = %conn.peer, response = %HexDump(&response), "response queued");

                conn.queue_response(response, config.read_capacity);
                ConnEvent::RequestReady
            }
            Err(e) => {
                debug!(peer = %conn.peer, error = %e, "request rejected");
                ConnEvent::Malformed
            }
        },
    }
}

fn write_response(conn: &mut Connection, keepalive: bool) -> ConnEvent {
    let before = conn.send.consumed();
    match conn.send.write_to(&mut conn.stream) {
        Ok(done) => {
            if conn.send.consumed() > before {
                conn.budget.refresh();
            }
            if done {
                let keep_open = keepalive && conn.trusted && !conn.peer_eof;
                trace!(peer = %conn.peer, bytes = conn.send.consumed(), keep_open, "response sent");
                ConnEvent::Sent { keep_open }
            } else {
                ConnEvent::WriteBlocked
            }
        }
        Err(e) => {
            debug!(peer = %conn.peer, error = %e, "write failed");
            ConnEvent::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_declaration_is_malformed() {
        assert_eq!(request_status(b"ds:100:", 64), Completeness::Malformed);
        assert_eq!(request_status(b"ds:10:", 64), Completeness::Incomplete);
    }

    #[test]
    fn missing_nul_is_rejected_before_dispatch() {
        let config = ServerConfig::new(([127, 0, 0, 1], 0));
        assert!(decode_request(b"ds:4:PING", &config).is_err());
        assert_eq!(
            decode_request(b"ds:5:PING\0", &config).unwrap().as_str(),
            "PING"
        );
    }

    #[test]
    fn unsigned_request_is_rejected_when_verifying() {
        let key = dbsync_crypto::SigningKey::from_bytes(&[1u8; 32]);
        let config = ServerConfig::new(([127, 0, 0, 1], 0)).with_verifying_key(key.verifying_key());

        assert!(decode_request(b"ds:5:PING\0", &config).is_err());
        let signed = sign(ENVELOPE_TAG, b"PING\0", &key);
        assert!(decode_request(&signed, &config).is_ok());
    }

    #[test]
    fn empty_dispatch_yields_empty_envelope() {
        let config = ServerConfig::new(([127, 0, 0, 1], 0));
        assert_eq!(&encode_response(b"", &config)[..], b"ds:0:");
    }
}
