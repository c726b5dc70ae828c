//! Per-target connection state machine.
//!
//! ```text
//! Init ─ConnectPending─> Connecting ─Connected─> Sending ─Sent─> Receiving ─Received─> Done
//!   │                        │                     │                 │                  │
//!   └──────────Failed────────┴─────────────────────┴─────────────────┴──> Error         │
//!                                                                                        │
//! Done ─Reuse─> Sending                          Done / Error ─Reset─> Init <────────────┘
//! ```

use std::cmp::Ordering;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use dbsync_io::{CappedBuf, Readiness, Registration, SendCursor, TimeBudget};
use dbsync_wire::{Detection, ENVELOPE_TAG, HexDump, try_detect_length};
use mio::net::TcpStream;
use mio::{Registry, Token};
use tracing::{debug, trace, warn};

/// Bytes read before the reply length is known. Far larger than any header.
pub const HEADER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Init,
    Connecting,
    Sending,
    Receiving,
    Done,
    Error,
}

impl TargetState {
    /// The target still needs I/O for the current command.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Sending | Self::Receiving)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    /// A non-blocking connect is in progress.
    ConnectPending,
    /// The connection is established.
    Connected,
    /// Part of the request is still queued.
    SendBlocked,
    /// The whole request was written.
    Sent,
    /// More reply bytes are needed.
    ReceivePending,
    /// The reply envelope is complete.
    Received,
    /// Connect, send or receive failed, or the budget ran out.
    Failed,
    /// A kept-alive connection starts the next command.
    Reuse,
    /// Close the connection and start over.
    Reset,
}

/// Computes the next state and the registration change it requires.
pub fn next_state(state: TargetState, event: TargetEvent) -> (TargetState, Registration) {
    use TargetEvent as E;
    use TargetState as S;

    match (state, event) {
        (_, E::Reset) => (S::Init, Registration::Deregister),
        (S::Error, _) => (S::Error, Registration::Unchanged),
        (_, E::Failed) => (S::Error, Registration::Deregister),
        (S::Init, E::ConnectPending) => (S::Connecting, Registration::Writable),
        (S::Init | S::Connecting, E::Connected) => (S::Sending, Registration::Writable),
        (S::Connecting, E::ConnectPending)
        | (S::Sending, E::SendBlocked)
        | (S::Receiving, E::ReceivePending) => (state, Registration::Unchanged),
        (S::Sending, E::Sent) => (S::Receiving, Registration::Readable),
        (S::Receiving, E::Received) => (S::Done, Registration::Deregister),
        (S::Done, E::Reuse) => (S::Sending, Registration::Writable),
        _ => (S::Error, Registration::Deregister),
    }
}

/// One daemon in a fan-out session.
pub struct Target {
    pub addr: SocketAddr,
    pub token: Token,
    pub state: TargetState,
    stream: Option<TcpStream>,
    registered: bool,
    pub budget: TimeBudget,
    send: SendCursor,
    recv: CappedBuf,
    expected: Option<usize>,
    response: Option<Bytes>,
}

impl Target {
    pub fn new(addr: SocketAddr, token: Token, budget: TimeBudget) -> Self {
        Self {
            addr,
            token,
            state: TargetState::Init,
            stream: None,
            registered: false,
            budget,
            send: SendCursor::default(),
            recv: CappedBuf::new(HEADER_CAPACITY),
            expected: None,
            response: None,
        }
    }

    /// The complete reply envelope of the last command, if any.
    pub fn response(&self) -> Option<&Bytes> {
        self.response.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Applies `event` and its registration change.
    ///
    /// Entering `Init` or `Error` closes the socket. A failed registration
    /// change also closes it and leaves the target in `Error`.
    pub fn transition(&mut self, registry: &Registry, event: TargetEvent) {
        let (state, registration) = next_state(self.state, event);
        trace!(peer = %self.addr, from = ?self.state, to = ?state, ?event, "target transition");
        self.state = state;

        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = registration.apply(registry, stream, self.token, &mut self.registered) {
                warn!(peer = %self.addr, error = %e, "registration change failed");
                self.state = TargetState::Error;
            }
        }

        if matches!(self.state, TargetState::Init | TargetState::Error) {
            self.stream = None;
            self.registered = false;
        }
    }

    /// Prepares for a new command and starts its I/O.
    pub fn begin(&mut self, registry: &Registry, request: Bytes) {
        self.budget.refresh();
        self.send = SendCursor::new(request);
        self.recv.reset(HEADER_CAPACITY);
        self.expected = None;
        self.response = None;

        if self.state == TargetState::Error
            || (self.state == TargetState::Done && !self.kept_stream_is_usable())
        {
            self.transition(registry, TargetEvent::Reset);
        }

        match self.state {
            TargetState::Done => self.transition(registry, TargetEvent::Reuse),
            TargetState::Init => match TcpStream::connect(self.addr) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.transition(registry, TargetEvent::ConnectPending);
                }
                Err(e) => {
                    debug!(peer = %self.addr, error = %e, "connect failed");
                    self.transition(registry, TargetEvent::Failed);
                }
            },
            _ => self.transition(registry, TargetEvent::Failed),
        }
    }

    /// Checks a kept-alive stream before reuse. The peer may have closed it
    /// since the last reply, and unsolicited bytes would corrupt the next one.
    fn kept_stream_is_usable(&self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };

        let mut byte = [0u8; 1];
        match stream.peek(&mut byte) {
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Ok(0) => {
                debug!(peer = %self.addr, "kept connection closed by peer, reconnecting");
                false
            }
            Ok(_) => {
                debug!(peer = %self.addr, "unexpected bytes on kept connection, reconnecting");
                false
            }
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "kept connection unusable, reconnecting");
                false
            }
        }
    }

    /// Runs the I/O the current state is waiting for.
    pub fn on_ready(&mut self, registry: &Registry, readiness: Readiness, max_reply_len: usize) {
        let event = match self.state {
            TargetState::Connecting if readiness.writable || readiness.error => {
                self.finish_connect()
            }
            TargetState::Sending if readiness.writable || readiness.error => self.write_request(),
            TargetState::Receiving
                if readiness.readable || readiness.read_closed || readiness.error =>
            {
                self.read_reply(max_reply_len)
            }
            _ => return,
        };
        self.transition(registry, event);
    }

    fn finish_connect(&mut self) -> TargetEvent {
        let Some(stream) = self.stream.as_ref() else {
            return TargetEvent::Failed;
        };

        match stream.take_error() {
            Ok(None) => {}
            Ok(Some(e)) | Err(e) => {
                debug!(peer = %self.addr, error = %e, "connect failed");
                return TargetEvent::Failed;
            }
        }

        match stream.peer_addr() {
            Ok(_) => {
                debug!(peer = %self.addr, "connected");
                TargetEvent::Connected
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => {
                TargetEvent::ConnectPending
            }
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "connect failed");
                TargetEvent::Failed
            }
        }
    }

    fn write_request(&mut self) -> TargetEvent {
        let Some(stream) = self.stream.as_mut() else {
            return TargetEvent::Failed;
        };

        let before = self.send.consumed();
        match self.send.write_to(stream) {
            Ok(done) => {
                if self.send.consumed() > before {
                    self.budget.refresh();
                }
                if done {
                    trace!(peer = %self.addr, bytes = self.send.consumed(), "request sent");
                    TargetEvent::Sent
                } else {
                    TargetEvent::SendBlocked
                }
            }
            Err(e) => {
                debug!(peer = %self.addr, error = %e, "send failed");
                TargetEvent::Failed
            }
        }
    }

    fn read_reply(&mut self, max_reply_len: usize) -> TargetEvent {
        let Some(stream) = self.stream.as_mut() else {
            return TargetEvent::Failed;
        };

        loop {
            let fill = match self.recv.fill_from(stream) {
                Ok(fill) => fill,
                Err(e) => {
                    debug!(peer = %self.addr, error = %e, "receive failed");
                    return TargetEvent::Failed;
                }
            };
            if fill.bytes > 0 {
                self.budget.refresh();
            }

            let total = match self.expected {
                Some(total) => total,
                None => match try_detect_length(ENVELOPE_TAG, self.recv.as_slice()) {
                    Detection::NeedMore if fill.eof || self.recv.is_full() => {
                        debug!(peer = %self.addr, "reply ended before its header");
                        return TargetEvent::Failed;
                    }
                    Detection::NeedMore => return TargetEvent::ReceivePending,
                    Detection::Malformed => {
                        debug!(peer = %self.addr, buffered = %HexDump(self.recv.as_slice()), "malformed reply header");
                        return TargetEvent::Failed;
                    }
                    Detection::Length(total) if total > max_reply_len => {
                        debug!(peer = %self.addr, total, max_reply_len, "reply too large");
                        return TargetEvent::Failed;
                    }
                    Detection::Length(total) => {
                        self.expected = Some(total);
                        // One byte of headroom so trailing bytes are seen.
                        if total >= self.recv.capacity() {
                            self.recv.grow_to(total + 1);
                            if !fill.eof {
                                continue;
                            }
                        }
                        total
                    }
                },
            };

            return match self.recv.len().cmp(&total) {
                Ordering::Equal => {
                    let response = self.recv.take();
                    trace!(peer = %self.addr, reply = %HexDump(&response), "reply received");
                    self.response = Some(response);
                    TargetEvent::Received
                }
                Ordering::Less if !fill.eof => TargetEvent::ReceivePending,
                Ordering::Less => {
                    debug!(peer = %self.addr, received = self.recv.len(), total, "connection closed mid-reply");
                    TargetEvent::Failed
                }
                Ordering::Greater => {
                    debug!(peer = %self.addr, received = self.recv.len(), total, "trailing bytes after reply");
                    TargetEvent::Failed
                }
            };
        }
    }
}
