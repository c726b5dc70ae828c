//! Connection state management.
//!
//! ```text
//! Accepted ──Registered──> Reading ──RequestReady──> Writing
//!                           │  ^                        │
//!                           │  └──Sent{keep_open: true}─┤
//!                           │                           └─Sent{keep_open: false}─┐
//!                           └─Malformed / PeerClosed / Failed / TimedOut ────────┴─> Closed
//! ```

use std::net::SocketAddr;

use bytes::Bytes;
use dbsync_io::{CappedBuf, Registration, SendCursor, TimeBudget};
use mio::net::TcpStream;
use mio::{Registry, Token};

use crate::error::ServerResult;

/// Lifecycle state of a connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Accepted,
    Reading,
    Writing,
    Closed,
}

/// What happened on a connection since its last transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// The slot was set up after accept.
    Registered,
    /// Bytes arrived but the request is not complete yet.
    Incomplete,
    /// A complete request was processed and its response queued.
    RequestReady,
    /// The request can never become a valid envelope.
    Malformed,
    /// The peer closed before sending a complete request.
    PeerClosed,
    /// Part of the response is still queued.
    WriteBlocked,
    /// The response was fully written.
    Sent { keep_open: bool },
    /// A socket error.
    Failed,
    /// The time budget ran out.
    TimedOut,
}

/// Computes the next state and the registration change it requires.
///
/// Events that make no sense in the current state close the connection.
pub fn next_state(state: ConnState, event: ConnEvent) -> (ConnState, Registration) {
    use ConnEvent as E;
    use ConnState as S;

    match (state, event) {
        (S::Closed, _) => (S::Closed, Registration::Unchanged),
        (_, E::Malformed | E::PeerClosed | E::Failed | E::TimedOut) => {
            (S::Closed, Registration::Deregister)
        }
        (S::Accepted, E::Registered) => (S::Reading, Registration::Readable),
        (S::Reading, E::Incomplete) | (S::Writing, E::WriteBlocked) => {
            (state, Registration::Unchanged)
        }
        (S::Reading, E::RequestReady) => (S::Writing, Registration::Writable),
        (S::Writing, E::Sent { keep_open: true }) => (S::Reading, Registration::Readable),
        _ => (S::Closed, Registration::Deregister),
    }
}

/// One accepted connection slot.
pub struct Connection {
    pub token: Token,
    pub peer: SocketAddr,
    pub stream: TcpStream,
    pub state: ConnState,
    registered: bool,
    /// Request bytes, capped at the configured read capacity.
    pub recv: CappedBuf,
    /// Pending response.
    pub send: SendCursor,
    pub budget: TimeBudget,
    /// Set once a valid envelope has been decoded on this connection.
    pub trusted: bool,
    /// The peer shut down its write half.
    pub peer_eof: bool,
}

impl Connection {
    pub fn new(
        token: Token,
        peer: SocketAddr,
        stream: TcpStream,
        recv: CappedBuf,
        budget: TimeBudget,
    ) -> Self {
        Self {
            token,
            peer,
            stream,
            state: ConnState::Accepted,
            registered: false,
            recv,
            send: SendCursor::new(Bytes::new()),
            budget,
            trusted: false,
            peer_eof: false,
        }
    }

    /// Applies `event` and the registration change it implies.
    pub fn transition(&mut self, registry: &Registry, event: ConnEvent) -> ServerResult<()> {
        let (state, registration) = next_state(self.state, event);
        self.state = state;
        registration.apply(registry, &mut self.stream, self.token, &mut self.registered)?;
        Ok(())
    }

    /// Queues `response` and clears the request buffer.
    pub fn queue_response(&mut self, response: Bytes, read_capacity: usize) {
        self.send = SendCursor::new(response);
        self.recv.reset(read_capacity);
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn request_cycle_without_keepalive() {
        let (state, reg) = next_state(ConnState::Accepted, ConnEvent::Registered);
        assert_eq!((state, reg), (ConnState::Reading, Registration::Readable));

        let (state, reg) = next_state(state, ConnEvent::Incomplete);
        assert_eq!((state, reg), (ConnState::Reading, Registration::Unchanged));

        let (state, reg) = next_state(state, ConnEvent::RequestReady);
        assert_eq!((state, reg), (ConnState::Writing, Registration::Writable));

        let (state, reg) = next_state(state, ConnEvent::WriteBlocked);
        assert_eq!((state, reg), (ConnState::Writing, Registration::Unchanged));

        let (state, reg) = next_state(state, ConnEvent::Sent { keep_open: false });
        assert_eq!((state, reg), (ConnState::Closed, Registration::Deregister));
    }

    #[test]
    fn keepalive_returns_to_reading() {
        let (state, reg) = next_state(ConnState::Writing, ConnEvent::Sent { keep_open: true });
        assert_eq!((state, reg), (ConnState::Reading, Registration::Readable));
    }

    #[test_case(ConnState::Accepted ; "accepted")]
    #[test_case(ConnState::Reading ; "reading")]
    #[test_case(ConnState::Writing ; "writing")]
    fn timeout_closes_from_any_live_state(state: ConnState) {
        assert_eq!(
            next_state(state, ConnEvent::TimedOut),
            (ConnState::Closed, Registration::Deregister)
        );
    }

    #[test_case(ConnState::Reading, ConnEvent::Sent { keep_open: true } ; "sent while reading")]
    #[test_case(ConnState::Writing, ConnEvent::RequestReady ; "request while writing")]
    #[test_case(ConnState::Accepted, ConnEvent::Incomplete ; "read before registration")]
    fn out_of_order_events_close(state: ConnState, event: ConnEvent) {
        assert_eq!(next_state(state, event).0, ConnState::Closed);
    }

    #[test]
    fn closed_is_terminal() {
        assert_eq!(
            next_state(ConnState::Closed, ConnEvent::Registered),
            (ConnState::Closed, Registration::Unchanged)
        );
    }
}
