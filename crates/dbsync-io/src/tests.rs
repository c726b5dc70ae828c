//! Loopback tests for the scheduler and registrations.

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream as StdTcpStream;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Registry, Token};

use crate::{CappedBuf, Readiness, ReadyHandler, Registration, Scheduler};

const LISTENER: Token = Token(0);
const STREAM: Token = Token(1);
const WAIT: Option<Duration> = Some(Duration::from_secs(2));

#[derive(Default)]
struct Recorder {
    seen: HashMap<Token, Readiness>,
    sweeps: usize,
}

impl ReadyHandler for Recorder {
    fn on_ready(&mut self, _registry: &Registry, token: Token, readiness: Readiness) {
        self.seen.insert(token, readiness);
    }

    fn sweep(&mut self, _registry: &Registry) {
        self.sweeps += 1;
    }
}

fn listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap()
}

#[test]
fn listener_reports_readable_on_connect() {
    let mut scheduler = Scheduler::new(16).unwrap();
    let mut listener = listener();
    let mut registered = false;
    Registration::Readable
        .apply(scheduler.registry(), &mut listener, LISTENER, &mut registered)
        .unwrap();
    assert!(registered);

    let _client = StdTcpStream::connect(listener.local_addr().unwrap()).unwrap();

    let mut recorder = Recorder::default();
    let turn = scheduler.turn(WAIT, &mut recorder).unwrap();

    assert!(!turn.timed_out());
    assert!(recorder.seen[&LISTENER].readable);
    assert_eq!(recorder.sweeps, 1);
}

#[test]
fn empty_wait_times_out() {
    let mut scheduler = Scheduler::new(16).unwrap();
    let mut recorder = Recorder::default();

    let turn = scheduler
        .turn(Some(Duration::from_millis(20)), &mut recorder)
        .unwrap();

    assert!(turn.timed_out());
    assert!(turn.elapsed >= Duration::from_millis(10));
    assert_eq!(recorder.sweeps, 1);
}

#[test]
fn stream_moves_from_writable_to_readable() {
    let mut scheduler = Scheduler::new(16).unwrap();
    let listener = listener();
    let mut stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let mut registered = false;

    Registration::Writable
        .apply(scheduler.registry(), &mut stream, STREAM, &mut registered)
        .unwrap();
    let mut recorder = Recorder::default();
    scheduler.turn(WAIT, &mut recorder).unwrap();
    assert!(recorder.seen[&STREAM].writable);

    let (mut peer, _) = loop {
        match listener.accept() {
            Ok(accepted) => break accepted,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => panic!("accept failed: {e}"),
        }
    };
    peer.write_all(b"ds:2:ok").unwrap();

    Registration::Readable
        .apply(scheduler.registry(), &mut stream, STREAM, &mut registered)
        .unwrap();
    let mut recorder = Recorder::default();
    scheduler.turn(WAIT, &mut recorder).unwrap();
    assert!(recorder.seen[&STREAM].readable);

    let mut buf = CappedBuf::new(64);
    buf.fill_from(&mut stream).unwrap();
    assert_eq!(buf.as_slice(), b"ds:2:ok");
}

#[test]
fn deregister_is_idempotent() {
    let scheduler = Scheduler::new(16).unwrap();
    let mut listener = listener();
    let mut registered = false;

    Registration::Deregister
        .apply(scheduler.registry(), &mut listener, LISTENER, &mut registered)
        .unwrap();
    Registration::Readable
        .apply(scheduler.registry(), &mut listener, LISTENER, &mut registered)
        .unwrap();
    Registration::Deregister
        .apply(scheduler.registry(), &mut listener, LISTENER, &mut registered)
        .unwrap();
    assert!(!registered);
    Registration::Deregister
        .apply(scheduler.registry(), &mut listener, LISTENER, &mut registered)
        .unwrap();
}

#[test]
fn waker_interrupts_wait() {
    let mut scheduler = Scheduler::new(16).unwrap();
    let waker = scheduler.waker(Token(9)).unwrap();
    waker.wake().unwrap();

    let mut recorder = Recorder::default();
    scheduler.turn(WAIT, &mut recorder).unwrap();
    assert!(recorder.seen.contains_key(&Token(9)));
}
