//! # dbsync-wire: Envelope codec for dbsync
//!
//! Every message exchanged between the fan-out client and the daemon is an
//! *envelope*: an ASCII header `<tag>:<length>:` followed by exactly `length`
//! raw payload bytes.
//!
//! ```text
//! ds:5:PING\0
//! └┬┘└┬┘└──┬─┘
//!  │  │    └── payload (opaque, may contain ':')
//!  │  └─────── decimal length, at most 10 digits
//!  └────────── tag
//! ```
//!
//! A *signed* envelope nests a framed message and its detached signature in
//! an outer frame of the same tag:
//!
//! ```text
//! ds:<n>:ds:<m>:<message><signature>
//! ```
//!
//! The codec is pure: it never touches a socket. Completeness detection
//! ([`try_detect_length`], [`is_complete`]) lets a reader accumulate bytes
//! from a non-blocking socket and know exactly when an envelope has arrived.

mod command;
mod dump;
mod envelope;
mod error;
mod reply;
mod signed;

pub use command::Command;
pub use dump::HexDump;
pub use envelope::{
    Completeness, Detection, ENVELOPE_TAG, MAX_LENGTH_DIGITS, Unframed, frame, frame_into,
    is_complete, try_detect_length, unframe, unframe_exact,
};
pub use error::{WireError, WireResult};
pub use reply::{BackendReply, split_backend_replies};
pub use signed::{sign, verify_and_unwrap};
