//! Splitting an aggregated daemon reply into per-backend replies.
//!
//! The daemon answers a command with one frame per configured backend,
//! tagged with the backend kind, concatenated inside the outer `ds`
//! envelope:
//!
//! ```text
//! redis:5:PONG\0redis:5:PONG\0
//! ```

use crate::envelope::unframe;
use crate::error::{WireError, WireResult};

/// One backend's share of an aggregated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply<'a> {
    /// Backend kind the reply came from.
    pub backend: &'a str,
    /// Raw reply bytes.
    pub reply: &'a [u8],
}

/// Splits `payload` into its per-backend frames, in dispatch order.
pub fn split_backend_replies(payload: &[u8]) -> WireResult<Vec<BackendReply<'_>>> {
    let mut replies = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let tag_len = rest
            .iter()
            .position(|&b| b == b':')
            .ok_or(WireError::MalformedHeader)?;
        let backend =
            std::str::from_utf8(&rest[..tag_len]).map_err(|_| WireError::MalformedHeader)?;
        if backend.is_empty() {
            return Err(WireError::MalformedHeader);
        }

        let unframed = unframe(backend, rest)?;
        replies.push(BackendReply {
            backend,
            reply: unframed.payload,
        });
        rest = &rest[unframed.consumed..];
    }

    Ok(replies)
}
