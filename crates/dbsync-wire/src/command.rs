//! NUL-terminated command payloads.

use std::fmt;

use bytes::Bytes;

use crate::error::{WireError, WireResult};

/// A backend command as carried inside a `ds` envelope.
///
/// On the wire the command text is followed by a mandatory NUL byte. The
/// text itself must be valid UTF-8 and must not contain NUL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
}

impl Command {
    /// Creates a command from its text.
    pub fn new(text: impl Into<String>) -> WireResult<Self> {
        let text = text.into();
        if text.as_bytes().contains(&0) {
            return Err(WireError::InvalidCommand("interior NUL byte"));
        }
        if text.trim().is_empty() {
            return Err(WireError::InvalidCommand("empty command"));
        }
        Ok(Self { text })
    }

    /// Decodes a received payload, validating the trailing NUL.
    pub fn decode(payload: &[u8]) -> WireResult<Self> {
        let Some((&0, body)) = payload.split_last() else {
            return Err(WireError::InvalidCommand("missing NUL terminator"));
        };
        let text = std::str::from_utf8(body)
            .map_err(|_| WireError::InvalidCommand("command is not valid UTF-8"))?;
        Self::new(text)
    }

    /// Encodes the command as a payload, NUL included.
    pub fn encode(&self) -> Bytes {
        let mut payload = Vec::with_capacity(self.text.len() + 1);
        payload.extend_from_slice(self.text.as_bytes());
        payload.push(0);
        Bytes::from(payload)
    }

    /// Returns the command text without the terminator.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
