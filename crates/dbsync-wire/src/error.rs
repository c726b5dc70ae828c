//! Wire protocol error types.

use thiserror::Error;

/// Result type for codec operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while unframing, verifying or decoding an envelope.
///
/// Every variant is a framing error from the caller's point of view: the
/// envelope is rejected as a whole.
#[derive(Debug, Error)]
pub enum WireError {
    /// The buffer does not start with the expected tag.
    #[error("envelope tag mismatch: expected {expected:?}")]
    TagMismatch { expected: String },

    /// The header is not of the form `<tag>:<digits>:`.
    #[error("malformed envelope header")]
    MalformedHeader,

    /// The buffer ends before the header does.
    #[error("envelope header is incomplete")]
    IncompleteHeader,

    /// The declared payload length exceeds the bytes available.
    #[error("declared length {declared} exceeds {available} available bytes")]
    Truncated { declared: usize, available: usize },

    /// Bytes remain after a frame that must span the whole buffer.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// A signed envelope has no signature after its inner frame.
    #[error("signed envelope carries no signature")]
    MissingSignature,

    /// Signature verification failed.
    #[error("signature rejected: {0}")]
    Signature(#[from] dbsync_crypto::CryptoError),

    /// Command payload is not NUL-terminated text.
    #[error("invalid command payload: {0}")]
    InvalidCommand(&'static str),
}
