//! Cryptography error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for key and signature operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from key loading, signing and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key file could not be read or written.
    #[error("key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// PEM text was not well formed.
    #[error("invalid PEM format: {0}")]
    InvalidPem(String),

    /// PEM body was not valid base64.
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// No PEM block with the expected label was found.
    #[error("no {label} block found")]
    MissingBlock { label: &'static str },

    /// DER content is not an Ed25519 key of the expected kind.
    #[error("unsupported key encoding: {0}")]
    UnsupportedKey(String),

    /// Signature blob has the wrong length.
    #[error("signature must be {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// Signature did not verify against the message.
    #[error("signature verification failed")]
    VerificationFailed,
}
