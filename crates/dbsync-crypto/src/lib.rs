//! # dbsync-crypto: Envelope signing keys
//!
//! Ed25519 key material used to sign outgoing `ds` envelopes and to verify
//! incoming ones. Keys are stored on disk in PEM form (PKCS#8 for private
//! keys, SubjectPublicKeyInfo for public keys) so they can be produced by
//! `openssl genpkey -algorithm ed25519` as well as by `dbsync keygen`.
//!
//! ```
//! use dbsync_crypto::SigningKey;
//!
//! let signing_key = SigningKey::generate();
//! let verifying_key = signing_key.verifying_key();
//!
//! let signature = signing_key.sign(b"SET key value\0");
//! assert!(verifying_key.verify(b"SET key value\0", &signature).is_ok());
//! ```

mod error;
mod keys;
mod pem;

pub use error::{CryptoError, CryptoResult};
pub use keys::{SIGNATURE_LENGTH, Signature, SigningKey, VerifyingKey};
pub use pem::{PemBlock, parse_pem, write_pem};
