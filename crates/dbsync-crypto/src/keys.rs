//! Ed25519 signing and verifying keys.
//!
//! Wraps `ed25519-dalek` with the small surface the envelope codec needs:
//! sign a message, verify a detached signature blob of exactly
//! [`SIGNATURE_LENGTH`] bytes, and load or store keys as PEM files.

use std::fs;
use std::path::Path;

use ed25519_dalek::Signer;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::pem::{find_block, write_pem};

/// Length in bytes of a detached Ed25519 signature.
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// PKCS#8 v1 prefix for an Ed25519 private key (RFC 8410 §7).
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// SubjectPublicKeyInfo prefix for an Ed25519 public key (RFC 8410 §4).
const SPKI_ED25519_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Private key used to sign outgoing envelopes.
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

// Manual Debug implementation to avoid exposing key material
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("inner", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Generates a new signing key from system randomness.
    pub fn generate() -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates a signing key from a 32-byte seed.
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public half of this key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Signs `message`. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }

    /// Decodes a PKCS#8 `PRIVATE KEY` PEM document.
    pub fn from_pem(pem: &[u8]) -> CryptoResult<Self> {
        let der = Zeroizing::new(find_block(pem, PRIVATE_KEY_LABEL)?);
        let seed = der
            .strip_prefix(&PKCS8_ED25519_PREFIX)
            .and_then(|rest| <[u8; 32]>::try_from(rest).ok())
            .ok_or_else(|| {
                CryptoError::UnsupportedKey("expected a PKCS#8 Ed25519 private key".to_string())
            })?;
        let seed = Zeroizing::new(seed);
        Ok(Self::from_bytes(&seed))
    }

    /// Encodes this key as a PKCS#8 `PRIVATE KEY` PEM document.
    pub fn to_pem(&self) -> Zeroizing<String> {
        let mut der = Zeroizing::new(Vec::with_capacity(PKCS8_ED25519_PREFIX.len() + 32));
        der.extend_from_slice(&PKCS8_ED25519_PREFIX);
        der.extend_from_slice(&self.inner.to_bytes());
        Zeroizing::new(write_pem(PRIVATE_KEY_LABEL, &der))
    }

    /// Loads a private key from a PEM file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let pem = Zeroizing::new(fs::read(path).map_err(|source| CryptoError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?);
        Self::from_pem(&pem)
    }
}

/// Public key used to verify incoming envelopes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl VerifyingKey {
    /// Creates a verifying key from its 32-byte compressed point.
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::UnsupportedKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Returns the 32-byte compressed point.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Verifies `signature` over `message`.
    ///
    /// Uses strict verification (RFC 8032 §5.1.7), rejecting non-canonical
    /// signatures.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        self.inner
            .verify_strict(message, &signature.inner)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    /// Verifies a raw signature blob taken off the wire.
    pub fn verify_bytes(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let signature = Signature::from_slice(signature)?;
        self.verify(message, &signature)
    }

    /// Decodes a SubjectPublicKeyInfo `PUBLIC KEY` PEM document.
    pub fn from_pem(pem: &[u8]) -> CryptoResult<Self> {
        let der = find_block(pem, PUBLIC_KEY_LABEL)?;
        let point = der
            .strip_prefix(&SPKI_ED25519_PREFIX)
            .and_then(|rest| <[u8; 32]>::try_from(rest).ok())
            .ok_or_else(|| {
                CryptoError::UnsupportedKey("expected an Ed25519 SubjectPublicKeyInfo".to_string())
            })?;
        Self::from_bytes(&point)
    }

    /// Encodes this key as a `PUBLIC KEY` PEM document.
    pub fn to_pem(&self) -> String {
        let mut der = Vec::with_capacity(SPKI_ED25519_PREFIX.len() + 32);
        der.extend_from_slice(&SPKI_ED25519_PREFIX);
        der.extend_from_slice(&self.inner.to_bytes());
        write_pem(PUBLIC_KEY_LABEL, &der)
    }

    /// Loads a public key from a PEM file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let pem = fs::read(path).map_err(|source| CryptoError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(&pem)
    }
}

/// Detached Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    /// Parses a signature blob, which must be exactly [`SIGNATURE_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array = <[u8; SIGNATURE_LENGTH]>::try_from(bytes).map_err(|_| {
            CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            }
        })?;
        Ok(Self {
            inner: ed25519_dalek::Signature::from_bytes(&array),
        })
    }

    /// Returns the raw signature bytes.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        self.inner.to_bytes()
    }
}
