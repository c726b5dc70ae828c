//! Signed envelopes.
//!
//! `sign` produces `frame(tag, frame(tag, data) ++ signature(data))`. The
//! signature is not delimited: it is whatever follows the inner frame.

use bytes::{BufMut, Bytes, BytesMut};
use dbsync_crypto::{SIGNATURE_LENGTH, SigningKey, VerifyingKey};
use tracing::trace;

use crate::envelope::{frame, frame_into, unframe, unframe_exact};
use crate::error::{WireError, WireResult};

/// Frames `data`, appends its signature and frames the result again.
pub fn sign(tag: &str, data: &[u8], key: &SigningKey) -> Bytes {
    let signature = key.sign(data);

    let mut inner = BytesMut::with_capacity(data.len() + SIGNATURE_LENGTH + 16);
    frame_into(tag, data, &mut inner);
    inner.put_slice(&signature.to_bytes());

    frame(tag, &inner)
}

/// Unframes a signed envelope and returns the message if its signature
/// verifies against `key`.
///
/// The outer frame must span `buf` exactly.
pub fn verify_and_unwrap<'a>(tag: &str, buf: &'a [u8], key: &VerifyingKey) -> WireResult<&'a [u8]> {
    let outer = unframe_exact(tag, buf)?;
    let inner = unframe(tag, outer)?;

    let signature = &outer[inner.consumed..];
    if signature.is_empty() {
        return Err(WireError::MissingSignature);
    }

    key.verify_bytes(inner.payload, signature)?;
    trace!(tag, message_len = inner.payload.len(), "signature verified");

    Ok(inner.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Completeness, is_complete};

    fn keypair() -> (SigningKey, VerifyingKey) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let verifying_key = signing_key.verifying_key();
        (signing_key, verifying_key)
    }

    #[test]
    fn signed_envelope_layout() {
        let (signing_key, _) = keypair();
        let signed = sign("ds", b"PING\0", &signing_key);

        let outer = unframe_exact("ds", &signed).unwrap();
        assert!(outer.starts_with(b"ds:5:PING\0"));
        assert_eq!(outer.len(), b"ds:5:PING\0".len() + SIGNATURE_LENGTH);
        assert_eq!(is_complete("ds", &signed), Completeness::Exact);
    }

    #[test]
    fn verify_roundtrip() {
        let (signing_key, verifying_key) = keypair();
        let signed = sign("ds", b"SET key value\0", &signing_key);

        let message = verify_and_unwrap("ds", &signed, &verifying_key).unwrap();
        assert_eq!(message, b"SET key value\0");
    }

    #[test]
    fn unsigned_envelope_is_rejected() {
        let (_, verifying_key) = keypair();
        let unsigned = frame("ds", &frame("ds", b"PING\0"));

        assert!(matches!(
            verify_and_unwrap("ds", &unsigned, &verifying_key),
            Err(WireError::MissingSignature)
        ));
    }

    #[test]
    fn plain_envelope_is_rejected() {
        let (_, verifying_key) = keypair();
        let plain = frame("ds", b"PING\0");

        assert!(verify_and_unwrap("ds", &plain, &verifying_key).is_err());
    }

    #[test]
    fn foreign_key_is_rejected() {
        let (signing_key, _) = keypair();
        let other = SigningKey::from_bytes(&[9u8; 32]).verifying_key();
        let signed = sign("ds", b"PING\0", &signing_key);

        assert!(matches!(
            verify_and_unwrap("ds", &signed, &other),
            Err(WireError::Signature(_))
        ));
    }

    #[test]
    fn every_single_byte_flip_is_rejected() {
        let (signing_key, verifying_key) = keypair();
        let signed = sign("ds", b"GET key\0", &signing_key);
        let header_len = signed.len() - unframe_exact("ds", &signed).unwrap().len();

        for index in header_len..signed.len() {
            let mut tampered = signed.to_vec();
            tampered[index] ^= 0x01;
            assert!(
                verify_and_unwrap("ds", &tampered, &verifying_key).is_err(),
                "flip at byte {index} was accepted"
            );
        }
    }
}
