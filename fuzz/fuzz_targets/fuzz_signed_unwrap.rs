#![no_main]

use dbsync_crypto::SigningKey;
use dbsync_wire::{ENVELOPE_TAG, sign, verify_and_unwrap};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = SigningKey::from_bytes(&[42u8; 32]);
    let verifying_key = key.verifying_key();

    // Arbitrary bytes must never verify.
    assert!(verify_and_unwrap(ENVELOPE_TAG, data, &verifying_key).is_err());

    let signed = sign(ENVELOPE_TAG, data, &key);
    let message = verify_and_unwrap(ENVELOPE_TAG, &signed, &verifying_key)
        .expect("freshly signed envelope must verify");
    assert_eq!(message, data);
});
