#![no_main]

use std::cmp::Ordering;

use dbsync_wire::{Completeness, Detection, ENVELOPE_TAG, is_complete, try_detect_length, unframe};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let completeness = is_complete(ENVELOPE_TAG, data);

    match try_detect_length(ENVELOPE_TAG, data) {
        Detection::Malformed => assert_eq!(completeness, Completeness::Malformed),
        Detection::NeedMore => assert_eq!(completeness, Completeness::Incomplete),
        Detection::Length(total) => {
            let expected = match data.len().cmp(&total) {
                Ordering::Less => Completeness::Incomplete,
                Ordering::Equal => Completeness::Exact,
                Ordering::Greater => Completeness::Malformed,
            };
            assert_eq!(completeness, expected);
        }
    }

    // Every strict prefix of a complete envelope is incomplete, never malformed.
    if completeness == Completeness::Exact {
        let unframed = unframe(ENVELOPE_TAG, data).expect("exact envelope must unframe");
        assert_eq!(unframed.consumed, data.len());
        for end in 0..data.len() {
            assert_eq!(
                is_complete(ENVELOPE_TAG, &data[..end]),
                Completeness::Incomplete
            );
        }
    }
});
