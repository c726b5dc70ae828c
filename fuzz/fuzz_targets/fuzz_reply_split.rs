#![no_main]

use dbsync_wire::{Command, frame, split_backend_replies};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(replies) = split_backend_replies(data) {
        // Length fields may carry leading zeros, so compare after a
        // second parse rather than byte for byte.
        let mut rebuilt = Vec::with_capacity(data.len());
        for reply in &replies {
            rebuilt.extend_from_slice(&frame(reply.backend, reply.reply));
        }
        let reparsed = split_backend_replies(&rebuilt).expect("re-framed replies must parse");
        assert_eq!(reparsed, replies);
    }

    if let Ok(command) = Command::decode(data) {
        assert_eq!(&command.encode()[..], data);
    }
});
