//! Fuzz the consensus wire format.
//!
//! Arbitrary bytes must never panic the parser; valid messages must
//! round-trip byte-for-byte and yield stable signing bytes.

#![no_main]

use {libfuzzer_sys::fuzz_target, tripcoin_consensus_pbft::ConsensusMessage};

fuzz_target!(|data: &[u8]| {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return,
    };

    let message: ConsensusMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(_) => return, // rejection is the expected path
    };

    // Accepted messages re-serialize and re-parse to the same value.
    let reserialized = serde_json::to_string(&message).expect("serialize");
    let reparsed: ConsensusMessage =
        serde_json::from_str(&reserialized).expect("reparse own output");
    assert_eq!(message, reparsed);

    // Signing bytes are deterministic and never panic.
    assert_eq!(message.signing_bytes(), message.signing_bytes());
});
