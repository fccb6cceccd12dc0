//! Fuzz target for chat and REST payload decoding
//!
//! Message bodies arrive from the server with identifiers as numbers or
//! strings and optional timestamps in two formats. Decoding arbitrary JSON
//! must never panic, and a decoded message must serialize back to something
//! that decodes to the same value.

#![no_main]

use clubchat_proto::{ApiEnvelope, ChatMessage, RoomDirectory, RoomMember};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = serde_json::from_slice::<ChatMessage>(data) {
        let json = serde_json::to_vec(&message).unwrap_or_default();
        let again = serde_json::from_slice::<ChatMessage>(&json);
        assert_eq!(again.ok(), Some(message), "message did not survive re-encode");
    }

    let _ = serde_json::from_slice::<ApiEnvelope<Vec<RoomMember>>>(data);
    let _ = serde_json::from_slice::<ApiEnvelope<RoomDirectory>>(data);
});
