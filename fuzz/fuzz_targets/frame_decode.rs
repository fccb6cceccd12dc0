//! Fuzz target for Frame::decode
//!
//! Feeds arbitrary text to the STOMP decoder to find:
//! - Parser panics on truncated or unterminated frames
//! - Header escapes that slip through unescaping
//! - Frames that decode but do not survive a re-encode
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use clubchat_proto::{Frame, Inbound};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(Inbound::Frame(frame)) = Frame::decode(text) {
        let encoded = frame.encode();
        match Frame::decode(&encoded) {
            Ok(Inbound::Frame(again)) => assert_eq!(again, frame, "re-encode changed the frame"),
            other => panic!("re-encoded frame failed to decode: {other:?}"),
        }
    }
});
