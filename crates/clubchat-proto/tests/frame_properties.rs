//! Property-based tests for STOMP frame encoding/decoding and identifier
//! normalization.
//!
//! Frames come from an untrusted server, so beyond round-tripping our own
//! output the decoder must never panic on arbitrary text.

use clubchat_proto::{Command, Frame, Inbound, RoomId, UserId};
use proptest::prelude::*;

/// Commands whose headers are escaped (everything but CONNECT/CONNECTED)
fn escaped_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Send),
        Just(Command::Subscribe),
        Just(Command::Unsubscribe),
        Just(Command::Disconnect),
        Just(Command::Message),
        Just(Command::Receipt),
        Just(Command::Error),
        Just(Command::Ack),
    ]
}

/// Header pairs with arbitrary values, including characters that need escaping
fn arbitrary_headers() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z][a-z0-9-]{0,12}", "[ -~\n\r:\\\\]{0,24}"), 0..6).prop_filter(
        "content-length is generated by the encoder",
        |headers| headers.iter().all(|(name, _)| name != "content-length"),
    )
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (escaped_command(), arbitrary_headers(), any::<String>()).prop_map(
        |(command, headers, body)| Frame { command, headers, body },
    )
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(frame in arbitrary_frame())| {
        let wire = frame.encode();
        let decoded = match Frame::decode(&wire) {
            Ok(Inbound::Frame(decoded)) => decoded,
            other => return Err(TestCaseError::fail(format!("unexpected decode: {other:?}"))),
        };

        // PROPERTY: command and body survive, headers keep their order
        prop_assert_eq!(decoded.command, frame.command);
        prop_assert_eq!(&decoded.body, &frame.body);
        prop_assert_eq!(&decoded.headers[..frame.headers.len()], &frame.headers[..]);
    });
}

#[test]
fn prop_decode_never_panics() {
    proptest!(|(text in any::<String>())| {
        let _ = Frame::decode(&text);
    });
}

#[test]
fn prop_decode_never_panics_on_frame_like_text() {
    proptest!(|(
        command in "(MESSAGE|CONNECTED|ERROR|RECEIPT)",
        headers in prop::collection::vec("[a-z-]{0,8}:?[0-9a-z\\\\]{0,8}", 0..4),
        body in "[a-z\0]{0,16}",
    )| {
        let text = format!("{command}\n{}\n\n{body}", headers.join("\n"));
        let _ = Frame::decode(&text);
    });
}

#[test]
fn prop_heart_beats_are_only_eols() {
    proptest!(|(eols in "[\r\n]{1,8}")| {
        let decoded = Frame::decode(&eols);
        prop_assert_eq!(decoded, Ok(Inbound::HeartBeat));
    });
}

#[test]
fn prop_numeric_ids_normalize() {
    proptest!(|(n in any::<u64>())| {
        let from_number: UserId =
            serde_json::from_str(&n.to_string()).unwrap_or_else(|_| UserId::new(""));
        let from_string: UserId =
            serde_json::from_str(&format!("\"{n}\"")).unwrap_or_else(|_| UserId::new(""));

        // PROPERTY: encoding of the id does not affect identity
        prop_assert_eq!(&from_number, &from_string);
        prop_assert_eq!(from_number, UserId::from(n));
    });
}

#[test]
fn prop_string_ids_ignore_padding() {
    proptest!(|(id in "[a-z0-9]{1,10}", left in " {0,3}", right in " {0,3}")| {
        prop_assert_eq!(RoomId::new(format!("{left}{id}{right}")), RoomId::new(&id));
    });
}
