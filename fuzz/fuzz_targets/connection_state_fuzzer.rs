//! Fuzz target for the chat connection state machine
//!
//! Drives a `Connection` with arbitrary interleavings of room switches,
//! teardowns, transport events (current and stale attempts), inbound frames,
//! and clock movement.
//!
//! # Invariants
//!
//! - A subscription exists only on a connected transport
//! - After teardown nothing is live and the status is `Disconnected`
//! - Attempt ids only grow
//! - Every `OpenTransport` is for the desired room

#![no_main]

use std::{ops::Sub, time::Duration};

use arbitrary::Arbitrary;
use clubchat_core::{AttemptId, Connection, ConnectionAction, ConnectionConfig, ConnectionStatus};
use clubchat_proto::{Command, Frame, Inbound, RoomId};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Millis(u64);

impl Sub for Millis {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect(u8),
    Teardown,
    Opened { stale: bool },
    Closed { stale: bool },
    Connected { heart_beat: Option<(u16, u16)> },
    Error,
    Message { known: bool },
    Receipt,
    HeartBeat,
    Subscribe,
    Send,
    Advance(u16),
}

fn room(n: u8) -> RoomId {
    RoomId::new(format!("r{}", n % 4))
}

/// Inbound errors are expected; the state machine must stay consistent anyway.
fn feed(
    connection: &mut Connection<Millis>,
    attempt: AttemptId,
    inbound: Inbound,
    now: Millis,
) -> Vec<ConnectionAction> {
    connection.handle_inbound(attempt, inbound, now).unwrap_or_default()
}

fuzz_target!(|ops: Vec<Op>| {
    let mut connection: Connection<Millis> = Connection::new(ConnectionConfig::default());
    let mut now = Millis(0);
    let mut last_attempt = 0;

    for op in ops {
        let current = connection.attempt();
        let attempt = |stale: bool| match current {
            Some(attempt) if !stale => attempt,
            Some(attempt) => AttemptId::new(attempt.get().saturating_sub(1)),
            None => AttemptId::new(u64::from(stale)),
        };

        let actions = match op {
            Op::Connect(n) => connection.connect(room(n), now),
            Op::Teardown => {
                let actions = connection.teardown();
                assert!(connection.attempt().is_none());
                assert!(connection.subscription_id().is_none());
                assert_eq!(connection.status(), ConnectionStatus::Disconnected);
                actions
            },
            Op::Opened { stale } => connection.transport_opened(attempt(stale), now),
            Op::Closed { stale } => connection.transport_closed(attempt(stale), "fuzz", now),
            Op::Connected { heart_beat } => {
                let mut frame = Frame::new(Command::Connected).with_header("version", "1.2");
                if let Some((tx, rx)) = heart_beat {
                    frame = frame.with_header("heart-beat", format!("{tx},{rx}"));
                }
                feed(&mut connection, attempt(false), Inbound::Frame(frame), now)
            },
            Op::Error => {
                let frame = Frame::new(Command::Error).with_header("message", "fuzz");
                feed(&mut connection, attempt(false), Inbound::Frame(frame), now)
            },
            Op::Message { known } => {
                let id = match connection.subscription_id() {
                    Some(id) if known => id.to_string(),
                    _ => "sub-unknown".to_string(),
                };
                let frame = Frame::new(Command::Message)
                    .with_header("subscription", id)
                    .with_body("{}");
                feed(&mut connection, attempt(false), Inbound::Frame(frame), now)
            },
            Op::Receipt => {
                let frame = Frame::new(Command::Receipt).with_header("receipt-id", "r-1");
                feed(&mut connection, attempt(false), Inbound::Frame(frame), now)
            },
            Op::HeartBeat => feed(&mut connection, attempt(false), Inbound::HeartBeat, now),
            Op::Subscribe => match connection.desired_room().cloned() {
                Some(room) => connection.subscribe(&room).unwrap_or_default(),
                None => Vec::new(),
            },
            Op::Send => {
                let frame = Frame::send_json("/app/message", "{}");
                connection.send(frame, now).unwrap_or_default()
            },
            Op::Advance(ms) => {
                now = Millis(now.0 + u64::from(ms));
                connection.tick(now)
            },
        };

        for action in &actions {
            if let ConnectionAction::OpenTransport { attempt, room } = action {
                assert!(attempt.get() > last_attempt, "attempt ids must grow");
                last_attempt = attempt.get();
                assert_eq!(Some(room), connection.desired_room(), "transport for another room");
            }
        }

        if connection.subscription_id().is_some() {
            assert!(connection.is_connected(), "subscribed without a connection");
        }
        if connection.is_connected() {
            assert_eq!(connection.status(), ConnectionStatus::Connected);
        }
    }
});
