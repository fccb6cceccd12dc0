//! Property-based tests for the chat session state machine.
//!
//! Arbitrary interleavings of user input, transport events, frames, REST
//! completions, and time are played through a [`Scenario`], which checks the
//! standard invariants after every event.

use std::time::Duration;

use clubchat_client::SessionAction;
use clubchat_harness::{FakeBackend, InvariantRegistry, Scenario, chat, enter, member};
use proptest::prelude::*;

const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJrYWthb183In0.c2ln";

#[derive(Debug, Clone)]
enum Op {
    Open(u8),
    Close,
    Accept,
    Handshake,
    Drop,
    Deliver { id: u8, room: u8 },
    Enter { id: u8 },
    Send(String),
    Advance(u64),
    Complete,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (0u8..3).prop_map(Op::Open),
        1 => Just(Op::Close),
        2 => Just(Op::Accept),
        2 => Just(Op::Handshake),
        1 => Just(Op::Drop),
        4 => (0u8..20, 0u8..3).prop_map(|(id, room)| Op::Deliver { id, room }),
        1 => (20u8..30).prop_map(|id| Op::Enter { id }),
        1 => "[ a-z]{0,8}".prop_map(Op::Send),
        2 => (0u64..12_000).prop_map(Op::Advance),
        4 => Just(Op::Complete),
    ]
}

fn backend(already_member: bool) -> FakeBackend {
    let backend = FakeBackend::for_user("7")
        .with_history(vec![chat("h1", "r0", "2", "hello"), chat("h2", "r1", "3", "hi")]);
    if already_member {
        backend.with_members(vec![member("7", Some("2024-05-01T08:00:00"))])
    } else {
        backend
    }
}

fn apply(scenario: &mut Scenario, op: &Op) -> Vec<SessionAction> {
    match op {
        Op::Open(room) => scenario.open("1", &format!("r{room}")),
        Op::Close => scenario.close(),
        Op::Accept => scenario.accept_transport(),
        Op::Handshake => scenario.handshake(),
        Op::Drop => scenario.drop_transport("reset by peer"),
        Op::Deliver { id, room } => {
            scenario.deliver(&chat(&format!("m{id}"), &format!("r{room}"), "2", "text"))
        },
        Op::Enter { id } => scenario.deliver(&enter(&format!("e{id}"), "r0", "9")),
        Op::Send(text) => scenario.send(text),
        Op::Advance(ms) => scenario.advance(Duration::from_millis(*ms)),
        Op::Complete => {
            scenario.complete_next();
            Vec::new()
        },
    }
}

proptest! {
    /// Session invariants hold under arbitrary event sequences.
    #[test]
    fn prop_session_invariants_hold(
        already_member in any::<bool>(),
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let mut scenario = Scenario::new(Some(TOKEN), backend(already_member));
        let invariants = InvariantRegistry::standard();

        for op in &ops {
            apply(&mut scenario, op);
            prop_assert!(
                invariants.check_all(&scenario.snapshot()).is_ok(),
                "Invariant violated after {:?}", op
            );
        }
    }

    /// Once the view is closed nothing reaches the network and the log stays
    /// as it was, whatever is still in flight.
    #[test]
    fn prop_closed_session_is_inert(
        before in prop::collection::vec(op_strategy(), 0..40),
        after in prop::collection::vec(
            prop_oneof![
                Just(Op::Complete),
                (0u64..12_000).prop_map(Op::Advance),
                (0u8..20, 0u8..3).prop_map(|(id, room)| Op::Deliver { id, room }),
                "[a-z]{1,8}".prop_map(Op::Send),
            ],
            0..30,
        ),
    ) {
        let mut scenario = Scenario::new(Some(TOKEN), backend(false));
        for op in &before {
            apply(&mut scenario, op);
        }
        scenario.close();
        let log = scenario.log_ids();

        for op in &after {
            let actions = apply(&mut scenario, op);
            let network = actions.iter().any(|action| {
                matches!(
                    action,
                    SessionAction::OpenTransport { .. }
                        | SessionAction::SendFrame(_)
                        | SessionAction::SendHeartBeat
                        | SessionAction::Api { .. }
                )
            });
            prop_assert!(!network, "closed session acted on {:?}: {:?}", op, actions);
        }
        prop_assert_eq!(scenario.log_ids(), log);
        prop_assert!(scenario.live().is_none());
    }
}
