//! End-to-end tests for the room entry sequence and live stream.
//!
//! # Test Strategy
//!
//! Each test plays one view lifetime against a scripted backend:
//! 1. Open a room (identity, members, join)
//! 2. Complete the transport and handshake
//! 3. Answer REST calls, in order or deliberately out of order
//! 4. Push frames and assert on the log, members, and issued requests
//!
//! The scenario checks the standard invariants after every event, so each
//! test also asserts that the log never holds duplicates and nothing is
//! subscribed without a membership and a connection.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use clubchat_client::{
    ApiError, ApiRequest, ApiResponse, ConnectionStatus, MembersPurpose, RoomEpoch,
    SessionAction, SessionEvent, StreamState,
};
use clubchat_harness::{FakeBackend, Scenario, chat, enter, leave, member};
use clubchat_proto::{Command, RoomId, UserId};

/// Token whose subject is `kakao_7`.
const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJrYWthb183In0.c2ln";

fn is_join(request: &ApiRequest) -> bool {
    matches!(request, ApiRequest::Join { .. })
}

fn is_history(request: &ApiRequest) -> bool {
    matches!(request, ApiRequest::FetchHistory { .. })
}

fn is_refresh(request: &ApiRequest) -> bool {
    matches!(request, ApiRequest::FetchMembers { purpose: MembersPurpose::Refresh, .. })
}

/// Backend where user 7 already joined `r1` at 08:00.
fn member_backend() -> FakeBackend {
    FakeBackend::for_user("7")
        .with_members(vec![member("7", Some("2024-05-01T08:00:00")), member("2", None)])
}

/// Open `r1`, connect, and answer every REST call.
fn entered(backend: FakeBackend) -> Scenario {
    let mut scenario = Scenario::new(Some(TOKEN), backend);
    scenario.open("1", "r1");
    scenario.connect();
    scenario.complete_all();
    scenario
}

/// Answer everything except the history backfill.
fn complete_until_backfill(scenario: &mut Scenario) {
    while scenario.complete_where(|request| !is_history(request)) {}
}

#[test]
fn existing_member_subscribes_without_joining() {
    let scenario = entered(member_backend());

    assert_eq!(scenario.count_requests(is_join), 0);
    assert_eq!(scenario.opened().len(), 1);
    assert_eq!(scenario.session().self_id(), Some(&UserId::new("7")));
    assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);
    assert_eq!(scenario.frames_with(Command::Subscribe).len(), 1);

    let snapshot = scenario.snapshot();
    assert!(snapshot.joined);
    assert!(snapshot.can_send());
    assert_eq!(snapshot.member_count(), 2);
}

#[test]
fn newcomer_joins_once_then_subscribes() {
    let backend = FakeBackend::for_user("7").with_members(vec![member("2", None)]);
    let mut scenario = entered(backend);

    assert_eq!(scenario.count_requests(is_join), 1);
    assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);
    // Join recorded by the server; the post-join fetch sees it.
    assert!(scenario.session().members().iter().any(|m| m.user_id == UserId::new("7")));

    // A later refresh does not trigger another join.
    scenario.handle(SessionEvent::RefreshMembers);
    scenario.complete_all();
    assert_eq!(scenario.count_requests(is_join), 1);
}

#[test]
fn history_starts_at_join_time() {
    let scenario = entered(member_backend());

    let from = scenario.requests().iter().find_map(|(_, request)| match request {
        ApiRequest::FetchHistory { from, .. } => Some(from.clone()),
        _ => None,
    });
    let from = from.unwrap().unwrap();
    assert_eq!(from.as_str(), "2024-05-01T08:00:00");
}

#[test]
fn missing_join_time_fetches_full_history() {
    let backend = FakeBackend::for_user("7").with_members(vec![member("7", None)]);
    let scenario = entered(backend);

    let unbounded = scenario.count_requests(|request| {
        matches!(request, ApiRequest::FetchHistory { from: None, .. })
    });
    assert_eq!(unbounded, 1);
    assert_eq!(scenario.count_requests(is_history), 1);
}

#[test]
fn duplicate_frames_are_appended_once() {
    let mut scenario = entered(member_backend());

    let first = scenario.deliver(&chat("m1", "r1", "2", "hello"));
    assert!(first.contains(&SessionAction::LogUpdated));

    let second = scenario.deliver(&chat("m1", "r1", "2", "hello"));
    assert!(!second.contains(&SessionAction::LogUpdated));
    assert_eq!(scenario.log_ids(), ["m1"]);
}

#[test]
fn frames_for_another_room_are_dropped() {
    let mut scenario = entered(member_backend());
    scenario.deliver(&chat("x1", "r9", "2", "wrong room"));
    scenario.deliver_raw("{not json");
    assert!(scenario.log_ids().is_empty());
}

#[test]
fn membership_change_refetches_once_after_delay() {
    let mut scenario = entered(member_backend());

    scenario.deliver(&enter("m2", "r1", "3"));
    scenario.advance(Duration::from_millis(499));
    assert_eq!(scenario.count_requests(is_refresh), 0);

    scenario.advance(Duration::from_millis(1));
    assert_eq!(scenario.count_requests(is_refresh), 1);

    scenario.advance(Duration::from_secs(1));
    assert_eq!(scenario.count_requests(is_refresh), 1);
}

#[test]
fn each_membership_change_schedules_its_own_refetch() {
    let mut scenario = entered(member_backend());

    scenario.deliver(&enter("m2", "r1", "3"));
    scenario.deliver(&leave("m3", "r1", "3"));
    // A duplicate announcement does not schedule again.
    scenario.deliver(&leave("m3", "r1", "3"));
    scenario.advance(Duration::from_millis(500));

    assert_eq!(scenario.count_requests(is_refresh), 2);
    assert_eq!(scenario.log_ids(), ["m2", "m3"]);
}

#[test]
fn empty_text_sends_nothing() {
    let mut scenario = entered(member_backend());

    assert!(scenario.send("").is_empty());
    assert!(scenario.frames_with(Command::Send).is_empty());

    let actions = scenario.send("hi there");
    assert!(actions.contains(&SessionAction::ClearCompose));

    let sent = scenario.frames_with(Command::Send);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].header("destination"), Some("/app/message"));
    let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
    assert_eq!(body["roomId"], "r1");
    assert_eq!(body["message"], "hi there");
    assert_eq!(body["type"], "TALK");
}

#[test]
fn whitespace_only_text_is_sent_verbatim() {
    let mut scenario = entered(member_backend());

    let actions = scenario.send("   \n");
    assert!(actions.contains(&SessionAction::ClearCompose));

    let sent = scenario.frames_with(Command::Send);
    assert_eq!(sent.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
    assert_eq!(body["message"], "   \n");
}

#[test]
fn send_requires_connection() {
    let mut scenario = Scenario::new(Some(TOKEN), member_backend());
    scenario.open("1", "r1");
    scenario.complete_all();

    assert!(scenario.send("hi").is_empty());
    assert!(scenario.frames_with(Command::Send).is_empty());
    assert!(!scenario.snapshot().can_send());
}

#[test]
fn live_frames_wait_for_backfill() {
    let backend = member_backend()
        .with_history(vec![chat("h1", "r1", "2", "old"), chat("h2", "r1", "2", "also old")]);
    let mut scenario = Scenario::new(Some(TOKEN), backend);
    scenario.open("1", "r1");
    scenario.connect();
    complete_until_backfill(&mut scenario);
    assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);

    // h2 arrives live and is also part of the backfill.
    let live = scenario.deliver(&chat("h2", "r1", "2", "also old"));
    assert!(!live.contains(&SessionAction::LogUpdated));
    scenario.deliver(&chat("l1", "r1", "2", "new"));
    assert!(scenario.log_ids().is_empty());
    assert!(scenario.snapshot().backfill_pending);

    scenario.complete_all();
    assert_eq!(scenario.log_ids(), ["h1", "h2", "l1"]);
    assert!(!scenario.snapshot().backfill_pending);
}

#[test]
fn failed_backfill_flushes_live_frames() {
    let mut backend = member_backend();
    backend.history_error = Some(ApiError::Server { status: 500 });
    let mut scenario = Scenario::new(Some(TOKEN), backend);
    scenario.open("1", "r1");
    scenario.connect();
    complete_until_backfill(&mut scenario);

    scenario.deliver(&chat("l1", "r1", "2", "live"));
    scenario.complete_all();

    assert_eq!(scenario.log_ids(), ["l1"]);
    assert!(scenario.actions().iter().any(|action| matches!(action, SessionAction::Alert { .. })));

    // Later frames go straight to the log.
    scenario.deliver(&chat("l2", "r1", "2", "live"));
    assert_eq!(scenario.log_ids(), ["l1", "l2"]);
}

#[test]
fn rejected_token_reports_unauthorized() {
    let mut backend = member_backend();
    backend.user_id = Err(ApiError::Unauthorized);
    let scenario = entered(backend);

    assert!(scenario.actions().contains(&SessionAction::Unauthorized));
    assert_eq!(scenario.session().self_id(), None);
    // Without a self id the member check cannot match; the join is attempted.
    assert_eq!(scenario.count_requests(is_join), 1);
}

#[test]
fn conflict_on_join_counts_as_member() {
    let mut backend = FakeBackend::for_user("7").with_members(vec![member("2", None)]);
    backend.join_result = Err(ApiError::Status { status: 409 });
    let scenario = entered(backend);

    assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);
    assert!(!scenario.actions().iter().any(|action| matches!(action, SessionAction::Alert { .. })));
}

#[test]
fn failed_join_leaves_room_read_only() {
    let mut backend = FakeBackend::for_user("7").with_members(vec![member("2", None)]);
    backend.join_result = Err(ApiError::Forbidden);
    let scenario = entered(backend);

    assert_eq!(scenario.session().stream_state(), StreamState::Idle);
    assert!(scenario.frames_with(Command::Subscribe).is_empty());
    // History is still shown.
    assert_eq!(scenario.count_requests(is_history), 1);
}

#[test]
fn stale_responses_are_discarded() {
    let mut scenario = Scenario::new(Some(TOKEN), member_backend());
    scenario.open("1", "r1");
    let (stale, _) = scenario
        .take_where(|request| matches!(request, ApiRequest::FetchMembers { .. }))
        .unwrap();

    scenario.open("1", "r2");
    assert_ne!(scenario.session().epoch(), stale);

    let response = ApiResponse::Members {
        purpose: MembersPurpose::Entry,
        result: Ok(vec![member("7", None)]),
    };
    assert!(scenario.complete_with(stale, response).is_empty());
    assert!(scenario.session().members().is_empty());

    let stale_history = ApiResponse::History(Ok(vec![chat("x", "r1", "2", "late")]));
    assert!(scenario.complete_with(stale, stale_history).is_empty());
    assert!(scenario.log_ids().is_empty());
}

#[test]
fn switching_rooms_cancels_pending_reconnect() {
    let mut scenario = entered(member_backend());
    scenario.drop_transport("connection reset");
    assert_eq!(scenario.session().status(), ConnectionStatus::Reconnecting);

    scenario.open("1", "r2");
    scenario.connect();
    scenario.complete_all();
    scenario.advance(Duration::from_secs(10));

    let r1 = RoomId::new("r1");
    let reopened = scenario.opened().iter().filter(|(_, room)| room == &r1).count();
    assert_eq!(reopened, 1, "no transport reopened for the room left behind");
    assert_eq!(scenario.session().target().unwrap().room, RoomId::new("r2"));
    assert_eq!(scenario.session().stream_state(), StreamState::Subscribed);
}

#[test]
fn reconnect_resyncs_history() {
    let backend = member_backend().with_history(vec![chat("h1", "r1", "2", "old")]);
    let mut scenario = entered(backend);
    assert_eq!(scenario.log_ids(), ["h1"]);

    scenario.drop_transport("network down");
    assert_eq!(scenario.session().stream_state(), StreamState::Idle);
    // Pushed while the socket was down; only history has it.
    scenario.backend_mut().history.push(chat("h2", "r1", "3", "missed"));

    scenario.advance(Duration::from_secs(3));
    assert_eq!(scenario.opened().len(), 2);
    scenario.connect();
    scenario.complete_all();

    assert_eq!(scenario.count_requests(is_history), 2);
    assert_eq!(scenario.log_ids(), ["h1", "h2"]);
    assert_eq!(scenario.frames_with(Command::Subscribe).len(), 2);
    assert_eq!(scenario.count_requests(is_join), 0);
}

#[test]
fn close_stops_appends_and_keeps_log() {
    let mut scenario = entered(member_backend());
    scenario.deliver(&chat("m1", "r1", "2", "hi"));
    let attempt = scenario.live().unwrap();

    scenario.close();
    assert_eq!(scenario.frames_with(Command::Unsubscribe).len(), 1);
    assert_eq!(scenario.frames_with(Command::Disconnect).len(), 1);
    assert_eq!(scenario.closed(), [attempt]);
    assert_eq!(scenario.session().stream_state(), StreamState::Unsubscribed);

    let frame = clubchat_harness::message_frame("sub-0", &chat("m2", "r1", "2", "late"));
    scenario.handle(SessionEvent::FrameReceived { attempt, frame });
    assert_eq!(scenario.log_ids(), ["m1"]);
    assert!(scenario.session().target().is_none());
}

#[test]
fn empty_target_is_rejected() {
    let mut scenario = Scenario::new(Some(TOKEN), member_backend());
    let actions = scenario.open("1", "  ");

    assert!(matches!(actions.as_slice(), [SessionAction::Alert { .. }]));
    assert!(scenario.opened().is_empty());
    assert_eq!(scenario.session().epoch(), RoomEpoch::default());
}

#[test]
fn own_messages_are_attributed_to_self() {
    let mut scenario = entered(member_backend());
    scenario.deliver(&chat("m1", "r1", "7", "mine"));
    scenario.deliver(&chat("m2", "r1", "2", "theirs"));

    let snapshot = scenario.snapshot();
    let own: Vec<_> = snapshot
        .entries
        .iter()
        .map(|entry| entry.attribution == clubchat_client::Attribution::Own)
        .collect();
    assert_eq!(own, [true, false]);
}
