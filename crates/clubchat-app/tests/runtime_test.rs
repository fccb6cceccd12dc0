//! Runtime tests against the simulation driver.
//!
//! The same [`Runtime`] the CLI runs is driven here by [`SimDriver`]: typed
//! lines go in, transports and REST calls complete from the scripted backend,
//! and the published snapshots and notices are checked.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use clubchat_app::{AppEvent, Notice, Runtime};
use clubchat_client::{ApiError, ApiRequest, ConnectionStatus, SessionConfig, StreamState};
use clubchat_harness::{FakeBackend, SimDriver, SimEnv, chat, member};
use clubchat_proto::{ClubId, Command};

const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJrYWthb183In0.c2ln";

/// Upper bound on cycles run by [`drain`].
const MAX_CYCLES: usize = 256;

fn backend() -> FakeBackend {
    FakeBackend::for_user("7")
        .with_members(vec![member("7", Some("2024-05-01T08:00:00"))])
        .with_history(vec![chat("h1", "r1", "2", "earlier")])
        .with_directory(&[("r1", "general"), ("r2", "runs")], "ADMIN")
}

fn runtime(driver: &SimDriver) -> Runtime<SimDriver, SimEnv> {
    Runtime::new(driver.clone(), driver.env().clone(), SessionConfig::default(), Some(TOKEN))
}

/// Run cycles until the driver has nothing queued.
async fn drain(runtime: &mut Runtime<SimDriver, SimEnv>) -> bool {
    for _ in 0..MAX_CYCLES {
        if !runtime.driver().has_pending() {
            return false;
        }
        if runtime.process_cycle().await.unwrap() {
            return true;
        }
    }
    false
}

#[tokio::test]
async fn open_line_enters_room_and_publishes_snapshot() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);
    let mut snapshots = runtime.subscribe();

    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;

    let snapshot = snapshots.borrow_and_update().clone();
    assert_eq!(snapshot.status, ConnectionStatus::Connected);
    assert_eq!(snapshot.stream, StreamState::Subscribed);
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(driver.frames_with(Command::Subscribe).len(), 1);
}

#[tokio::test]
async fn plain_lines_are_sent_and_compose_is_cleared() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);
    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;

    driver.inject_line("hello club");
    driver.inject_line("//not a command");
    drain(&mut runtime).await;

    let sent = driver.frames_with(Command::Send);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.contains("/not a command"));
    let cleared = driver.notices().iter().filter(|n| **n == Notice::ClearCompose).count();
    assert_eq!(cleared, 2);
}

#[tokio::test]
async fn live_messages_reach_subscribers() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);
    let mut snapshots = runtime.subscribe();
    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;
    snapshots.mark_unchanged();

    driver.inject_message(&chat("m1", "r1", "7", "mine")).unwrap();
    drain(&mut runtime).await;

    assert!(snapshots.has_changed().unwrap());
    let snapshot = snapshots.borrow_and_update().clone();
    let ids: Vec<_> = snapshot.entries.iter().map(|e| e.message.message_id.to_string()).collect();
    assert_eq!(ids, ["h1", "m1"]);
}

#[tokio::test]
async fn rooms_defaults_to_open_club() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);

    driver.inject_line("/rooms");
    drain(&mut runtime).await;
    assert!(matches!(driver.notices().last(), Some(Notice::Usage(_))));

    driver.inject_line("/open 4 r1");
    driver.inject_line("/rooms");
    drain(&mut runtime).await;

    let listed = driver.submitted().into_iter().find_map(|(_, request)| match request {
        ApiRequest::ListRooms { club } => Some(club),
        _ => None,
    });
    assert_eq!(listed, Some(ClubId::new("4")));
    let directory = runtime.session().directory().unwrap();
    assert_eq!(directory.chat_rooms.len(), 2);
    assert!(directory.can_create_rooms());
}

#[tokio::test]
async fn create_refreshes_directory() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend());
    let mut runtime = runtime(&driver);

    driver.inject_line("/create 4 weekend runs");
    drain(&mut runtime).await;

    assert!(driver.notices().contains(&Notice::RoomCreated("weekend runs".to_string())));
    let directory = runtime.session().directory().unwrap();
    assert!(directory.chat_rooms.iter().any(|room| room.name == "weekend runs"));
}

#[tokio::test]
async fn rejected_token_notifies_host() {
    let mut backend = backend();
    backend.user_id = Err(ApiError::Unauthorized);
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend).with_auto_connect();
    let mut runtime = runtime(&driver);

    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;

    assert!(driver.notices().contains(&Notice::Unauthorized));
}

#[tokio::test]
async fn heart_beats_follow_virtual_time() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);
    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;

    driver.env().advance(Duration::from_secs(10));
    runtime.process_cycle().await.unwrap();
    assert_eq!(driver.heart_beats(), 1);
}

#[tokio::test]
async fn lost_transport_reconnects() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let mut runtime = runtime(&driver);
    driver.inject_line("/open 1 r1");
    drain(&mut runtime).await;

    driver.inject_transport_loss("network down");
    drain(&mut runtime).await;
    assert_eq!(runtime.session().status(), ConnectionStatus::Reconnecting);

    driver.env().advance(Duration::from_secs(3));
    runtime.process_cycle().await.unwrap();
    drain(&mut runtime).await;

    assert_eq!(driver.opened().len(), 2);
    assert_eq!(runtime.session().status(), ConnectionStatus::Connected);
    assert_eq!(runtime.session().stream_state(), StreamState::Subscribed);
}

#[tokio::test]
async fn quit_closes_room_and_stops_driver() {
    let driver = SimDriver::new(SimEnv::new()).with_backend(backend()).with_auto_connect();
    let runtime = runtime(&driver);

    // Quit arrives before the transport has opened.
    driver.inject_line("/open 1 r1");
    driver.inject_line("/quit");
    runtime.run().await.unwrap();

    assert!(driver.is_stopped());
    assert_eq!(driver.closed().len(), 1);
}

#[tokio::test]
async fn quit_event_ends_run() {
    let driver = SimDriver::new(SimEnv::new());
    let runtime = runtime(&driver);

    driver.inject_event(AppEvent::Quit);
    runtime.run().await.unwrap();

    assert!(driver.is_stopped());
    assert!(driver.closed().is_empty());
}
