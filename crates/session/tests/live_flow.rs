//! End-to-end session flows over the in-process store
//!
//! Each test runs real host and listener sessions against one shared
//! `MemoryStore`, so delivery is genuinely asynchronous. Assertions on
//! reactive state poll with a bounded timeout.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;

use babelcast_core::{Error, HandState};
use babelcast_session::{
    Identity, LiveSession, SessionConfig, SessionStatus, UtteranceCallback,
};
use babelcast_store::{ChangeFeed, MemoryStore};

/// Collects delivered utterances for assertions
#[derive(Clone, Default)]
struct Received {
    items: Arc<Mutex<Vec<(String, String)>>>,
}

impl Received {
    fn callback(&self) -> UtteranceCallback {
        let items = self.items.clone();
        Arc::new(move |text, lang| {
            items
                .lock()
                .unwrap()
                .push((text.to_string(), lang.to_string()));
        })
    }

    fn texts(&self) -> Vec<String> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("babelcast_session=debug,babelcast_store=debug")
        .with_test_writer()
        .try_init();
}

fn session(
    store: &Arc<MemoryStore>,
    identity: Identity,
    config: SessionConfig,
    received: &Received,
) -> LiveSession {
    let feed: Arc<dyn ChangeFeed> = store.clone();
    LiveSession::new(feed, config, Some(identity), received.callback())
}

fn echo_config() -> SessionConfig {
    SessionConfig {
        echo_own_messages: true,
        ..SessionConfig::default()
    }
}

/// Poll `check` until it holds or two seconds pass
async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Let in-flight deliveries settle before asserting something did NOT happen
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_create_join_broadcast_flow() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host_rx = Received::default();
    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        echo_config(),
        &host_rx,
    );
    let code = host.create_room().await.unwrap();
    assert_eq!(host.snapshot().room_status, SessionStatus::Hosting);
    assert!(!host.snapshot().mic_restricted);

    let listener_rx = Received::default();
    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &listener_rx,
    );
    listener.join_room(code.as_str()).await.unwrap();
    assert_eq!(listener.snapshot().room_status, SessionStatus::Joined);

    // Mic unrestricted by default, so the listener may publish
    listener.broadcast("hi", "en").await.unwrap();
    assert!(eventually(|| host_rx.texts() == vec!["hi"]).await);
    assert!(eventually(|| listener_rx.texts() == vec!["hi"]).await);
}

#[tokio::test]
async fn test_watermark_suppresses_pre_join_history() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host_rx = Received::default();
    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &host_rx,
    );
    let code = host.create_room().await.unwrap();
    host.broadcast("early", "en").await.unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;

    let listener_rx = Received::default();
    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &listener_rx,
    );
    listener.join_room(code.as_str()).await.unwrap();
    host.broadcast("late", "en").await.unwrap();

    // The store replays "early" as a synthetic Added on attach; the
    // watermark must drop it
    assert!(eventually(|| listener_rx.texts() == vec!["late"]).await);
    settle().await;
    assert_eq!(listener_rx.texts(), vec!["late"]);
}

#[tokio::test]
async fn test_moderation_gates_and_hand_raise_approval() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host_rx = Received::default();
    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        echo_config(),
        &host_rx,
    );
    let code = host.create_room().await.unwrap();

    let listener_id = Uuid::new_v4();
    let listener_rx = Received::default();
    let listener = session(
        &store,
        Identity::new(listener_id, "student"),
        SessionConfig::default(),
        &listener_rx,
    );
    listener.join_room(code.as_str()).await.unwrap();

    host.set_mic_restriction(true).await.unwrap();
    assert!(eventually(|| listener.snapshot().mic_restricted).await);
    assert!(eventually(|| host.snapshot().mic_restricted).await);

    // Idle hand + restricted mic: the publish is silently dropped
    listener.broadcast("blocked", "en").await.unwrap();
    settle().await;
    assert_eq!(host_rx.count(), 0);

    listener.raise_hand().await.unwrap();
    assert!(eventually(|| listener.snapshot().hand_status == HandState::Pending).await);
    assert!(eventually(|| host.snapshot().pending_hand_raises.len() == 1).await);
    let queued = host.snapshot().pending_hand_raises.entries()[0].clone();
    assert_eq!(queued.listener_id, listener_id);
    assert_eq!(queued.display_name, "student");

    host.approve_hand_raise(listener_id).await.unwrap();
    assert!(eventually(|| listener.snapshot().hand_status == HandState::Approved).await);
    assert!(eventually(|| host.snapshot().pending_hand_raises.is_empty()).await);

    listener.broadcast("allowed", "en").await.unwrap();
    assert!(eventually(|| host_rx.texts() == vec!["allowed"]).await);
}

#[tokio::test]
async fn test_denied_listener_can_raise_again() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();

    let listener_id = Uuid::new_v4();
    let listener = session(
        &store,
        Identity::new(listener_id, "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    listener.join_room(code.as_str()).await.unwrap();

    listener.raise_hand().await.unwrap();
    assert!(eventually(|| host.snapshot().pending_hand_raises.len() == 1).await);

    host.deny_hand_raise(listener_id).await.unwrap();
    assert!(eventually(|| listener.snapshot().hand_status == HandState::Denied).await);
    assert!(eventually(|| host.snapshot().pending_hand_raises.is_empty()).await);

    // A denied listener is free to ask again
    listener.raise_hand().await.unwrap();
    assert!(eventually(|| listener.snapshot().hand_status == HandState::Pending).await);
    assert!(eventually(|| host.snapshot().pending_hand_raises.len() == 1).await);

    listener.lower_hand().await.unwrap();
    assert!(eventually(|| listener.snapshot().hand_status == HandState::Idle).await);
    assert!(eventually(|| host.snapshot().pending_hand_raises.is_empty()).await);
}

#[tokio::test]
async fn test_approve_races_lower_hand() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();

    let listener_id = Uuid::new_v4();
    let listener = session(
        &store,
        Identity::new(listener_id, "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    listener.join_room(code.as_str()).await.unwrap();

    listener.raise_hand().await.unwrap();
    assert!(eventually(|| host.snapshot().pending_hand_raises.len() == 1).await);

    // The listener withdraws just before the host approves; the approval
    // finds no record and must be a quiet no-op
    listener.lower_hand().await.unwrap();
    assert!(eventually(|| host.snapshot().pending_hand_raises.is_empty()).await);
    host.approve_hand_raise(listener_id).await.unwrap();

    settle().await;
    assert_eq!(listener.snapshot().hand_status, HandState::Idle);
}

#[tokio::test]
async fn test_join_rejects_missing_and_closed_rooms() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    let err = listener.join_room("000000").await.unwrap_err();
    assert!(matches!(err, Error::RoomNotFound(_)));
    assert!(listener.snapshot().is_idle());

    // A closed room is as unjoinable as a missing one
    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();
    host.leave_room().await.unwrap();

    let err = listener.join_room(code.as_str()).await.unwrap_err();
    assert!(matches!(err, Error::RoomNotFound(_)));
    assert!(listener.snapshot().is_idle());
}

#[tokio::test]
async fn test_host_close_tears_down_listener() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();

    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    listener.join_room(code.as_str()).await.unwrap();

    host.leave_room().await.unwrap();
    assert!(host.snapshot().is_idle());
    // The tombstone reaches the listener's room subscription
    assert!(eventually(|| listener.snapshot().is_idle()).await);
}

#[tokio::test]
async fn test_leave_room_is_idempotent() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();

    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    listener.join_room(code.as_str()).await.unwrap();

    listener.leave_room().await.unwrap();
    assert!(listener.snapshot().is_idle());
    listener.leave_room().await.unwrap();
    assert!(listener.snapshot().is_idle());

    // A listener leaving never closes the room
    let still_there = store
        .get_document(&babelcast_core::paths::room_doc(&code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_there["status"].as_str(), Some("active"));
}

#[tokio::test]
async fn test_broadcast_racing_room_close_is_not_an_error() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let code = host.create_room().await.unwrap();

    let listener = session(
        &store,
        Identity::new(Uuid::new_v4(), "student"),
        SessionConfig::default(),
        &Received::default(),
    );
    listener.join_room(code.as_str()).await.unwrap();

    host.leave_room().await.unwrap();
    // Whether the message lands after the close or the session already
    // tore itself down, the call must not fail
    listener.broadcast("parting words", "en").await.unwrap();
}

#[tokio::test]
async fn test_new_room_replaces_previous_session() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let host = session(
        &store,
        Identity::new(Uuid::new_v4(), "teacher"),
        SessionConfig::default(),
        &Received::default(),
    );
    let first = host.create_room().await.unwrap();
    let second = host.create_room().await.unwrap();

    assert_ne!(first, second);
    let snapshot = host.snapshot();
    assert_eq!(snapshot.room_id, Some(second));
    assert_eq!(snapshot.room_status, SessionStatus::Hosting);
}
