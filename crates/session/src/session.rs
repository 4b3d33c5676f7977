//! Live session controller
//!
//! Composes room lifecycle, moderation, and the broadcast channel over an
//! injected change feed. A `LiveSession` lives as long as the client;
//! `create_room`/`join_room` tear down whatever came before them, and a
//! single cleanup path cancels every subscription exactly once.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use babelcast_core::{
    can_publish, invariants, paths, Error, HandRaise, HandRaiseChange, HandRaiseStatus, HandState,
    Result, Role, Room, RoomCode, RoomStatus, Utterance,
};
use babelcast_store::{
    retry_async, CancelHandle, ChangeFeed, ChangeKind, OrderBy, Subscription,
};

use crate::config::SessionConfig;
use crate::events::{FeedEvent, SessionEvent};
use crate::state::{reduce, SessionSnapshot};

/// Authenticated participant identity, provided by the surrounding app
#[derive(Debug, Clone)]
pub struct Identity {
    pub participant_id: Uuid,
    pub display_name: String,
}

impl Identity {
    pub fn new(participant_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            participant_id,
            display_name: display_name.into(),
        }
    }
}

/// Callback invoked once per admitted, de-duplicated utterance
pub type UtteranceCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Everything the cleanup path must tear down
#[derive(Default)]
struct Plumbing {
    cancels: Vec<CancelHandle>,
    forwarders: Vec<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
}

/// Client-side session over a room's change feeds
pub struct LiveSession {
    store: Arc<dyn ChangeFeed>,
    config: SessionConfig,
    identity: Mutex<Option<Identity>>,
    on_utterance: UtteranceCallback,
    state: Arc<watch::Sender<SessionSnapshot>>,
    plumbing: Arc<Mutex<Plumbing>>,
}

impl LiveSession {
    pub fn new(
        store: Arc<dyn ChangeFeed>,
        config: SessionConfig,
        identity: Option<Identity>,
        on_utterance: UtteranceCallback,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::idle());
        Self {
            store,
            config,
            identity: Mutex::new(identity),
            on_utterance,
            state: Arc::new(state),
            plumbing: Arc::new(Mutex::new(Plumbing::default())),
        }
    }

    /// Swap the signed-in identity (None = signed out)
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.lock().unwrap() = identity;
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Reactive view of state snapshots
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Create a room and become its host
    pub async fn create_room(&self) -> Result<RoomCode> {
        self.cleanup();
        let identity = self.identity()?;
        let code = self.allocate_code().await?;

        let room = Room::new(code.clone(), identity.participant_id);
        let path = paths::room_doc(&code);
        let fields = room.creation_fields();
        let policy = self.config.retry_policy();
        retry_async(&policy, || {
            self.store.set_document(&path, fields.clone(), false)
        })
        .await?;

        self.attach(Role::Host, code.clone(), false, &identity).await?;
        info!(room = %code, "Created room");
        Ok(code)
    }

    /// Join an existing room as a listener
    pub async fn join_room(&self, code: &str) -> Result<()> {
        self.cleanup();
        let identity = self.identity()?;
        let code = RoomCode::parse(code)?;

        let fields = self
            .store
            .get_document(&paths::room_doc(&code))
            .await?
            .ok_or_else(|| Error::RoomNotFound(code.to_string()))?;
        let room =
            Room::from_fields(&fields).map_err(|_| Error::RoomNotFound(code.to_string()))?;
        if room.status != RoomStatus::Active {
            return Err(Error::RoomNotFound(code.to_string()));
        }

        self.attach(Role::Listener, code.clone(), room.mic_restricted, &identity)
            .await?;
        info!(room = %code, "Joined room");
        Ok(())
    }

    /// Leave the current room. A host leaves a close tombstone behind;
    /// either way the session always ends up idle. No-op when idle.
    pub async fn leave_room(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let tombstone = match (snapshot.role, &snapshot.room_id) {
            (Some(Role::Host), Some(code)) => {
                let path = paths::room_doc(code);
                let policy = self.config.retry_policy();
                let result = retry_async(&policy, || {
                    self.store.set_document(&path, Room::close_fields(), true)
                })
                .await;
                if result.is_ok() {
                    info!(room = %code, "Closed room");
                }
                result
            }
            _ => Ok(()),
        };
        self.cleanup();
        tombstone.map_err(Error::from)
    }

    /// Publish an utterance, subject to admission control.
    /// A gated listener's call is a silent no-op, not an error.
    pub async fn broadcast(&self, text: &str, lang_code: &str) -> Result<()> {
        let snapshot = self.snapshot();
        let (role, code) = match (snapshot.role, snapshot.room_id.clone()) {
            (Some(role), Some(code)) => (role, code),
            _ => {
                debug!("Broadcast outside a room ignored");
                return Ok(());
            }
        };
        if !can_publish(role, snapshot.mic_restricted, snapshot.hand_status) {
            debug!(room = %code, "Broadcast suppressed by mic policy");
            return Ok(());
        }

        let identity = self.identity()?;
        let utterance = Utterance::new(text, lang_code, identity.participant_id);
        let path = paths::messages(&code).doc(&Uuid::new_v4().to_string());
        let policy = self.config.retry_policy();
        retry_async(&policy, || {
            self.store
                .set_document(&path, utterance.broadcast_fields(), false)
        })
        .await?;
        debug!(room = %code, lang = lang_code, "Broadcast utterance");
        Ok(())
    }

    /// Toggle the room-wide mute policy. Host only; ignored otherwise.
    pub async fn set_mic_restriction(&self, restricted: bool) -> Result<()> {
        let snapshot = self.snapshot();
        let code = match (snapshot.role, snapshot.room_id) {
            (Some(Role::Host), Some(code)) => code,
            _ => {
                debug!("Mic restriction change ignored for non-host");
                return Ok(());
            }
        };
        let path = paths::room_doc(&code);
        let policy = self.config.retry_policy();
        retry_async(&policy, || {
            self.store
                .set_document(&path, Room::mic_fields(restricted), true)
        })
        .await?;
        info!(room = %code, restricted, "Mic restriction updated");
        Ok(())
    }

    /// Request speaking permission. Listener only; ignored otherwise.
    /// Overwrites any prior record, so a denied listener may raise again.
    pub async fn raise_hand(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let code = match (snapshot.role, snapshot.room_id) {
            (Some(Role::Listener), Some(code)) => code,
            _ => {
                debug!("Hand raise ignored outside a joined room");
                return Ok(());
            }
        };
        let identity = self.identity()?;
        let raise = HandRaise::new(identity.participant_id, identity.display_name.clone());
        let path = paths::hand_raise_doc(&code, identity.participant_id);
        let policy = self.config.retry_policy();
        retry_async(&policy, || {
            self.store.set_document(&path, raise.raise_fields(), false)
        })
        .await?;
        info!(room = %code, "Raised hand");
        Ok(())
    }

    /// Withdraw the hand-raise record entirely, whatever its status.
    /// Listener only; ignored otherwise.
    pub async fn lower_hand(&self) -> Result<()> {
        let snapshot = self.snapshot();
        let code = match (snapshot.role, snapshot.room_id) {
            (Some(Role::Listener), Some(code)) => code,
            _ => {
                debug!("Hand lower ignored outside a joined room");
                return Ok(());
            }
        };
        let identity = self.identity()?;
        let path = paths::hand_raise_doc(&code, identity.participant_id);
        let policy = self.config.retry_policy();
        match retry_async(&policy, || self.store.delete_document(&path)).await {
            Ok(()) | Err(babelcast_store::Error::NotFound) => {
                info!(room = %code, "Lowered hand");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Grant a listener's pending request. Host only; ignored otherwise.
    pub async fn approve_hand_raise(&self, listener_id: Uuid) -> Result<()> {
        self.resolve_hand_raise(listener_id, HandRaiseStatus::Approved)
            .await
    }

    /// Reject a listener's pending request. Host only; ignored otherwise.
    pub async fn deny_hand_raise(&self, listener_id: Uuid) -> Result<()> {
        self.resolve_hand_raise(listener_id, HandRaiseStatus::Denied)
            .await
    }

    /// Cancel every outstanding subscription exactly once each and reset
    /// the snapshot to idle. Safe to call repeatedly; also runs on drop.
    pub fn cleanup(&self) {
        teardown_plumbing(&self.plumbing);
        self.state.send_replace(SessionSnapshot::idle());
    }

    fn identity(&self) -> Result<Identity> {
        self.identity
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::AuthRequired)
    }

    async fn resolve_hand_raise(&self, listener_id: Uuid, status: HandRaiseStatus) -> Result<()> {
        let snapshot = self.snapshot();
        let code = match (snapshot.role, snapshot.room_id) {
            (Some(Role::Host), Some(code)) => code,
            _ => {
                debug!("Hand-raise resolution ignored for non-host");
                return Ok(());
            }
        };
        let path = paths::hand_raise_doc(&code, listener_id);
        let policy = self.config.retry_policy();
        match retry_async(&policy, || {
            self.store
                .update_document(&path, HandRaise::status_fields(status))
        })
        .await
        {
            Ok(()) => {
                info!(room = %code, listener = %listener_id, status = status.as_str(), "Resolved hand raise");
                Ok(())
            }
            // The listener already lowered their hand; nothing to resolve
            Err(babelcast_store::Error::NotFound) => {
                debug!(room = %code, listener = %listener_id, "No hand-raise record to resolve");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Generate a room code that addresses no existing document. Closed
    /// rooms keep their tombstone, so their codes are never reused.
    async fn allocate_code(&self) -> Result<RoomCode> {
        for _ in 0..self.config.code_attempts {
            let code = RoomCode::generate(&mut rand::thread_rng());
            match self.store.get_document(&paths::room_doc(&code)).await? {
                None => return Ok(code),
                Some(_) => debug!(room = %code, "Room code collision, regenerating"),
            }
        }
        Err(Error::CodeSpaceExhausted)
    }

    /// Install subscriptions, snapshot, and the driver task for a room
    async fn attach(
        &self,
        role: Role,
        code: RoomCode,
        mic_restricted: bool,
        identity: &Identity,
    ) -> Result<()> {
        let (feed_tx, feed_rx) = mpsc::channel(self.config.channel_capacity);
        let mut plumbing = Plumbing::default();

        if let Err(e) = self
            .attach_subscriptions(&mut plumbing, &feed_tx, role, &code, identity)
            .await
        {
            for cancel in plumbing.cancels.drain(..) {
                cancel.cancel();
            }
            for task in plumbing.forwarders.drain(..) {
                task.abort();
            }
            return Err(e);
        }

        let snapshot = match role {
            Role::Host => SessionSnapshot::hosting(code.clone()),
            Role::Listener => SessionSnapshot::joined(code.clone(), mic_restricted),
        };
        self.state.send_replace(snapshot);

        // Anything stamped at or before this instant is historical replay
        let watermark = Utc::now();
        let context = DriverContext {
            state: self.state.clone(),
            plumbing: self.plumbing.clone(),
            on_utterance: self.on_utterance.clone(),
            watermark,
        };

        // Publish the subscriptions before the driver starts, so a close
        // event arriving immediately still finds them to cancel
        *self.plumbing.lock().unwrap() = plumbing;
        let driver = tokio::spawn(drive(feed_rx, context));
        self.plumbing.lock().unwrap().driver = Some(driver);
        Ok(())
    }

    async fn attach_subscriptions(
        &self,
        plumbing: &mut Plumbing,
        feed_tx: &mpsc::Sender<FeedEvent>,
        role: Role,
        code: &RoomCode,
        identity: &Identity,
    ) -> Result<()> {
        // Room document: mute policy mirror and close tombstone
        let room_sub = self.store.subscribe_document(&paths::room_doc(code)).await?;
        plumbing.cancels.push(room_sub.cancel_handle());
        plumbing
            .forwarders
            .push(spawn_forwarder(room_sub, feed_tx.clone(), FeedEvent::Room));

        match role {
            Role::Host => {
                let hands = self
                    .store
                    .subscribe_collection(&paths::hand_raises(code), OrderBy::field("timestamp"))
                    .await?;
                plumbing.cancels.push(hands.cancel_handle());
                plumbing.forwarders.push(spawn_forwarder(
                    hands,
                    feed_tx.clone(),
                    FeedEvent::HandRaises,
                ));

                if self.config.echo_own_messages {
                    let messages = self
                        .store
                        .subscribe_collection(&paths::messages(code), OrderBy::field("timestamp"))
                        .await?;
                    plumbing.cancels.push(messages.cancel_handle());
                    plumbing.forwarders.push(spawn_forwarder(
                        messages,
                        feed_tx.clone(),
                        FeedEvent::Message,
                    ));
                }
            }
            Role::Listener => {
                let own_hand = self
                    .store
                    .subscribe_document(&paths::hand_raise_doc(code, identity.participant_id))
                    .await?;
                plumbing.cancels.push(own_hand.cancel_handle());
                plumbing.forwarders.push(spawn_forwarder(
                    own_hand,
                    feed_tx.clone(),
                    FeedEvent::OwnHand,
                ));

                let messages = self
                    .store
                    .subscribe_collection(&paths::messages(code), OrderBy::field("timestamp"))
                    .await?;
                plumbing.cancels.push(messages.cancel_handle());
                plumbing.forwarders.push(spawn_forwarder(
                    messages,
                    feed_tx.clone(),
                    FeedEvent::Message,
                ));
            }
        }
        Ok(())
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Forward one subscription's events onto the session feed
fn spawn_forwarder<T, F>(
    mut sub: Subscription<T>,
    tx: mpsc::Sender<FeedEvent>,
    wrap: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> FeedEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = sub.recv().await {
            if tx.send(wrap(item)).await.is_err() {
                break;
            }
        }
    })
}

fn teardown_plumbing(plumbing: &Mutex<Plumbing>) {
    let mut guard = plumbing.lock().unwrap();
    // Draining the slots makes every cancel fire exactly once
    for cancel in guard.cancels.drain(..) {
        cancel.cancel();
    }
    for task in guard.forwarders.drain(..) {
        task.abort();
    }
    if let Some(driver) = guard.driver.take() {
        driver.abort();
    }
}

struct DriverContext {
    state: Arc<watch::Sender<SessionSnapshot>>,
    plumbing: Arc<Mutex<Plumbing>>,
    on_utterance: UtteranceCallback,
    watermark: DateTime<Utc>,
}

/// Decoded outcome of one feed event
enum Decoded {
    State(SessionEvent),
    Utterance(Utterance),
    Ignore,
}

/// Fold feed events into snapshots until the feed ends or the room closes
async fn drive(mut feed_rx: mpsc::Receiver<FeedEvent>, mut context: DriverContext) {
    while let Some(event) = feed_rx.recv().await {
        match decode(event) {
            Ok(Decoded::State(session_event)) => {
                let closing = matches!(session_event, SessionEvent::RoomClosed);
                let current = context.state.borrow().clone();
                let next = reduce(&current, &session_event);
                context.state.send_replace(next);
                if closing {
                    info!("Room closed; tearing down session");
                    teardown_plumbing(&context.plumbing);
                    break;
                }
            }
            Ok(Decoded::Utterance(utterance)) => {
                if utterance.timestamp > context.watermark {
                    invariants::assert_watermark_advance(context.watermark, utterance.timestamp);
                    context.watermark = utterance.timestamp;
                    (context.on_utterance)(&utterance.text, &utterance.lang_code);
                } else {
                    debug!(
                        timestamp = %utterance.timestamp,
                        "Suppressed replayed or duplicate message"
                    );
                }
            }
            Ok(Decoded::Ignore) => {}
            // One malformed event must not kill the stream
            Err(e) => warn!(error = %e, "Skipping malformed feed event"),
        }
    }
}

fn decode(event: FeedEvent) -> Result<Decoded> {
    match event {
        FeedEvent::Room(snapshot) => {
            let fields = match snapshot.fields {
                Some(fields) if snapshot.exists => fields,
                // A deleted room document is as terminal as a closed one
                _ => return Ok(Decoded::State(SessionEvent::RoomClosed)),
            };
            let room = Room::from_fields(&fields)?;
            match room.status {
                RoomStatus::Closed => Ok(Decoded::State(SessionEvent::RoomClosed)),
                RoomStatus::Active => Ok(Decoded::State(SessionEvent::MicRestriction(
                    room.mic_restricted,
                ))),
            }
        }
        FeedEvent::OwnHand(snapshot) => {
            let status = match snapshot.fields {
                Some(fields) if snapshot.exists => Some(HandRaise::from_fields(&fields)?.status),
                _ => None,
            };
            Ok(Decoded::State(SessionEvent::HandChanged(
                HandState::from_record(status),
            )))
        }
        FeedEvent::HandRaises(change) => {
            let change = match change.kind {
                ChangeKind::Removed => {
                    let listener_id = Uuid::parse_str(&change.doc_id).map_err(|_| {
                        Error::Document(format!("hand-raise id `{}` is not a UUID", change.doc_id))
                    })?;
                    HandRaiseChange::Removed(listener_id)
                }
                _ => HandRaiseChange::Upserted(HandRaise::from_fields(&change.fields)?),
            };
            Ok(Decoded::State(SessionEvent::QueueChanged(change)))
        }
        FeedEvent::Message(change) => match change.kind {
            ChangeKind::Added => Ok(Decoded::Utterance(Utterance::from_fields(&change.fields)?)),
            // Messages are append-only; anything else is store noise
            _ => Ok(Decoded::Ignore),
        },
    }
}
