//! Session state snapshot and reducer
//!
//! The snapshot is an immutable value: every store event produces the
//! next snapshot through the pure `reduce` function, and observers watch
//! whole snapshots rather than individual mutable fields.

use babelcast_core::{HandState, PendingQueue, Role, RoomCode};

use crate::events::SessionEvent;

/// Where the session currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Hosting,
    Joined,
}

/// Client-side view of the live session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub room_id: Option<RoomCode>,
    pub role: Option<Role>,
    pub room_status: SessionStatus,
    /// Mirrored room-wide mute policy (listener view)
    pub mic_restricted: bool,
    /// Own hand-raise state (listener view)
    pub hand_status: HandState,
    /// Pending requests, oldest first (host view)
    pub pending_hand_raises: PendingQueue,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            room_id: None,
            role: None,
            room_status: SessionStatus::Idle,
            mic_restricted: false,
            hand_status: HandState::Idle,
            pending_hand_raises: PendingQueue::new(),
        }
    }

    pub(crate) fn hosting(room_id: RoomCode) -> Self {
        Self {
            room_id: Some(room_id),
            role: Some(Role::Host),
            room_status: SessionStatus::Hosting,
            ..Self::idle()
        }
    }

    pub(crate) fn joined(room_id: RoomCode, mic_restricted: bool) -> Self {
        Self {
            room_id: Some(room_id),
            role: Some(Role::Listener),
            room_status: SessionStatus::Joined,
            mic_restricted,
            ..Self::idle()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.room_status == SessionStatus::Idle
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Fold one event into the snapshot, returning the next snapshot
pub fn reduce(snapshot: &SessionSnapshot, event: &SessionEvent) -> SessionSnapshot {
    let mut next = snapshot.clone();
    match event {
        SessionEvent::MicRestriction(restricted) => {
            next.mic_restricted = *restricted;
        }
        SessionEvent::RoomClosed => {
            next = SessionSnapshot::idle();
        }
        SessionEvent::HandChanged(hand) => {
            next.hand_status = *hand;
        }
        SessionEvent::QueueChanged(change) => {
            next.pending_hand_raises.apply(change.clone());
        }
    }
    next
}
