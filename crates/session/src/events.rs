//! Session events
//!
//! Subscriptions deliver raw store events; the driver decodes them into
//! `SessionEvent`s and folds those into the snapshot. The streams are
//! independent — no ordering is assumed across them.

use babelcast_core::{HandRaiseChange, HandState};
use babelcast_store::{CollectionChange, DocumentSnapshot};

/// Raw feed event, tagged by the subscription it came from
#[derive(Debug)]
pub(crate) enum FeedEvent {
    /// Room document snapshot (moderation policy, close tombstone)
    Room(DocumentSnapshot),
    /// The listener's own hand-raise document
    OwnHand(DocumentSnapshot),
    /// Host-side hand-raise collection change
    HandRaises(CollectionChange),
    /// Message feed change
    Message(CollectionChange),
}

/// A decoded, state-changing event folded by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The room-wide mute policy changed
    MicRestriction(bool),
    /// The room reached its terminal state (closed or removed)
    RoomClosed,
    /// The participant's own hand-raise state changed
    HandChanged(HandState),
    /// The host's pending queue received a collection change
    QueueChanged(HandRaiseChange),
}
