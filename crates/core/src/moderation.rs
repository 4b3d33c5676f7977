//! Moderation rules
//!
//! Admission control for the broadcast channel and the host's incremental
//! queue of pending hand raises. Everything here is pure state logic; the
//! session layer feeds it store events and acts on the results.

use uuid::Uuid;

use crate::invariants::assert_queue_invariants;
use crate::models::{HandRaise, HandRaiseStatus, HandState};

/// Participant role within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Listener,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

/// May this participant publish to the room right now?
///
/// Hosts always may. A listener may while the mic is unrestricted, or
/// once their own hand raise has been approved.
pub fn can_publish(role: Role, mic_restricted: bool, hand: HandState) -> bool {
    match role {
        Role::Host => true,
        Role::Listener => !mic_restricted || hand.is_approved(),
    }
}

/// One change to a room's hand-raise collection, as seen by the host
#[derive(Debug, Clone, PartialEq)]
pub enum HandRaiseChange {
    /// A record was added or modified
    Upserted(HandRaise),
    /// A listener's record was deleted
    Removed(Uuid),
}

/// Host-side queue of pending requests, oldest raise first.
///
/// Maintained incrementally from feed events: a record moving out of
/// `pending` leaves the queue without waiting for a re-read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    entries: Vec<HandRaise>,
}

impl PendingQueue {
    pub fn new() -> Self {
        PendingQueue::default()
    }

    /// Fold one feed change into the queue
    pub fn apply(&mut self, change: HandRaiseChange) {
        match change {
            HandRaiseChange::Upserted(raise) if raise.status == HandRaiseStatus::Pending => {
                self.upsert(raise);
            }
            HandRaiseChange::Upserted(raise) => {
                self.remove(raise.listener_id);
            }
            HandRaiseChange::Removed(listener_id) => {
                self.remove(listener_id);
            }
        }
        assert_queue_invariants(&self.entries);
    }

    pub fn entries(&self) -> &[HandRaise] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn upsert(&mut self, raise: HandRaise) {
        self.remove(raise.listener_id);
        let position = self
            .entries
            .iter()
            .position(|e| (e.timestamp, e.listener_id) > (raise.timestamp, raise.listener_id))
            .unwrap_or(self.entries.len());
        self.entries.insert(position, raise);
    }

    fn remove(&mut self, listener_id: Uuid) {
        self.entries.retain(|e| e.listener_id != listener_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn raise_at(offset_ms: i64, status: HandRaiseStatus) -> HandRaise {
        HandRaise {
            listener_id: Uuid::new_v4(),
            display_name: "listener".to_string(),
            timestamp: Utc::now() + Duration::milliseconds(offset_ms),
            status,
        }
    }

    #[test]
    fn test_host_always_publishes() {
        assert!(can_publish(Role::Host, true, HandState::Idle));
        assert!(can_publish(Role::Host, false, HandState::Denied));
    }

    #[test]
    fn test_listener_admission_matrix() {
        // Unrestricted mic admits everyone
        assert!(can_publish(Role::Listener, false, HandState::Idle));
        assert!(can_publish(Role::Listener, false, HandState::Denied));

        // Restricted mic admits only approved hands
        assert!(!can_publish(Role::Listener, true, HandState::Idle));
        assert!(!can_publish(Role::Listener, true, HandState::Pending));
        assert!(!can_publish(Role::Listener, true, HandState::Denied));
        assert!(can_publish(Role::Listener, true, HandState::Approved));
    }

    #[test]
    fn test_queue_orders_by_raise_time() {
        let mut queue = PendingQueue::new();
        let late = raise_at(100, HandRaiseStatus::Pending);
        let early = raise_at(0, HandRaiseStatus::Pending);

        queue.apply(HandRaiseChange::Upserted(late.clone()));
        queue.apply(HandRaiseChange::Upserted(early.clone()));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.entries()[0].listener_id, early.listener_id);
        assert_eq!(queue.entries()[1].listener_id, late.listener_id);
    }

    #[test]
    fn test_resolved_record_leaves_queue() {
        let mut queue = PendingQueue::new();
        let mut raise = raise_at(0, HandRaiseStatus::Pending);
        queue.apply(HandRaiseChange::Upserted(raise.clone()));
        assert_eq!(queue.len(), 1);

        raise.status = HandRaiseStatus::Approved;
        queue.apply(HandRaiseChange::Upserted(raise));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_removed_record_leaves_queue() {
        let mut queue = PendingQueue::new();
        let raise = raise_at(0, HandRaiseStatus::Pending);
        queue.apply(HandRaiseChange::Upserted(raise.clone()));

        queue.apply(HandRaiseChange::Removed(raise.listener_id));
        assert!(queue.is_empty());

        // Removing an unknown listener is harmless
        queue.apply(HandRaiseChange::Removed(Uuid::new_v4()));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_re_raise_replaces_entry() {
        let mut queue = PendingQueue::new();
        let mut raise = raise_at(0, HandRaiseStatus::Pending);
        queue.apply(HandRaiseChange::Upserted(raise.clone()));

        // Same listener raises again with a later stamp; still one entry
        raise.timestamp = raise.timestamp + Duration::milliseconds(50);
        queue.apply(HandRaiseChange::Upserted(raise.clone()));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.entries()[0].timestamp, raise.timestamp);
    }

    #[test]
    fn test_non_pending_upsert_is_ignored() {
        let mut queue = PendingQueue::new();
        queue.apply(HandRaiseChange::Upserted(raise_at(
            0,
            HandRaiseStatus::Denied,
        )));
        assert!(queue.is_empty());
    }
}
