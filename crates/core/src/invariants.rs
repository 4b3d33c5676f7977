//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use chrono::{DateTime, Utc};

use crate::models::{HandRaise, HandRaiseStatus, RoomStatus};

/// Validate a room status transition. `Closed` is terminal; a closed
/// room must never become active again.
pub fn assert_room_transition(old: RoomStatus, new: RoomStatus) {
    debug_assert!(
        !(old == RoomStatus::Closed && new == RoomStatus::Active),
        "Room transitioned from closed back to active"
    );
}

/// Validate the host's pending queue: sorted by raise time, one entry
/// per listener, nothing but pending records.
pub fn assert_queue_invariants(entries: &[HandRaise]) {
    debug_assert!(
        entries
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp),
        "Pending queue out of raise-time order"
    );

    debug_assert!(
        entries.iter().all(|e| e.status == HandRaiseStatus::Pending),
        "Pending queue holds a non-pending record"
    );

    for (i, entry) in entries.iter().enumerate() {
        debug_assert!(
            !entries[i + 1..]
                .iter()
                .any(|other| other.listener_id == entry.listener_id),
            "Pending queue holds duplicate listener {}",
            entry.listener_id
        );
    }
}

/// Validate that a message delivery advances the watermark
pub fn assert_watermark_advance(watermark: DateTime<Utc>, incoming: DateTime<Utc>) {
    debug_assert!(
        incoming > watermark,
        "Delivering message at {} behind watermark {}",
        incoming,
        watermark
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn pending(offset_ms: i64) -> HandRaise {
        HandRaise {
            listener_id: Uuid::new_v4(),
            display_name: "listener".to_string(),
            timestamp: Utc::now() + Duration::milliseconds(offset_ms),
            status: HandRaiseStatus::Pending,
        }
    }

    #[test]
    fn test_valid_transitions() {
        assert_room_transition(RoomStatus::Active, RoomStatus::Closed);
        assert_room_transition(RoomStatus::Active, RoomStatus::Active);
        assert_room_transition(RoomStatus::Closed, RoomStatus::Closed);
    }

    #[test]
    #[should_panic(expected = "closed back to active")]
    fn test_reopening_is_impossible() {
        assert_room_transition(RoomStatus::Closed, RoomStatus::Active);
    }

    #[test]
    fn test_valid_queue() {
        assert_queue_invariants(&[pending(0), pending(10), pending(20)]);
    }

    #[test]
    #[should_panic(expected = "out of raise-time order")]
    fn test_unordered_queue_caught() {
        assert_queue_invariants(&[pending(20), pending(0)]);
    }

    #[test]
    #[should_panic(expected = "behind watermark")]
    fn test_stale_delivery_caught() {
        let now = Utc::now();
        assert_watermark_advance(now, now);
    }
}
