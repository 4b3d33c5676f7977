//! Store path scheme
//!
//! All documents live under the room: `rooms/{code}`,
//! `rooms/{code}/messages/{auto-id}`, `rooms/{code}/handRaises/{listener}`.

use uuid::Uuid;

use babelcast_store::{CollectionPath, DocPath};

use crate::models::RoomCode;

/// The room document
pub fn room_doc(code: &RoomCode) -> DocPath {
    DocPath::new(format!("rooms/{code}"))
}

/// The room's ordered message feed
pub fn messages(code: &RoomCode) -> CollectionPath {
    CollectionPath::new(format!("rooms/{code}/messages"))
}

/// The room's hand-raise collection, one document per listener
pub fn hand_raises(code: &RoomCode) -> CollectionPath {
    CollectionPath::new(format!("rooms/{code}/handRaises"))
}

/// A single listener's hand-raise record
pub fn hand_raise_doc(code: &RoomCode, listener_id: Uuid) -> DocPath {
    hand_raises(code).doc(&listener_id.to_string())
}
