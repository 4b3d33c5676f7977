//! Room model and code generation

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use babelcast_store::{FieldValue, Fields};

use crate::error::{Error, Result};
use crate::fields::{require_bool, require_str, require_time, require_uuid};

/// Six-digit numeric room code, the room's identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Generate a random code in `100000..=999999`
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        RoomCode(rng.gen_range(100_000..1_000_000).to_string())
    }

    /// Parse a user-supplied code; must be exactly six ASCII digits
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() == 6 && raw.chars().all(|c| c.is_ascii_digit()) {
            Ok(RoomCode(raw.to_string()))
        } else {
            Err(Error::RoomNotFound(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room lifecycle status. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Active,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(RoomStatus::Active),
            "closed" => Some(RoomStatus::Closed),
            _ => None,
        }
    }
}

/// A live broadcast room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomCode,
    pub host_id: Uuid,
    pub status: RoomStatus,
    pub mic_restricted: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: RoomCode, host_id: Uuid) -> Self {
        Self {
            id,
            host_id,
            status: RoomStatus::Active,
            mic_restricted: false,
            created_at: Utc::now(),
        }
    }

    /// Fields written when the room is first created; `created_at` is
    /// stamped by the store
    pub fn creation_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".into(), self.id.as_str().into());
        fields.insert("host_id".into(), self.host_id.to_string().into());
        fields.insert("status".into(), self.status.as_str().into());
        fields.insert("mic_restricted".into(), self.mic_restricted.into());
        fields.insert("created_at".into(), FieldValue::ServerTime);
        fields
    }

    /// Single-field patch toggling the room-wide mute policy
    pub fn mic_fields(restricted: bool) -> Fields {
        let mut fields = Fields::new();
        fields.insert("mic_restricted".into(), restricted.into());
        fields
    }

    /// Merge patch marking the room closed (the tombstone)
    pub fn close_fields() -> Fields {
        let mut fields = Fields::new();
        fields.insert("status".into(), RoomStatus::Closed.as_str().into());
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let status_raw = require_str(fields, "status")?;
        let status = RoomStatus::parse(status_raw)
            .ok_or_else(|| Error::Document(format!("unknown room status `{status_raw}`")))?;
        Ok(Room {
            id: RoomCode::parse(require_str(fields, "id")?)?,
            host_id: require_uuid(fields, "host_id")?,
            status,
            mic_restricted: require_bool(fields, "mic_restricted")?,
            created_at: require_time(fields, "created_at")?,
        })
    }
}
