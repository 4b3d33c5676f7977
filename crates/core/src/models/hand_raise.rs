//! Hand-raise record and permission state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use babelcast_store::{FieldValue, Fields};

use crate::error::{Error, Result};
use crate::fields::{require_str, require_time, require_uuid};

/// Status of a stored hand-raise record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandRaiseStatus {
    Pending,
    Approved,
    Denied,
}

impl HandRaiseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandRaiseStatus::Pending => "pending",
            HandRaiseStatus::Approved => "approved",
            HandRaiseStatus::Denied => "denied",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(HandRaiseStatus::Pending),
            "approved" => Some(HandRaiseStatus::Approved),
            "denied" => Some(HandRaiseStatus::Denied),
            _ => None,
        }
    }
}

/// Listener-side view of hand-raise state; `Idle` means no record exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandState {
    Idle,
    Pending,
    Approved,
    Denied,
}

impl HandState {
    /// Mirror of the remote record; absent record maps to `Idle`
    pub fn from_record(status: Option<HandRaiseStatus>) -> Self {
        match status {
            None => HandState::Idle,
            Some(HandRaiseStatus::Pending) => HandState::Pending,
            Some(HandRaiseStatus::Approved) => HandState::Approved,
            Some(HandRaiseStatus::Denied) => HandState::Denied,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, HandState::Approved)
    }
}

/// A listener's request for speaking permission.
/// At most one record exists per (room, listener).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandRaise {
    pub listener_id: Uuid,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: HandRaiseStatus,
}

impl HandRaise {
    pub fn new(listener_id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            listener_id,
            display_name: display_name.into(),
            timestamp: Utc::now(),
            status: HandRaiseStatus::Pending,
        }
    }

    /// Fields written on raise; overwrites any prior record wholesale,
    /// so a denied listener can raise again. `timestamp` is stamped by
    /// the store.
    pub fn raise_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("listener_id".into(), self.listener_id.to_string().into());
        fields.insert("display_name".into(), self.display_name.as_str().into());
        fields.insert("timestamp".into(), FieldValue::ServerTime);
        fields.insert("status".into(), HandRaiseStatus::Pending.as_str().into());
        fields
    }

    /// Single-field patch used by the host to approve or deny
    pub fn status_fields(status: HandRaiseStatus) -> Fields {
        let mut fields = Fields::new();
        fields.insert("status".into(), status.as_str().into());
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        let status_raw = require_str(fields, "status")?;
        let status = HandRaiseStatus::parse(status_raw)
            .ok_or_else(|| Error::Document(format!("unknown hand-raise status `{status_raw}`")))?;
        Ok(HandRaise {
            listener_id: require_uuid(fields, "listener_id")?,
            display_name: require_str(fields, "display_name")?.to_string(),
            timestamp: require_time(fields, "timestamp")?,
            status,
        })
    }
}
