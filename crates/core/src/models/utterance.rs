//! Utterance model for the room's broadcast feed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use babelcast_store::{FieldValue, Fields};

use crate::error::Result;
use crate::fields::{require_str, require_time, require_uuid};

/// One translated speech utterance broadcast into a room.
/// Immutable once written; ordered by `timestamp` within the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub lang_code: String,
    pub sender_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, lang_code: impl Into<String>, sender_id: Uuid) -> Self {
        Self {
            text: text.into(),
            lang_code: lang_code.into(),
            sender_id,
            timestamp: Utc::now(),
        }
    }

    /// Fields written on publish; `timestamp` is stamped by the store
    pub fn broadcast_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("text".into(), self.text.as_str().into());
        fields.insert("lang_code".into(), self.lang_code.as_str().into());
        fields.insert("sender_id".into(), self.sender_id.to_string().into());
        fields.insert("timestamp".into(), FieldValue::ServerTime);
        fields
    }

    pub fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Utterance {
            text: require_str(fields, "text")?.to_string(),
            lang_code: require_str(fields, "lang_code")?.to_string(),
            sender_id: require_uuid(fields, "sender_id")?,
            timestamp: require_time(fields, "timestamp")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_field_roundtrip() {
        let utterance = Utterance::new("bonjour", "fr", Uuid::new_v4());
        let mut fields = utterance.broadcast_fields();
        fields.insert("timestamp".into(), Utc::now().into());

        let decoded = Utterance::from_fields(&fields).unwrap();
        assert_eq!(decoded.text, "bonjour");
        assert_eq!(decoded.lang_code, "fr");
        assert_eq!(decoded.sender_id, utterance.sender_id);
    }

    #[test]
    fn test_missing_text_rejected() {
        let utterance = Utterance::new("hola", "es", Uuid::new_v4());
        let mut fields = utterance.broadcast_fields();
        fields.insert("timestamp".into(), Utc::now().into());
        fields.remove("text");
        assert!(Utterance::from_fields(&fields).is_err());
    }
}
