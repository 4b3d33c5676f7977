//! Typed field extraction from store documents
//!
//! Documents arrive as untyped field maps; these helpers turn missing or
//! mistyped fields into `Error::Document` instead of panics.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use babelcast_store::{FieldValue, Fields};

use crate::error::{Error, Result};

pub(crate) fn require<'a>(fields: &'a Fields, name: &str) -> Result<&'a FieldValue> {
    fields
        .get(name)
        .ok_or_else(|| Error::Document(format!("missing field `{name}`")))
}

pub(crate) fn require_str<'a>(fields: &'a Fields, name: &str) -> Result<&'a str> {
    require(fields, name)?
        .as_str()
        .ok_or_else(|| Error::Document(format!("field `{name}` is not a string")))
}

pub(crate) fn require_bool(fields: &Fields, name: &str) -> Result<bool> {
    require(fields, name)?
        .as_bool()
        .ok_or_else(|| Error::Document(format!("field `{name}` is not a bool")))
}

pub(crate) fn require_time(fields: &Fields, name: &str) -> Result<DateTime<Utc>> {
    require(fields, name)?
        .as_time()
        .ok_or_else(|| Error::Document(format!("field `{name}` is not a timestamp")))
}

pub(crate) fn require_uuid(fields: &Fields, name: &str) -> Result<Uuid> {
    let raw = require_str(fields, name)?;
    Uuid::parse_str(raw).map_err(|_| Error::Document(format!("field `{name}` is not a UUID")))
}
