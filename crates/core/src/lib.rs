//! Babelcast Core Library
//!
//! Domain models, moderation rules, and the store path scheme for
//! Babelcast live rooms.

pub mod error;
mod fields;
pub mod invariants;
pub mod models;
pub mod moderation;
pub mod paths;

pub use error::{Error, Result};
pub use models::*;
pub use moderation::{can_publish, HandRaiseChange, PendingQueue, Role};
