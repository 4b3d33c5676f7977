//! Babelcast Session
//!
//! Client-side session controller for Babelcast live rooms: room
//! lifecycle, admission-controlled broadcast, hand-raise moderation, and
//! a single cleanup path, all over an injected change feed.

pub mod config;
pub mod events;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use events::SessionEvent;
pub use session::{Identity, LiveSession, UtteranceCallback};
pub use state::{reduce, SessionSnapshot, SessionStatus};
