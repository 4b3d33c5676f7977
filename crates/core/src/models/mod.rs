//! Data models for Babelcast

mod hand_raise;
mod room;
mod utterance;

pub use hand_raise::*;
pub use room::*;
pub use utterance::*;
