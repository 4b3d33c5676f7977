//! Error types for Babelcast Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Sign-in required")]
    AuthRequired,

    #[error("Room {0} not found or closed")]
    RoomNotFound(String),

    #[error("Could not allocate an unused room code")]
    CodeSpaceExhausted,

    #[error("Store error: {0}")]
    Store(#[from] babelcast_store::Error),

    #[error("Malformed document: {0}")]
    Document(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
