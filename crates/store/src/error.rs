//! Store error types

/// Store result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a change-feed backend
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Document not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store closed")]
    Closed,
}

impl Error {
    /// Transient failures are worth retrying; the rest are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}
