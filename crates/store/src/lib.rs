//! Babelcast Store
//!
//! Change-feed contract over an eventually-consistent document store,
//! plus the in-process backend used by tests and local development.

pub mod document;
pub mod error;
pub mod feed;
pub mod memory;
pub mod retry;

pub use document::{CollectionPath, DocPath, FieldValue, Fields, OrderBy};
pub use error::{Error, Result};
pub use feed::{
    subscription_channel, CancelHandle, ChangeFeed, ChangeKind, CollectionChange, DocumentSnapshot,
    Subscription, SubscriptionSender,
};
pub use memory::MemoryStore;
pub use retry::{retry_async, RetryPolicy};
