//! Change feed contract
//!
//! The store is an eventually-consistent document/subscription service
//! with at-least-once delivery. A collection subscription may redeliver
//! existing documents as `Added` events when it first attaches; consumers
//! are expected to filter historical replay themselves.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::document::{CollectionPath, DocPath, Fields, OrderBy};
use crate::error::Result;

/// Kind of change delivered on a collection subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One change event on a subscribed collection
#[derive(Debug, Clone)]
pub struct CollectionChange {
    pub kind: ChangeKind,
    pub doc_id: String,
    /// Document fields; for `Removed`, the last known fields
    pub fields: Fields,
}

/// One snapshot of a subscribed document
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub exists: bool,
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn present(fields: Fields) -> Self {
        DocumentSnapshot {
            exists: true,
            fields: Some(fields),
        }
    }

    pub fn absent() -> Self {
        DocumentSnapshot {
            exists: false,
            fields: None,
        }
    }
}

/// Cancellation handle for a subscription; cheap to clone
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        CancelHandle { flag: Arc::new(tx) }
    }

    /// Stop the subscription. No further event is yielded after this,
    /// including events already buffered.
    pub fn cancel(&self) {
        let _ = self.flag.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.flag.subscribe()
    }
}

/// A live subscription stream
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    cancel: CancelHandle,
}

impl<T> Subscription<T> {
    /// Next event, or `None` once the stream ends or is cancelled
    pub async fn recv(&mut self) -> Option<T> {
        let mut cancelled = self.cancel.watch();
        if *cancelled.borrow() {
            return None;
        }
        tokio::select! {
            _ = cancelled.changed() => None,
            item = self.rx.recv() => {
                // The select may win the race against a concurrent cancel
                if self.cancel.is_cancelled() {
                    None
                } else {
                    item
                }
            }
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

/// Store-side sending half of a subscription
#[derive(Debug, Clone)]
pub struct SubscriptionSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancelHandle,
}

impl<T> SubscriptionSender<T> {
    /// Deliver an event unless the subscriber cancelled or went away.
    /// Returns whether the event was accepted.
    pub async fn send(&self, item: T) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(item).await.is_ok()
    }

    /// Whether the subscriber is still interested in events
    pub fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// Create a subscription and its store-side sender
pub fn subscription_channel<T>(capacity: usize) -> (SubscriptionSender<T>, Subscription<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancelHandle::new();
    (
        SubscriptionSender {
            tx,
            cancel: cancel.clone(),
        },
        Subscription { rx, cancel },
    )
}

/// Contract with the remote document/subscription store
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Read a single document
    async fn get_document(&self, path: &DocPath) -> Result<Option<Fields>>;

    /// Write a document. `merge = false` replaces it wholesale;
    /// `merge = true` patches the named fields, creating the document if
    /// absent. `FieldValue::ServerTime` sentinels are resolved to the
    /// backend clock at write time.
    async fn set_document(&self, path: &DocPath, fields: Fields, merge: bool) -> Result<()>;

    /// Patch named fields of an existing document; `Error::NotFound` if
    /// the document is absent
    async fn update_document(&self, path: &DocPath, fields: Fields) -> Result<()>;

    /// Delete a document; deleting an absent document is a no-op
    async fn delete_document(&self, path: &DocPath) -> Result<()>;

    /// Subscribe to changes on a collection, ordered by the given field
    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        order_by: OrderBy,
    ) -> Result<Subscription<CollectionChange>>;

    /// Subscribe to snapshots of a single document; the first element
    /// reflects the current state
    async fn subscribe_document(&self, path: &DocPath) -> Result<Subscription<DocumentSnapshot>>;
}
