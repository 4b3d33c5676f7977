//! In-process change-feed backend
//!
//! Backs tests and local development. Deliberately reproduces the store
//! behaviors consumers must tolerate: existing documents replay as
//! synthetic `Added` events when a collection subscription attaches, and
//! `ServerTime` sentinels resolve to a clock that is strictly increasing
//! across the whole store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::document::{CollectionPath, DocPath, FieldValue, Fields, OrderBy};
use crate::error::{Error, Result};
use crate::feed::{
    subscription_channel, ChangeFeed, ChangeKind, CollectionChange, DocumentSnapshot, Subscription,
    SubscriptionSender,
};

/// Buffered events per subscriber, beyond any snapshot replay
const SUBSCRIBER_CAPACITY: usize = 64;

struct CollectionWatcher {
    path: String,
    tx: SubscriptionSender<CollectionChange>,
}

struct DocumentWatcher {
    path: String,
    tx: SubscriptionSender<DocumentSnapshot>,
}

#[derive(Default)]
struct Inner {
    /// collection path -> document id -> fields
    collections: HashMap<String, BTreeMap<String, Fields>>,
    collection_watchers: Vec<CollectionWatcher>,
    document_watchers: Vec<DocumentWatcher>,
    last_stamp: Option<DateTime<Utc>>,
}

/// A queued notification, sent after the state lock is released
enum Delivery {
    Collection(SubscriptionSender<CollectionChange>, CollectionChange),
    Document(SubscriptionSender<DocumentSnapshot>, DocumentSnapshot),
}

/// In-memory store backend
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Next server timestamp; strictly greater than every prior stamp
    fn next_stamp(inner: &mut Inner) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match inner.last_stamp {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        inner.last_stamp = Some(stamp);
        stamp
    }

    fn resolve_server_time(fields: &mut Fields, stamp: DateTime<Utc>) {
        for value in fields.values_mut() {
            if matches!(value, FieldValue::ServerTime) {
                *value = FieldValue::Time(stamp);
            }
        }
    }

    /// Queue notifications for everyone watching this document or its
    /// collection, pruning watchers whose subscriber went away
    fn notify(
        inner: &mut Inner,
        collection: &str,
        doc_path: &str,
        change: CollectionChange,
        snapshot: DocumentSnapshot,
    ) -> Vec<Delivery> {
        inner.collection_watchers.retain(|w| w.tx.is_live());
        inner.document_watchers.retain(|w| w.tx.is_live());

        let mut deliveries = Vec::new();
        for watcher in &inner.collection_watchers {
            if watcher.path == collection {
                deliveries.push(Delivery::Collection(watcher.tx.clone(), change.clone()));
            }
        }
        for watcher in &inner.document_watchers {
            if watcher.path == doc_path {
                deliveries.push(Delivery::Document(watcher.tx.clone(), snapshot.clone()));
            }
        }
        deliveries
    }

    async fn deliver(deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let accepted = match delivery {
                Delivery::Collection(tx, change) => tx.send(change).await,
                Delivery::Document(tx, snapshot) => tx.send(snapshot).await,
            };
            if !accepted {
                debug!("Dropped event for a departed subscriber");
            }
        }
    }
}

#[async_trait::async_trait]
impl ChangeFeed for MemoryStore {
    async fn get_document(&self, path: &DocPath) -> Result<Option<Fields>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .collections
            .get(path.parent().as_str())
            .and_then(|col| col.get(path.id()))
            .cloned())
    }

    async fn set_document(&self, path: &DocPath, mut fields: Fields, merge: bool) -> Result<()> {
        let deliveries = {
            let mut inner = self.inner.lock().unwrap();
            let stamp = Self::next_stamp(&mut inner);
            Self::resolve_server_time(&mut fields, stamp);

            let collection = path.parent().as_str().to_string();
            let doc_id = path.id().to_string();
            let col = inner.collections.entry(collection.clone()).or_default();
            let kind = if col.contains_key(&doc_id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            let stored = if merge {
                let doc = col.entry(doc_id.clone()).or_default();
                doc.extend(fields);
                doc.clone()
            } else {
                col.insert(doc_id.clone(), fields.clone());
                fields
            };

            let change = CollectionChange {
                kind,
                doc_id,
                fields: stored.clone(),
            };
            let snapshot = DocumentSnapshot::present(stored);
            Self::notify(&mut inner, &collection, path.as_str(), change, snapshot)
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn update_document(&self, path: &DocPath, mut fields: Fields) -> Result<()> {
        let deliveries = {
            let mut inner = self.inner.lock().unwrap();
            let stamp = Self::next_stamp(&mut inner);
            Self::resolve_server_time(&mut fields, stamp);

            let collection = path.parent().as_str().to_string();
            let doc_id = path.id().to_string();
            let stored = {
                let doc = match inner
                    .collections
                    .get_mut(&collection)
                    .and_then(|col| col.get_mut(&doc_id))
                {
                    Some(doc) => doc,
                    None => return Err(Error::NotFound),
                };
                doc.extend(fields);
                doc.clone()
            };

            let change = CollectionChange {
                kind: ChangeKind::Modified,
                doc_id,
                fields: stored.clone(),
            };
            let snapshot = DocumentSnapshot::present(stored);
            Self::notify(&mut inner, &collection, path.as_str(), change, snapshot)
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn delete_document(&self, path: &DocPath) -> Result<()> {
        let deliveries = {
            let mut inner = self.inner.lock().unwrap();
            let collection = path.parent().as_str().to_string();
            let doc_id = path.id().to_string();
            match inner
                .collections
                .get_mut(&collection)
                .and_then(|col| col.remove(&doc_id))
            {
                Some(last) => {
                    let change = CollectionChange {
                        kind: ChangeKind::Removed,
                        doc_id,
                        fields: last,
                    };
                    Self::notify(
                        &mut inner,
                        &collection,
                        path.as_str(),
                        change,
                        DocumentSnapshot::absent(),
                    )
                }
                None => Vec::new(),
            }
        };
        Self::deliver(deliveries).await;
        Ok(())
    }

    async fn subscribe_collection(
        &self,
        path: &CollectionPath,
        order_by: OrderBy,
    ) -> Result<Subscription<CollectionChange>> {
        let (sender, subscription, replay) = {
            let mut inner = self.inner.lock().unwrap();
            let mut docs: Vec<(String, Fields)> = inner
                .collections
                .get(path.as_str())
                .map(|col| col.iter().map(|(id, f)| (id.clone(), f.clone())).collect())
                .unwrap_or_default();
            docs.sort_by(|a, b| {
                order_key(&a.1, order_by.field_name())
                    .cmp(&order_key(&b.1, order_by.field_name()))
                    .then_with(|| a.0.cmp(&b.0))
            });

            // Size the buffer so replay can never deadlock the subscriber
            let (sender, subscription) = subscription_channel(SUBSCRIBER_CAPACITY + docs.len());
            inner.collection_watchers.push(CollectionWatcher {
                path: path.as_str().to_string(),
                tx: sender.clone(),
            });
            (sender, subscription, docs)
        };

        // Existing documents replay as synthetic `Added` events
        for (doc_id, fields) in replay {
            let accepted = sender
                .send(CollectionChange {
                    kind: ChangeKind::Added,
                    doc_id,
                    fields,
                })
                .await;
            if !accepted {
                break;
            }
        }
        Ok(subscription)
    }

    async fn subscribe_document(&self, path: &DocPath) -> Result<Subscription<DocumentSnapshot>> {
        let (sender, subscription, snapshot) = {
            let mut inner = self.inner.lock().unwrap();
            let current = inner
                .collections
                .get(path.parent().as_str())
                .and_then(|col| col.get(path.id()))
                .cloned();
            let (sender, subscription) = subscription_channel(SUBSCRIBER_CAPACITY);
            inner.document_watchers.push(DocumentWatcher {
                path: path.as_str().to_string(),
                tx: sender.clone(),
            });
            let snapshot = match current {
                Some(fields) => DocumentSnapshot::present(fields),
                None => DocumentSnapshot::absent(),
            };
            (sender, subscription, snapshot)
        };
        sender.send(snapshot).await;
        Ok(subscription)
    }
}

fn order_key(fields: &Fields, field: &str) -> DateTime<Utc> {
    // Documents missing the order field sort first
    fields
        .get(field)
        .and_then(FieldValue::as_time)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
