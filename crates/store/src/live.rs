//! Live query subscriptions.
//!
//! Backends register standing queries with a [`SubscriptionHub`] and publish
//! the affected collection after every committed write. Each subscriber
//! receives the full matching result set whenever it differs from the last
//! one it was sent, in commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::document::Document;
use crate::query::Query;
use crate::types::{StoreError, StoreResult};

/// One push from a live subscription.
pub type Delivery = StoreResult<Vec<Document>>;

struct Watcher {
    query: Query,
    sender: mpsc::UnboundedSender<Delivery>,
    last: Option<Vec<Document>>,
}

#[derive(Default)]
pub struct SubscriptionHub {
    next_id: AtomicU64,
    watchers: Mutex<HashMap<u64, Watcher>>,
}

impl SubscriptionHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<u64, Watcher>> {
        // A poisoned map is still structurally valid.
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a standing query and queue its initial result.
    ///
    /// Callers must hold their write gate so no publish interleaves between
    /// evaluating `initial` and registering.
    pub fn register(self: &Arc<Self>, query: Query, initial: Vec<Document>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, receiver) = mpsc::unbounded_channel();

        // Receiver is alive, so the initial send cannot fail.
        let _ = sender.send(Ok(initial.clone()));

        debug!(
            subscription_id = id,
            collection = %query.collection,
            initial = initial.len(),
            "registered live query"
        );

        self.watchers().insert(
            id,
            Watcher {
                query: query.clone(),
                sender,
                last: Some(initial),
            },
        );

        Subscription {
            id,
            query,
            receiver,
            hub: Arc::downgrade(self),
        }
    }

    /// Whether anything is watching `collection`.
    pub fn is_watching(&self, collection: &str) -> bool {
        self.watchers()
            .values()
            .any(|watcher| watcher.query.collection == collection)
    }

    /// Distinct collections with at least one live query.
    pub fn watched_collections(&self) -> Vec<String> {
        let mut collections: Vec<String> = self
            .watchers()
            .values()
            .map(|watcher| watcher.query.collection.clone())
            .collect();
        collections.sort();
        collections.dedup();
        collections
    }

    /// Re-evaluate every query over `collection` and push changed results.
    pub fn publish(&self, collection: &str, documents: &[Document]) {
        let mut watchers = self.watchers();
        let mut closed = Vec::new();

        for (id, watcher) in watchers.iter_mut() {
            if watcher.query.collection != collection {
                continue;
            }

            let result = watcher.query.run(documents.iter().cloned());
            if watcher.last.as_ref() == Some(&result) {
                continue;
            }

            if watcher.sender.send(Ok(result.clone())).is_err() {
                closed.push(*id);
                continue;
            }
            debug!(subscription_id = id, collection, results = result.len(), "delivered live query");
            watcher.last = Some(result);
        }

        for id in closed {
            watchers.remove(&id);
        }
    }

    /// Push a failure to every query over `collection`.
    pub fn publish_error(&self, collection: &str, error: impl Fn() -> StoreError) {
        let mut watchers = self.watchers();
        watchers.retain(|_, watcher| {
            if watcher.query.collection != collection {
                return true;
            }
            // Force a full re-delivery once the store recovers.
            watcher.last = None;
            watcher.sender.send(Err(error())).is_ok()
        });
    }

    /// Drop every live query. Subscribers see the end of their stream.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut *self.watchers());
        if !closed.is_empty() {
            debug!(count = closed.len(), "closed all live queries");
        }
    }

    pub fn len(&self) -> usize {
        self.watchers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        if self.watchers().remove(&id).is_some() {
            debug!(subscription_id = id, "closed live query");
        }
    }
}

/// Handle to a live query. Dropping it unregisters the query.
pub struct Subscription {
    id: u64,
    query: Query,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    hub: Weak<SubscriptionHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Next delivery, or `None` once the store has gone away.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("collection", &self.query.collection)
            .finish()
    }
}
