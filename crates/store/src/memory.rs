//! Process-local document store.
//!
//! Shared between sessions through an `Arc`, it stands in for the remote
//! store in tests and in single-process setups.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clock::ServerClock;
use crate::document::{Document, NewDocument};
use crate::live::{Subscription, SubscriptionHub};
use crate::patch::Patch;
use crate::query::Query;
use crate::store::DocumentStore;
use crate::types::{StoreError, StoreResult};

type Collection = BTreeMap<String, Document>;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    hub: Arc<SubscriptionHub>,
    clock: ServerClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            hub: SubscriptionHub::new(),
            clock: ServerClock::new(),
        }
    }

    /// Number of live subscriptions currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.hub.len()
    }

    /// Push `error` to every live query over `collection`, as a dropped
    /// connection to a remote store would. The next write re-delivers in full.
    pub fn interrupt(&self, collection: &str, error: impl Fn() -> StoreError) {
        info!(collection, "interrupting live queries");
        self.hub.publish_error(collection, error);
    }

    /// End every live query without an error.
    pub fn disconnect(&self) {
        info!("disconnecting live queries");
        self.hub.close_all();
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn snapshot(collections: &HashMap<String, Collection>, collection: &str) -> Vec<Document> {
        collections
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, collections: &HashMap<String, Collection>, collection: &str) {
        if self.hub.is_watching(collection) {
            self.hub
                .publish(collection, &Self::snapshot(collections, collection));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read().await;
        let results = query.run(Self::snapshot(&collections, &query.collection));
        debug!(collection = %query.collection, results = results.len(), "ran query");
        Ok(results)
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        // Holding the lock keeps writers from publishing between evaluation and registration.
        let collections = self.collections.read().await;
        let initial = query.run(Self::snapshot(&collections, &query.collection));
        Ok(self.hub.register(query, initial))
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn insert(&self, collection: &str, document: NewDocument) -> StoreResult<Document> {
        let mut collections = self.collections.write().await;
        let id = cuid2::create_id();
        let document = document.into_document(id.clone(), self.clock.now_micros());

        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document.clone());

        info!(collection, document_id = %id, "inserted document");
        self.publish(&collections, collection);
        Ok(document)
    }

    async fn update(&self, collection: &str, id: &str, patch: Patch) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if patch.apply(&mut document.fields) {
            debug!(collection, document_id = id, "updated document");
            self.publish(&collections, collection);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .is_some();

        if removed {
            info!(collection, document_id = id, "deleted document");
            self.publish(&collections, collection);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn note(text: &str) -> NewDocument {
        NewDocument::from_value(json!({ "text": text }))
            .unwrap()
            .with_server_timestamp("createdAt")
    }

    #[tokio::test]
    async fn insert_assigns_id_and_increasing_timestamps() {
        let store = MemoryStore::new();
        let first = store.insert("notes", note("one")).await.unwrap();
        let second = store.insert("notes", note("two")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert!(second.get("createdAt").unwrap().as_i64() > first.get("createdAt").unwrap().as_i64());
        assert_eq!(store.count("notes").await, 2);
    }

    #[tokio::test]
    async fn update_merges_and_rejects_missing_documents() {
        let store = MemoryStore::new();
        let created = store.insert("notes", note("one")).await.unwrap();

        assert_ok!(
            store
                .update("notes", &created.id, Patch::new().set("pinned", true))
                .await
        );
        let stored = store.get("notes", &created.id).await.unwrap().unwrap();
        assert_eq!(stored.get("text"), Some(&json!("one")));
        assert_eq!(stored.get("pinned"), Some(&json!(true)));

        let missing = store.update("notes", "nope", Patch::new().set("pinned", true)).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let created = store.insert("notes", note("one")).await.unwrap();

        assert_ok!(store.delete("notes", &created.id).await);
        assert_ok!(store.delete("notes", &created.id).await);
        assert!(store.get("notes", &created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscription_redelivers_full_window_on_change() {
        let store = MemoryStore::new();
        store.insert("notes", note("one")).await.unwrap();

        let query = Query::collection("notes")
            .order_by("createdAt", Direction::Descending)
            .limit(2);
        let mut subscription = store.subscribe(query).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 1);

        store.insert("notes", note("two")).await.unwrap();
        store.insert("notes", note("three")).await.unwrap();

        let second = subscription.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 2);
        let third = subscription.next().await.unwrap().unwrap();
        let texts: Vec<_> = third.iter().map(|d| d.get("text").unwrap().clone()).collect();
        assert_eq!(texts, vec![json!("three"), json!("two")]);

        drop(subscription);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn interrupted_subscription_recovers_on_next_write() {
        let store = MemoryStore::new();
        store.insert("notes", note("one")).await.unwrap();
        let mut subscription = store.subscribe(Query::collection("notes")).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 1);

        store.interrupt("notes", || StoreError::ConnectionError("gone".into()));
        assert!(matches!(
            subscription.next().await,
            Some(Err(StoreError::ConnectionError(_)))
        ));

        store.insert("notes", note("two")).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn disconnect_ends_every_subscription() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe(Query::collection("notes")).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().unwrap().len(), 0);

        store.disconnect();
        assert!(subscription.next().await.is_none());
        assert_eq!(store.subscriber_count(), 0);
    }
}
