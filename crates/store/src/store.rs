//! The document store contract consumed by the sync engines.

use async_trait::async_trait;

use crate::document::{Document, NewDocument};
use crate::live::Subscription;
use crate::patch::Patch;
use crate::query::Query;
use crate::types::StoreResult;

/// Remote document store: named collections of JSON documents with ordered
/// range queries, live subscriptions and field-level updates.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot range query.
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Standing query. The first delivery is the current result; later ones
    /// follow every change to it until the subscription is dropped.
    async fn subscribe(&self, query: Query) -> StoreResult<Subscription>;

    /// Point read. A missing document is `Ok(None)`.
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert with a store-assigned id (and commit time, if requested).
    async fn insert(&self, collection: &str, document: NewDocument) -> StoreResult<Document>;

    /// Merge `patch` into an existing document atomically.
    async fn update(&self, collection: &str, id: &str, patch: Patch) -> StoreResult<()>;

    /// Delete by id. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}
