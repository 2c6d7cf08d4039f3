//! Repository for the `messages` collection.

use std::sync::Arc;

use duo_auth::Identity;
use duo_store::{Cursor, Direction, DocumentStore, Patch, Query, StoreResult, Subscription};
use serde_json::Value;

use super::{decode_documents, MESSAGES};
use crate::entities::{Message, NewMessage};

#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<dyn DocumentStore>,
}

impl MessageRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn newest_first() -> Query {
        Query::collection(MESSAGES).order_by("timestamp", Direction::Descending)
    }

    /// Pagination cursor positioned at `message`.
    pub fn cursor_for(message: &Message) -> Cursor {
        Cursor::new(Value::from(message.timestamp.timestamp_micros()), message.id.clone())
    }

    /// Live window over the `limit` newest messages, newest first.
    pub async fn subscribe_latest(&self, limit: usize) -> StoreResult<Subscription> {
        self.store.subscribe(Self::newest_first().limit(limit)).await
    }

    /// Up to `limit` messages strictly older than `cursor`, newest first.
    pub async fn page_before(&self, cursor: Cursor, limit: usize) -> StoreResult<Vec<Message>> {
        let query = Self::newest_first().start_after(cursor).limit(limit);
        let documents = self.store.query(&query).await?;
        Ok(decode_documents(&documents))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<Message>> {
        match self.store.get(MESSAGES, id).await? {
            Some(document) => document.decode().map(Some),
            None => Ok(None),
        }
    }

    pub async fn create(&self, message: NewMessage) -> StoreResult<Message> {
        self.store
            .insert(MESSAGES, message.into_document())
            .await?
            .decode()
    }

    pub async fn add_like(&self, id: &str, identity: &Identity) -> StoreResult<()> {
        let patch = Patch::new().array_union("likes", identity.as_str());
        self.store.update(MESSAGES, id, patch).await
    }

    pub async fn remove_like(&self, id: &str, identity: &Identity) -> StoreResult<()> {
        let patch = Patch::new().array_remove("likes", identity.as_str());
        self.store.update(MESSAGES, id, patch).await
    }
}
