//! Repository for the `listItems` collection.

use std::sync::Arc;

use duo_store::{Direction, DocumentStore, NewDocument, Patch, Query, StoreResult};
use serde_json::json;

use super::{decode_documents, LIST_ITEMS};
use crate::entities::ListItem;

#[derive(Clone)]
pub struct ListItemRepository {
    store: Arc<dyn DocumentStore>,
}

impl ListItemRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Items of a list, most recently added first.
    pub async fn find_by_list(&self, list_id: &str) -> StoreResult<Vec<ListItem>> {
        let query = Query::collection(LIST_ITEMS)
            .where_eq("listId", list_id)
            .order_by("addedAt", Direction::Descending);
        Ok(decode_documents(&self.store.query(&query).await?))
    }

    /// Items linking `message_id` into `list_id`. Normally zero or one.
    pub async fn find_membership(&self, list_id: &str, message_id: &str) -> StoreResult<Vec<ListItem>> {
        let query = Query::collection(LIST_ITEMS)
            .where_eq("listId", list_id)
            .where_eq("messageId", message_id);
        Ok(decode_documents(&self.store.query(&query).await?))
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Option<ListItem>> {
        match self.store.get(LIST_ITEMS, id).await? {
            Some(document) => document.decode().map(Some),
            None => Ok(None),
        }
    }

    pub async fn create(&self, list_id: &str, message_id: &str) -> StoreResult<ListItem> {
        let document = NewDocument::from_value(json!({
            "listId": list_id,
            "messageId": message_id,
            "completed": false,
        }))?
        .with_server_timestamp("addedAt");

        self.store.insert(LIST_ITEMS, document).await?.decode()
    }

    pub async fn set_completed(&self, id: &str, completed: bool) -> StoreResult<()> {
        self.store
            .update(LIST_ITEMS, id, Patch::new().set("completed", completed))
            .await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(LIST_ITEMS, id).await
    }
}
