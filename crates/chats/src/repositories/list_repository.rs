//! Repository for the `lists` collection.

use std::sync::Arc;

use duo_auth::Identity;
use duo_store::{Direction, DocumentStore, NewDocument, Query, StoreResult, Subscription};
use serde_json::json;

use super::LISTS;
use crate::entities::{List, ListPatch, NewList};

#[derive(Clone)]
pub struct ListRepository {
    store: Arc<dyn DocumentStore>,
}

impl ListRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Lists `identity` may see: every public list plus its own private ones,
    /// newest first.
    pub async fn subscribe_visible(&self, identity: &Identity) -> StoreResult<Subscription> {
        let query = Query::collection(LISTS)
            .where_any([("visibility", "public"), ("ownerId", identity.as_str())])
            .order_by("createdAt", Direction::Descending);
        self.store.subscribe(query).await
    }

    /// Insert a list owned by `owner`. The caller resolves the emoji default.
    pub async fn create(&self, owner: &Identity, new_list: &NewList) -> StoreResult<List> {
        let document = NewDocument::from_value(json!({
            "name": new_list.name,
            "ownerId": owner.as_str(),
            "visibility": new_list.visibility,
            "kind": new_list.kind,
            "emoji": new_list.emoji.as_deref().unwrap_or_default(),
        }))?
        .with_server_timestamp("createdAt");

        self.store.insert(LISTS, document).await?.decode()
    }

    pub async fn update(&self, id: &str, patch: ListPatch) -> StoreResult<()> {
        self.store.update(LISTS, id, patch.into_patch()).await
    }

    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store.delete(LISTS, id).await
    }
}
