//! Collection engine.
//!
//! Keeps the lists visible to the session identity live and loads the items of
//! one selected list on demand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use duo_auth::Session;
use duo_config::CollectionsConfig;
use duo_store::{Delivery, DocumentStore, StoreError, Subscription};
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entities::{List, ListItemWithMessage, ListPatch, NewList};
use crate::repositories::{decode_documents, ListItemRepository, ListRepository, MessageRepository};
use crate::types::{ChatError, ChatResult, CollectionsSnapshot, ListId, Selection};
use crate::utils::{emoji_or_default, non_blank, resolve_messages};

pub struct Collections {
    inner: Arc<CollectionsInner>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

struct CollectionsInner {
    session: Session,
    lists: ListRepository,
    items: ListItemRepository,
    messages: MessageRepository,
    default_emoji: String,
    state: Mutex<CollectionsSnapshot>,
    updates: watch::Sender<CollectionsSnapshot>,
    closed: AtomicBool,
}

impl CollectionsInner {
    fn publish(&self, state: &CollectionsSnapshot) {
        self.updates.send_replace(state.clone());
    }

    async fn apply_delivery(&self, delivery: Delivery) {
        let mut state = self.state.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        match delivery {
            Ok(documents) => {
                let lists: Vec<List> = decode_documents(&documents);
                let selected = state.selection.list_id().map(str::to_string);
                if let Some(selected) = selected {
                    let was_visible = state.lists.iter().any(|list| list.id == selected);
                    let is_visible = lists.iter().any(|list| list.id == selected);
                    if was_visible && !is_visible {
                        info!(list_id = %selected, "selected list is gone, closing selection");
                        state.selection = Selection::Unselected;
                        state.pending_delete = None;
                    }
                }
                debug!(lists = lists.len(), "applied collections delivery");
                state.lists = lists;
                state.error = None;
            }
            Err(error) => {
                warn!(identity = %self.session.identity(), %error, "collections delivery failed");
                state.error = Some(error.to_string());
            }
        }
        state.loading = false;
        self.publish(&state);
    }

    async fn run(self: Arc<Self>, mut subscription: Subscription) {
        loop {
            tokio::select! {
                _ = self.session.closed() => {
                    debug!(identity = %self.session.identity(), "session closed, stopping collections");
                    break;
                }
                delivery = subscription.next() => match delivery {
                    Some(delivery) => self.apply_delivery(delivery).await,
                    None => {
                        self.apply_delivery(Err(StoreError::SubscriptionClosed)).await;
                        break;
                    }
                },
            }
        }
        self.closed.store(true, Ordering::Release);
    }
}

impl Collections {
    /// Open the live list query for `session` and apply its first delivery.
    pub async fn activate(
        session: Session,
        store: Arc<dyn DocumentStore>,
        config: &CollectionsConfig,
    ) -> ChatResult<Self> {
        if !session.is_active() {
            return Err(ChatError::SessionClosed);
        }

        let state = CollectionsSnapshot::default();
        let (updates, _) = watch::channel(state.clone());
        let inner = Arc::new(CollectionsInner {
            session,
            lists: ListRepository::new(Arc::clone(&store)),
            items: ListItemRepository::new(Arc::clone(&store)),
            messages: MessageRepository::new(store),
            default_emoji: config.default_emoji.clone(),
            state: Mutex::new(state),
            updates,
            closed: AtomicBool::new(false),
        });

        let task = match inner.lists.subscribe_visible(inner.session.identity()).await {
            Ok(mut subscription) => {
                if let Some(first) = subscription.next().await {
                    inner.apply_delivery(first).await;
                }
                Some(tokio::spawn(Arc::clone(&inner).run(subscription)))
            }
            Err(error) => {
                warn!(%error, "failed to open collections subscription");
                inner.apply_delivery(Err(error)).await;
                None
            }
        };

        info!(identity = %inner.session.identity(), "collections activated");
        Ok(Self {
            inner,
            task: StdMutex::new(task),
        })
    }

    fn ensure_active(&self) -> ChatResult<()> {
        if self.inner.closed.load(Ordering::Acquire) || !self.inner.session.is_active() {
            return Err(ChatError::SessionClosed);
        }
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Create a list owned by the session identity. A blank name is ignored.
    pub async fn create_list(&self, new_list: NewList) -> ChatResult<Option<ListId>> {
        self.ensure_active()?;
        let Some(name) = non_blank(&new_list.name) else {
            return Ok(None);
        };

        let emoji = emoji_or_default(new_list.emoji.as_deref(), &self.inner.default_emoji);
        let normalized = NewList {
            name: name.to_string(),
            emoji: Some(emoji.to_string()),
            ..new_list
        };

        let list = self
            .inner
            .lists
            .create(self.inner.session.identity(), &normalized)
            .await
            .map_err(ChatError::CreateListFailed)?;

        info!(list_id = %list.id, name = %list.name, visibility = list.visibility.as_str(), "created list");
        Ok(Some(list.id))
    }

    /// Create a list and put `message_id` in it.
    pub async fn create_list_with_message(&self, new_list: NewList, message_id: &str) -> ChatResult<Option<ListId>> {
        let Some(list_id) = self.create_list(new_list).await? else {
            return Ok(None);
        };
        self.add_message_to_list(&list_id, message_id).await?;
        Ok(Some(list_id))
    }

    /// Apply a partial update. Blank names are dropped and a blank emoji
    /// resets to the default glyph.
    pub async fn update_list(&self, list_id: &str, patch: ListPatch) -> ChatResult<()> {
        self.ensure_active()?;
        let patch = ListPatch {
            name: patch.name.as_deref().and_then(non_blank).map(str::to_string),
            emoji: patch
                .emoji
                .as_deref()
                .map(|emoji| emoji_or_default(Some(emoji), &self.inner.default_emoji).to_string()),
            ..patch
        };
        if patch.is_empty() {
            return Ok(());
        }

        self.inner
            .lists
            .update(list_id, patch)
            .await
            .map_err(ChatError::UpdateListFailed)?;

        info!(list_id, "updated list");
        Ok(())
    }

    /// Delete a list after all of its items. The list is kept when any item
    /// could not be deleted.
    pub async fn delete_list(&self, list_id: &str) -> ChatResult<()> {
        self.ensure_active()?;

        let items = self
            .inner
            .items
            .find_by_list(list_id)
            .await
            .map_err(ChatError::DeleteListFailed)?;

        let results = join_all(items.iter().map(|item| self.inner.items.delete(&item.id))).await;
        let failures: Vec<StoreError> = results.into_iter().filter_map(Result::err).collect();
        if let Some(first) = failures.into_iter().next() {
            warn!(list_id, items = items.len(), "keeping list because some items could not be deleted");
            return Err(ChatError::DeleteListFailed(first));
        }

        self.inner
            .lists
            .delete(list_id)
            .await
            .map_err(ChatError::DeleteListFailed)?;

        let mut state = self.inner.state.lock().await;
        if state.selection.list_id() == Some(list_id) {
            state.selection = Selection::Unselected;
            state.pending_delete = None;
        }
        if state.pending_delete.as_deref() == Some(list_id) {
            state.pending_delete = None;
        }
        self.inner.publish(&state);

        info!(list_id, items = items.len(), "deleted list");
        Ok(())
    }

    /// Add a message to a list. Adding a member twice does nothing.
    pub async fn add_message_to_list(&self, list_id: &str, message_id: &str) -> ChatResult<()> {
        self.ensure_active()?;

        let existing = self
            .inner
            .items
            .find_membership(list_id, message_id)
            .await
            .map_err(ChatError::AddToListFailed)?;
        if !existing.is_empty() {
            debug!(list_id, message_id, "message already in list");
            return Ok(());
        }

        let item = self
            .inner
            .items
            .create(list_id, message_id)
            .await
            .map_err(ChatError::AddToListFailed)?;

        info!(list_id, message_id, item_id = %item.id, "added message to list");
        self.refresh_if_selected(list_id).await;
        Ok(())
    }

    /// Remove every item linking `message_id` into `list_id`.
    pub async fn remove_from_list(&self, list_id: &str, message_id: &str) -> ChatResult<()> {
        self.ensure_active()?;

        let matching = self
            .inner
            .items
            .find_membership(list_id, message_id)
            .await
            .map_err(ChatError::RemoveFromListFailed)?;

        let results = join_all(matching.iter().map(|item| self.inner.items.delete(&item.id))).await;
        let removed = results.iter().filter(|result| result.is_ok()).count();
        let first_failure = results.into_iter().find_map(Result::err);

        if removed > 0 {
            info!(list_id, message_id, removed, "removed message from list");
            self.refresh_if_selected(list_id).await;
        }
        match first_failure {
            Some(error) => Err(ChatError::RemoveFromListFailed(error)),
            None => Ok(()),
        }
    }

    /// Flip the completed flag of an item. Returns the new value.
    pub async fn toggle_item_completed(&self, item_id: &str) -> ChatResult<bool> {
        self.ensure_active()?;

        let item = self
            .inner
            .items
            .find_by_id(item_id)
            .await
            .map_err(ChatError::ToggleCompletedFailed)?
            .ok_or_else(|| ChatError::item_not_found(item_id))?;

        let completed = !item.completed;
        self.inner
            .items
            .set_completed(item_id, completed)
            .await
            .map_err(|error| match error {
                StoreError::NotFound { .. } => ChatError::item_not_found(item_id),
                other => ChatError::ToggleCompletedFailed(other),
            })?;

        info!(item_id, list_id = %item.list_id, completed, "toggled list item");
        self.refresh_if_selected(&item.list_id).await;
        Ok(completed)
    }

    /// Items of a list with their messages resolved, most recently added first.
    pub async fn get_list_items(&self, list_id: &str) -> ChatResult<Vec<ListItemWithMessage>> {
        let items = self
            .inner
            .items
            .find_by_list(list_id)
            .await
            .map_err(ChatError::ListItemsFailed)?;

        let table = resolve_messages(
            &self.inner.messages,
            items.iter().map(|item| item.message_id.as_str()),
        )
        .await;

        Ok(items
            .into_iter()
            .map(|item| {
                let message = table.get(&item.message_id).cloned();
                ListItemWithMessage { item, message }
            })
            .collect())
    }

    /// Open a list and load its items.
    pub async fn select(&self, list_id: &str) -> ChatResult<()> {
        self.ensure_active()?;
        {
            let mut state = self.inner.state.lock().await;
            state.selection = Selection::Selected {
                list_id: list_id.to_string(),
                items: Vec::new(),
                loading: true,
                error: None,
            };
            self.inner.publish(&state);
        }
        self.load_selection(list_id).await
    }

    pub async fn close_selection(&self) {
        let mut state = self.inner.state.lock().await;
        state.selection = Selection::Unselected;
        self.inner.publish(&state);
    }

    async fn load_selection(&self, list_id: &str) -> ChatResult<()> {
        let result = self.get_list_items(list_id).await;

        let mut state = self.inner.state.lock().await;
        if let Selection::Selected {
            list_id: selected,
            items,
            loading,
            error,
        } = &mut state.selection
        {
            // The selection may have moved on while the items were loading.
            if selected.as_str() == list_id {
                match &result {
                    Ok(loaded) => {
                        *items = loaded.clone();
                        *error = None;
                    }
                    Err(failure) => *error = Some(failure.to_string()),
                }
                *loading = false;
            }
        }
        self.inner.publish(&state);

        result.map(|_| ())
    }

    async fn refresh_if_selected(&self, list_id: &str) {
        let selected = self.inner.state.lock().await.selection.list_id() == Some(list_id);
        if selected {
            if let Err(error) = self.load_selection(list_id).await {
                warn!(list_id, %error, "failed to refresh selected list");
            }
        }
    }

    /// Ask for confirmation before deleting `list_id`.
    pub async fn request_delete(&self, list_id: &str) {
        let mut state = self.inner.state.lock().await;
        state.pending_delete = Some(list_id.to_string());
        self.inner.publish(&state);
    }

    pub async fn cancel_delete(&self) {
        let mut state = self.inner.state.lock().await;
        state.pending_delete = None;
        self.inner.publish(&state);
    }

    /// Delete the list awaiting confirmation, if any. The request stays
    /// pending when the deletion fails.
    pub async fn confirm_delete(&self) -> ChatResult<()> {
        let pending = self.inner.state.lock().await.pending_delete.clone();
        match pending {
            Some(list_id) => self.delete_list(&list_id).await,
            None => Ok(()),
        }
    }

    pub fn lists(&self) -> Vec<List> {
        self.inner.updates.borrow().lists.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.updates.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.updates.borrow().error.clone()
    }

    pub fn selection(&self) -> Selection {
        self.inner.updates.borrow().selection.clone()
    }

    pub fn pending_delete(&self) -> Option<ListId> {
        self.inner.updates.borrow().pending_delete.clone()
    }

    pub fn snapshot(&self) -> CollectionsSnapshot {
        self.inner.updates.borrow().clone()
    }

    pub fn updates(&self) -> watch::Receiver<CollectionsSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Stop the live list query.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            info!(identity = %self.inner.session.identity(), "collections closed");
        }
    }
}

impl Drop for Collections {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
