//! Message feed engine.
//!
//! Keeps a live window over the newest messages plus the older pages fetched
//! on demand. Every live delivery fully replaces the window; older pages are
//! one-shot reads that are never re-synchronized.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use duo_auth::{Identity, Session};
use duo_config::FeedConfig;
use duo_store::{Cursor, Delivery, DocumentStore, ObjectStorage, Subscription};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entities::{Message, MessageWithReply, NewMessage};
use crate::repositories::{decode_documents, MessageRepository};
use crate::types::{ChatError, ChatResult, FeedSnapshot};
use crate::utils::{decode_drawing, drawing_object_path, non_blank, with_replies};

pub struct MessageFeed {
    inner: Arc<FeedInner>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

struct FeedInner {
    session: Session,
    messages: MessageRepository,
    objects: Arc<dyn ObjectStorage>,
    page_size: usize,
    state: Mutex<FeedState>,
    updates: watch::Sender<FeedSnapshot>,
    closed: AtomicBool,
}

struct FeedState {
    /// Older pages, oldest first. Everything here is older than `window`.
    history: Vec<MessageWithReply>,
    /// Latest live delivery, oldest first.
    window: Vec<MessageWithReply>,
    cursor: Option<Cursor>,
    has_more: bool,
    /// Set as soon as an older page is requested. From then on the cursor and
    /// `has_more` describe the history, not the window, and messages leaving
    /// the window are kept.
    history_loaded: bool,
    loading: bool,
    loading_more: bool,
    error: Option<String>,
}

impl FeedState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            window: Vec::new(),
            cursor: None,
            has_more: false,
            history_loaded: false,
            loading: true,
            loading_more: false,
            error: None,
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            messages: self.history.iter().chain(&self.window).cloned().collect(),
            loading: self.loading,
            loading_more: self.loading_more,
            has_more: self.has_more,
            error: self.error.clone(),
        }
    }

    /// Apply a like change to every local copy of `id`, including copies
    /// embedded as reply targets.
    fn patch_likes(&mut self, id: &str, identity: &Identity, liked: bool) {
        for entry in self.history.iter_mut().chain(self.window.iter_mut()) {
            if entry.message.id == id {
                entry.message.set_liked(identity, liked);
            }
            if let Some(reply) = entry.reply_to_message.as_mut() {
                if reply.id == id {
                    reply.set_liked(identity, liked);
                }
            }
        }
    }
}

/// Messages of `previous` that fell out of the bottom of `window`.
fn evicted_from(previous: Vec<MessageWithReply>, window: &[MessageWithReply]) -> Vec<MessageWithReply> {
    let retained: HashSet<&str> = window.iter().map(MessageWithReply::id).collect();
    let boundary = window
        .first()
        .map(|oldest| (oldest.message.timestamp, oldest.id()));

    previous
        .into_iter()
        .filter(|entry| !retained.contains(entry.id()))
        .filter(|entry| boundary.map_or(true, |boundary| (entry.message.timestamp, entry.id()) < boundary))
        .collect()
}

impl FeedInner {
    fn publish(&self, state: &FeedState) {
        self.updates.send_replace(state.snapshot());
    }

    async fn fail(&self, error: String) {
        let mut state = self.state.lock().await;
        state.loading = false;
        state.error = Some(error);
        self.publish(&state);
    }

    async fn apply_delivery(&self, delivery: Delivery) {
        let documents = match delivery {
            Ok(documents) => documents,
            Err(error) => {
                warn!(identity = %self.session.identity(), %error, "message feed delivery failed");
                self.fail(error.to_string()).await;
                return;
            }
        };

        let delivered = documents.len();
        let batch: Vec<Message> = decode_documents(&documents);
        let oldest = batch.last().map(MessageRepository::cursor_for);
        let mut window = with_replies(&self.messages, batch).await;
        window.reverse();

        let mut state = self.state.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let previous = std::mem::take(&mut state.window);
        if state.history_loaded {
            let evicted = evicted_from(previous, &window);
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "moving messages from the live window into history");
                state.history.extend(evicted);
            }
        } else {
            state.cursor = oldest;
            state.has_more = delivered == self.page_size;
        }

        state.window = window;
        state.loading = false;
        state.error = None;
        debug!(delivered, has_more = state.has_more, "applied message feed delivery");
        self.publish(&state);
    }

    async fn run(self: Arc<Self>, mut subscription: Subscription) {
        loop {
            tokio::select! {
                _ = self.session.closed() => {
                    debug!(identity = %self.session.identity(), "session closed, stopping message feed");
                    break;
                }
                delivery = subscription.next() => match delivery {
                    Some(delivery) => self.apply_delivery(delivery).await,
                    None => {
                        self.fail("live subscription ended".to_string()).await;
                        break;
                    }
                },
            }
        }
        self.closed.store(true, Ordering::Release);
    }
}

impl MessageFeed {
    /// Open the live window for `session` and apply its first delivery.
    pub async fn activate(
        session: Session,
        store: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStorage>,
        config: &FeedConfig,
    ) -> ChatResult<Self> {
        if !session.is_active() {
            return Err(ChatError::SessionClosed);
        }

        let page_size = config.page_size.max(1);
        let state = FeedState::new();
        let (updates, _) = watch::channel(state.snapshot());
        let inner = Arc::new(FeedInner {
            session,
            messages: MessageRepository::new(store),
            objects,
            page_size,
            state: Mutex::new(state),
            updates,
            closed: AtomicBool::new(false),
        });

        let task = match inner.messages.subscribe_latest(page_size).await {
            Ok(mut subscription) => {
                if let Some(first) = subscription.next().await {
                    inner.apply_delivery(first).await;
                }
                Some(tokio::spawn(Arc::clone(&inner).run(subscription)))
            }
            Err(error) => {
                warn!(%error, "failed to open message feed subscription");
                inner.fail(error.to_string()).await;
                None
            }
        };

        info!(identity = %inner.session.identity(), page_size, "message feed activated");
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

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    /// Fetch the next page of older messages.
    ///
    /// Does nothing without a cursor, when no more history exists, or while a
    /// page is already in flight. Query failures set the feed error.
    pub async fn load_more(&self) -> ChatResult<()> {
        self.ensure_active()?;
        let page_size = self.inner.page_size;

        let cursor = {
            let mut state = self.inner.state.lock().await;
            if state.loading_more || !state.has_more {
                return Ok(());
            }
            let Some(cursor) = state.cursor.clone() else {
                return Ok(());
            };
            state.loading_more = true;
            // Deliveries racing the page must demote what they evict, or the
            // messages between the cursor and the new window are lost.
            state.history_loaded = true;
            self.inner.publish(&state);
            cursor
        };

        let page = match self.inner.messages.page_before(cursor, page_size).await {
            Ok(page) => page,
            Err(error) => {
                warn!(%error, "failed to load older messages");
                let mut state = self.inner.state.lock().await;
                state.loading_more = false;
                state.error = Some(error.to_string());
                self.inner.publish(&state);
                return Ok(());
            }
        };

        let fetched = page.len();
        let oldest = page.last().map(MessageRepository::cursor_for);
        let mut batch = with_replies(&self.inner.messages, page).await;
        batch.reverse();

        let mut state = self.inner.state.lock().await;
        if oldest.is_some() {
            state.cursor = oldest;
        }
        state.has_more = fetched == page_size;
        batch.append(&mut state.history);
        state.history = batch;
        state.loading_more = false;
        self.inner.publish(&state);

        info!(fetched, has_more = state.has_more, "loaded older messages");
        Ok(())
    }

    /// Send a text message. Blank text is ignored.
    pub async fn send_message(&self, content: &str, reply_to: Option<&str>) -> ChatResult<Option<Message>> {
        self.ensure_active()?;
        let Some(content) = non_blank(content) else {
            return Ok(None);
        };

        let message = NewMessage::text(self.inner.session.identity().clone(), content)
            .replying_to(reply_to.map(str::to_string));
        let created = self
            .inner
            .messages
            .create(message)
            .await
            .map_err(ChatError::SendFailed)?;

        info!(message_id = %created.id, sender = %created.sender_id, "sent message");
        Ok(Some(created))
    }

    /// Upload a drawing and send it as a message. An empty payload is ignored.
    ///
    /// The message is only created once the upload has produced a reference.
    pub async fn send_drawing(&self, payload: &[u8], reply_to: Option<&str>) -> ChatResult<Option<Message>> {
        self.ensure_active()?;
        let Some(drawing) = decode_drawing(payload)? else {
            return Ok(None);
        };

        let sender = self.inner.session.identity();
        let path = drawing_object_path(sender.as_str(), &drawing.extension);
        let size = drawing.bytes.len();
        let image_url = self
            .inner
            .objects
            .put(&path, drawing.bytes, &drawing.content_type)
            .await
            .map_err(ChatError::UploadFailed)?;
        debug!(path = %path, size, "uploaded drawing");

        let message = NewMessage::drawing(sender.clone(), image_url)
            .replying_to(reply_to.map(str::to_string));
        let created = self
            .inner
            .messages
            .create(message)
            .await
            .map_err(ChatError::SendFailed)?;

        info!(message_id = %created.id, sender = %created.sender_id, "sent drawing");
        Ok(Some(created))
    }

    /// Like or unlike a message as the session identity. Returns whether the
    /// message is now liked.
    pub async fn toggle_like(&self, message_id: &str) -> ChatResult<bool> {
        self.ensure_active()?;
        let identity = self.inner.session.identity();

        let current = self
            .inner
            .messages
            .find_by_id(message_id)
            .await
            .map_err(ChatError::LikeFailed)?
            .ok_or_else(|| ChatError::message_not_found(message_id))?;

        let liked = !current.is_liked_by(identity);
        let written = if liked {
            self.inner.messages.add_like(message_id, identity).await
        } else {
            self.inner.messages.remove_like(message_id, identity).await
        };
        written.map_err(|error| match error {
            duo_store::StoreError::NotFound { .. } => ChatError::message_not_found(message_id),
            other => ChatError::LikeFailed(other),
        })?;

        let mut state = self.inner.state.lock().await;
        state.patch_likes(message_id, identity, liked);
        self.inner.publish(&state);

        info!(message_id, identity = %identity, liked, "toggled like");
        Ok(liked)
    }

    /// Look a message up among the locally held ones.
    pub fn get_message_by_id(&self, id: &str) -> Option<MessageWithReply> {
        self.inner
            .updates
            .borrow()
            .messages
            .iter()
            .find(|entry| entry.id() == id)
            .cloned()
    }

    pub fn messages(&self) -> Vec<MessageWithReply> {
        self.inner.updates.borrow().messages.clone()
    }

    pub fn loading(&self) -> bool {
        self.inner.updates.borrow().loading
    }

    pub fn loading_more(&self) -> bool {
        self.inner.updates.borrow().loading_more
    }

    pub fn has_more(&self) -> bool {
        self.inner.updates.borrow().has_more
    }

    pub fn error(&self) -> Option<String> {
        self.inner.updates.borrow().error.clone()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.inner.updates.borrow().clone()
    }

    /// Receiver that observes every published state change.
    pub fn updates(&self) -> watch::Receiver<FeedSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Stop the live window. Held messages stay readable.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
            // Wait for the task to drop its subscription.
            let _ = task.await;
            info!(identity = %self.inner.session.identity(), "message feed closed");
        }
    }
}

impl Drop for MessageFeed {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
