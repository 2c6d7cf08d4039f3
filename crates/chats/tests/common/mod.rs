#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use tokio::sync::{oneshot, Notify};

use duo_auth::{AllowList, Identity, Session};
use duo_chats::{Collections, CollectionsSnapshot, FeedSnapshot, MessageFeed, NewMessage};
use duo_config::{CollectionsConfig, FeedConfig};
use duo_store::{
    Document, DocumentStore, MemoryObjectStorage, MemoryStore, NewDocument, ObjectStorage, Patch, Query,
    StorageResult, StoreError, StoreResult, Subscription,
};

pub const WAIT: Duration = Duration::from_secs(2);

mock! {
    pub Objects {}

    #[async_trait]
    impl ObjectStorage for Objects {
        async fn put(&self, path: &str, bytes: Bytes, content_type: &str) -> StorageResult<String>;
    }
}

pub fn identity(name: &str) -> Identity {
    Identity::parse(name).expect("valid identity")
}

pub fn sign_in(name: &str) -> Session {
    Session::sign_in(identity(name), &AllowList::new(["alice", "bob"])).expect("permitted")
}

pub fn feed_config(page_size: usize) -> FeedConfig {
    FeedConfig { page_size }
}

pub fn collections_config() -> CollectionsConfig {
    CollectionsConfig::default()
}

/// Memory store wrapper that counts reads and can be told to fail some of them.
pub struct InstrumentedStore {
    pub inner: Arc<MemoryStore>,
    queries: AtomicUsize,
    gets: AtomicUsize,
    failing_queries: AtomicBool,
    held_query: Mutex<Option<oneshot::Receiver<()>>>,
    query_held: Notify,
    failing_gets: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    failing_inserts: Mutex<HashSet<String>>,
}

impl InstrumentedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryStore::new()),
            queries: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            failing_queries: AtomicBool::new(false),
            held_query: Mutex::new(None),
            query_held: Notify::new(),
            failing_gets: Mutex::new(HashSet::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            failing_inserts: Mutex::new(HashSet::new()),
        })
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing_queries.store(failing, Ordering::SeqCst);
    }

    /// Park the next query until the returned sender fires or is dropped.
    pub fn hold_next_query(&self) -> oneshot::Sender<()> {
        let (release, held) = oneshot::channel();
        *self.held_query.lock().unwrap() = Some(held);
        release
    }

    /// Resolves once a query is parked by [`Self::hold_next_query`].
    pub async fn query_parked(&self) {
        tokio::time::timeout(WAIT, self.query_held.notified())
            .await
            .expect("no query was parked in time");
    }

    pub fn fail_get(&self, id: &str) {
        self.failing_gets.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_inserts_into(&self, collection: &str) {
        self.failing_inserts.lock().unwrap().insert(collection.to_string());
    }

    fn offline() -> StoreError {
        StoreError::ConnectionError("simulated outage".to_string())
    }
}

#[async_trait]
impl DocumentStore for InstrumentedStore {
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let held = self.held_query.lock().unwrap().take();
        if let Some(held) = held {
            self.query_held.notify_one();
            let _ = held.await;
        }
        if self.failing_queries.load(Ordering::SeqCst) {
            return Err(Self::offline());
        }
        self.inner.query(query).await
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        self.inner.subscribe(query).await
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.lock().unwrap().contains(id) {
            return Err(Self::offline());
        }
        self.inner.get(collection, id).await
    }

    async fn insert(&self, collection: &str, document: NewDocument) -> StoreResult<Document> {
        if self.failing_inserts.lock().unwrap().contains(collection) {
            return Err(Self::offline());
        }
        self.inner.insert(collection, document).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Patch) -> StoreResult<()> {
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        if self.failing_deletes.lock().unwrap().contains(id) {
            return Err(Self::offline());
        }
        self.inner.delete(collection, id).await
    }
}

/// Insert `count` text messages from `sender` straight into the store.
pub async fn seed_messages(store: &dyn DocumentStore, sender: &str, count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for index in 0..count {
        let message = NewMessage::text(identity(sender), format!("message {index}"));
        let document = store
            .insert("messages", message.into_document())
            .await
            .expect("seed insert");
        ids.push(document.id);
    }
    ids
}

pub async fn open_feed(
    session: &Session,
    store: Arc<dyn DocumentStore>,
    page_size: usize,
) -> MessageFeed {
    MessageFeed::activate(
        session.clone(),
        store,
        Arc::new(MemoryObjectStorage::new()),
        &feed_config(page_size),
    )
    .await
    .expect("feed activates")
}

pub async fn open_collections(session: &Session, store: Arc<dyn DocumentStore>) -> Collections {
    Collections::activate(session.clone(), store, &collections_config())
        .await
        .expect("collections activate")
}

/// Wait until the feed publishes a state matching `condition`.
pub async fn wait_for_feed(feed: &MessageFeed, condition: impl Fn(&FeedSnapshot) -> bool) -> FeedSnapshot {
    let mut updates = feed.updates();
    let snapshot = tokio::time::timeout(WAIT, updates.wait_for(|snapshot| condition(snapshot)))
        .await
        .expect("feed did not reach the expected state in time")
        .expect("feed stopped publishing")
        .clone();
    snapshot
}

/// Wait until the collections engine publishes a state matching `condition`.
pub async fn wait_for_collections(
    collections: &Collections,
    condition: impl Fn(&CollectionsSnapshot) -> bool,
) -> CollectionsSnapshot {
    let mut updates = collections.updates();
    let snapshot = tokio::time::timeout(WAIT, updates.wait_for(|snapshot| condition(snapshot)))
        .await
        .expect("collections did not reach the expected state in time")
        .expect("collections stopped publishing")
        .clone();
    snapshot
}

/// Poll until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition did not hold in time");
}

pub fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"not really an image");
    bytes
}
