//! Duo Store Crate
//!
//! This crate provides the document store the sync engines talk to: the
//! store contract, query evaluation, live subscriptions, an in-memory and a
//! SQLite backend, and object storage for binary payloads.

use std::sync::Arc;
use std::time::Duration;

use duo_config::{StoreBackend, StoreConfig};
use tokio::task::JoinHandle;
use tracing::info;

pub mod clock;
pub mod connection;
pub mod document;
pub mod live;
pub mod memory;
pub mod migrations;
pub mod patch;
pub mod query;
pub mod sqlite;
pub mod storage;
pub mod store;
pub mod types;

pub use clock::ServerClock;
pub use connection::prepare_database;
pub use document::{Document, NewDocument};
pub use live::{Delivery, Subscription, SubscriptionHub};
pub use memory::MemoryStore;
pub use migrations::run_migrations;
pub use patch::{FieldUpdate, Patch};
pub use query::{Cursor, Direction, Filter, OrderBy, Query};
pub use sqlite::SqliteStore;
pub use storage::{FsObjectStorage, MemoryObjectStorage, ObjectStorage, StoredObject};
pub use store::DocumentStore;
pub use types::{
    errors::{StorageError, StoreError},
    DocumentId, StorageResult, StoreResult,
};

/// An opened store plus the background task keeping its live queries fresh.
pub struct StoreHandle {
    pub store: Arc<dyn DocumentStore>,
    pub refresher: Option<JoinHandle<()>>,
}

impl StoreHandle {
    /// Stop background refreshing. The store itself stays usable.
    pub fn stop_refresh(&mut self) {
        if let Some(task) = self.refresher.take() {
            task.abort();
        }
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.stop_refresh();
    }
}

/// Open the configured backend.
pub async fn initialize_store(config: &StoreConfig) -> StoreResult<StoreHandle> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory document store");
            Ok(StoreHandle {
                store: Arc::new(MemoryStore::new()),
                refresher: None,
            })
        }
        StoreBackend::Sqlite => {
            let store = Arc::new(SqliteStore::open(config).await?);
            let refresher = (config.poll_interval_ms > 0).then(|| {
                store.spawn_refresh(Duration::from_millis(config.poll_interval_ms))
            });
            info!(url = %config.url, poll_interval_ms = config.poll_interval_ms, "using sqlite document store");
            Ok(StoreHandle { store, refresher })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn initializes_memory_backend() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        let handle = initialize_store(&config).await.unwrap();
        assert!(handle.refresher.is_none());

        let created = handle
            .store
            .insert("lists", NewDocument::from_value(json!({ "title": "a" })).unwrap())
            .await
            .unwrap();
        assert!(handle.store.get("lists", &created.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn initializes_sqlite_backend_with_refresher() {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            url: format!("sqlite://{}", temp_dir.path().join("duo.db").display()),
            max_connections: 1,
            poll_interval_ms: 50,
        };

        let mut handle = initialize_store(&config).await.unwrap();
        assert!(handle.refresher.is_some());

        let created = handle
            .store
            .insert("lists", NewDocument::from_value(json!({ "title": "a" })).unwrap())
            .await
            .unwrap();
        assert!(handle.store.get("lists", &created.id).await.unwrap().is_some());

        handle.stop_refresh();
        assert!(handle.refresher.is_none());
    }
}
