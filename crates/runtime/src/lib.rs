use std::sync::Arc;

use anyhow::{Context, Result};
use duo_auth::{AllowList, Identity, Session};
use duo_chats::{Collections, MessageFeed};
use duo_config::{AppConfig, CollectionsConfig, FeedConfig};
use duo_store::{initialize_store, DocumentStore, FsObjectStorage, ObjectStorage, StoreHandle};
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    /// Install the global subscriber. Output goes to stderr so command output
    /// on stdout stays machine readable.
    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Everything a client process needs to open engines for a signed-in party.
pub struct ClientServices {
    store: StoreHandle,
    pub objects: Arc<dyn ObjectStorage>,
    pub authorizer: AllowList,
    pub feed: FeedConfig,
    pub collections: CollectionsConfig,
}

impl ClientServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let store = initialize_store(&config.store)
            .await
            .context("failed to open document store")?;

        let objects: Arc<dyn ObjectStorage> = Arc::new(FsObjectStorage::new(
            config.storage.root.as_str(),
            config.storage.public_base_url.clone(),
        ));
        let authorizer = AllowList::from_config(&config.auth);

        info!(
            backend = config.store.backend.as_str(),
            storage_root = %config.storage.root,
            allowed = authorizer.len(),
            "client services ready"
        );

        Ok(Self {
            store,
            objects,
            authorizer,
            feed: config.feed.clone(),
            collections: config.collections.clone(),
        })
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store.store)
    }

    /// Start a session for `identity` if the allow list admits it.
    pub fn sign_in(&self, identity: &str) -> Result<Session> {
        let identity = Identity::parse(identity).context("invalid identity")?;
        let session = Session::sign_in(identity, &self.authorizer).context("sign-in refused")?;
        info!(identity = %session.identity(), session_id = session.id(), "signed in");
        Ok(session)
    }

    pub async fn open_feed(&self, session: &Session) -> Result<MessageFeed> {
        MessageFeed::activate(session.clone(), self.store(), Arc::clone(&self.objects), &self.feed)
            .await
            .context("failed to open message feed")
    }

    pub async fn open_collections(&self, session: &Session) -> Result<Collections> {
        Collections::activate(session.clone(), self.store(), &self.collections)
            .await
            .context("failed to open collections")
    }

    /// Stop background store work. Open engines keep their current state.
    pub fn shutdown(mut self) {
        self.store.stop_refresh();
        info!("client services stopped");
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
