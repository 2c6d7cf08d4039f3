use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "duo.toml",
    "config/duo.toml",
    "crates/config/duo.toml",
    "../duo.toml",
    "../config/duo.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub collections: CollectionsConfig,
    pub auth: AuthConfig,
}

/// Which document store backend the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    /// How often a SQLite store re-reads watched collections to pick up
    /// writes from other processes. Zero disables polling.
    #[serde(default = "StoreConfig::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl StoreConfig {
    const fn default_poll_interval() -> u64 {
        1_000
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            url: "sqlite://duo.db".to_string(),
            max_connections: 5,
            poll_interval_ms: Self::default_poll_interval(),
        }
    }
}

/// Object storage used for drawing uploads.
///
/// ```
/// use duo_config::StorageConfig;
///
/// let storage = StorageConfig::default();
/// assert_eq!(storage.root, "objects");
/// assert!(storage.public_base_url.starts_with("file://"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: String,
    #[serde(default = "StorageConfig::default_public_base_url")]
    pub public_base_url: String,
}

impl StorageConfig {
    fn default_public_base_url() -> String {
        "file://objects".to_string()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "objects".to_string(),
            public_base_url: Self::default_public_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "FeedConfig::default_page_size")]
    pub page_size: usize,
}

impl FeedConfig {
    const fn default_page_size() -> usize {
        50
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "CollectionsConfig::default_emoji")]
    pub default_emoji: String,
}

impl CollectionsConfig {
    fn default_emoji() -> String {
        "📝".to_string()
    }
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            default_emoji: Self::default_emoji(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identities allowed to sign in. An empty list admits nobody.
    #[serde(default)]
    pub allowed_identities: Vec<String>,
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use duo_config::load;
///
/// std::env::remove_var("DUO_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert_eq!(config.feed.page_size, 50);
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let max_connections = i64::from(defaults.store.max_connections);
    let page_size = i64::try_from(defaults.feed.page_size).unwrap_or(i64::MAX);
    let poll_interval = i64::try_from(defaults.store.poll_interval_ms).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("store.backend", defaults.store.backend.as_str())?
        .set_default("store.url", defaults.store.url.clone())?
        .set_default("store.max_connections", max_connections)?
        .set_default("store.poll_interval_ms", poll_interval)?
        .set_default("storage.root", defaults.storage.root.clone())?
        .set_default("storage.public_base_url", defaults.storage.public_base_url.clone())?
        .set_default("feed.page_size", page_size)?
        .set_default("collections.default_emoji", defaults.collections.default_emoji.clone())?
        .set_default("auth.allowed_identities", Vec::<String>::new())?;

    let environment_overrides = config::Environment::with_prefix("DUO")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("auth.allowed_identities")
        .try_parsing(true);

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("DUO_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via DUO_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.feed.page_size == 0 {
        config.feed.page_size = FeedConfig::default_page_size();
    }

    if config.collections.default_emoji.trim().is_empty() {
        config.collections.default_emoji = CollectionsConfig::default_emoji();
    }

    debug!(?config, "loaded client configuration");
    Ok(config)
}
