//! Persisted device endpoint.
//!
//! The endpoint is a normalized `scheme://host[:port]` string. It is read from
//! storage at most once per [`EndpointStore`] and afterwards only changes
//! through [`EndpointStore::set_base_url`] or [`EndpointStore::clear`].

use anyhow::Context;
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::{RemoteError, Result};

/// Normalize user input (manual entry or a scanned QR payload) into
/// `scheme://host[:port]`.
///
/// Input without a scheme is assumed to be `http`. Paths, queries, fragments
/// and credentials are dropped; default ports are elided.
pub fn normalize_endpoint(input: &str) -> Result<String> {
    let invalid = || RemoteError::InvalidEndpoint(input.to_string());

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&candidate).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(invalid)?;

    let mut normalized = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }

    Ok(normalized)
}

/// `true` when the string starts with an RFC 3986 scheme followed by `://`.
fn has_scheme(input: &str) -> bool {
    let Some(idx) = input.find("://") else {
        return false;
    };
    let scheme = &input[..idx];

    scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Persistent key holding the raw endpoint string.
#[async_trait]
pub trait EndpointStorage: Send + Sync {
    /// Read the stored endpoint, `None` when nothing was ever saved.
    async fn load(&self) -> anyhow::Result<Option<String>>;

    /// Replace the stored endpoint; `None` removes it.
    async fn save(&self, base_url: Option<&str>) -> anyhow::Result<()>;
}

/// Stores the endpoint as `[device] base_url` in the TOML configuration file,
/// leaving the other sections untouched.
#[derive(Debug, Clone)]
pub struct FileEndpointStorage {
    config_path: PathBuf,
}

impl FileEndpointStorage {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    async fn read_config(&self) -> anyhow::Result<Option<AppConfig>> {
        match tokio::fs::read_to_string(&self.config_path).await {
            Ok(content) => {
                let config = AppConfig::from_toml_str(&content).with_context(|| {
                    format!("Failed to parse config file: {}", self.config_path.display())
                })?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to read config file: {}", self.config_path.display())
            }),
        }
    }
}

#[async_trait]
impl EndpointStorage for FileEndpointStorage {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .read_config()
            .await?
            .and_then(|config| config.device.base_url))
    }

    async fn save(&self, base_url: Option<&str>) -> anyhow::Result<()> {
        let mut config = self.read_config().await?.unwrap_or_default();
        config.device.base_url = base_url.map(str::to_string);

        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        tokio::fs::write(&self.config_path, config.to_toml_string()?)
            .await
            .with_context(|| {
                format!("Failed to write config file: {}", self.config_path.display())
            })?;

        Ok(())
    }
}

/// In-process storage, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryEndpointStorage {
    value: Mutex<Option<String>>,
    loads: AtomicUsize,
}

impl MemoryEndpointStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of times [`EndpointStorage::load`] was called.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> Option<String> {
        self.value.lock().map(|guard| guard.clone()).unwrap_or(None)
    }
}

#[async_trait]
impl EndpointStorage for MemoryEndpointStorage {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let guard = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("endpoint storage lock poisoned"))?;
        Ok(guard.clone())
    }

    async fn save(&self, base_url: Option<&str>) -> anyhow::Result<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("endpoint storage lock poisoned"))?;
        *guard = base_url.map(str::to_string);
        Ok(())
    }
}

/// Owns the device endpoint for the lifetime of the application.
///
/// Constructed once at startup and shared by reference (`Arc`) with the
/// health poller and the command client.
pub struct EndpointStore {
    storage: Arc<dyn EndpointStorage>,
    /// `None` until the first load completed; then the cached endpoint.
    cached: RwLock<Option<Option<String>>>,
}

impl EndpointStore {
    pub fn new(storage: Arc<dyn EndpointStorage>) -> Self {
        Self {
            storage,
            cached: RwLock::new(None),
        }
    }

    /// Current endpoint, loading it from storage on the first call.
    ///
    /// A failed read or a stored value that does not normalize yields `None`
    /// and still counts as loaded. Concurrent first calls may both hit storage;
    /// whichever finishes first populates the cache.
    pub async fn base_url(&self) -> Option<String> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            return cached.clone();
        }

        let loaded = match self.storage.load().await {
            Ok(Some(raw)) => match normalize_endpoint(&raw) {
                Ok(normalized) => Some(normalized),
                Err(e) => {
                    warn!("Ignoring stored device endpoint: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load device endpoint: {:#}", e);
                None
            }
        };
        debug!("Device endpoint loaded: {:?}", loaded);

        self.cached.write().await.get_or_insert(loaded).clone()
    }

    /// Normalize, persist, then cache `input`.
    ///
    /// On any failure the cached and stored values are left as they were.
    pub async fn set_base_url(&self, input: &str) -> Result<String> {
        let normalized = normalize_endpoint(input)?;

        self.storage.save(Some(&normalized)).await?;
        *self.cached.write().await = Some(Some(normalized.clone()));

        info!("Device endpoint set to {}", normalized);
        Ok(normalized)
    }

    /// Remove the endpoint from storage and cache.
    pub async fn clear(&self) -> Result<()> {
        self.storage.save(None).await?;
        *self.cached.write().await = Some(None);

        info!("Device endpoint cleared");
        Ok(())
    }
}
