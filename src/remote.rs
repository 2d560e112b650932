//! The device client as seen by a front-end: status, endpoint management and
//! playback commands behind one object.

use reqwest::Client;
use std::{path::Path, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};

use crate::command::{CommandClient, CommandResult};
use crate::config::AppConfig;
use crate::endpoint::{EndpointStorage, EndpointStore, FileEndpointStorage};
use crate::episode::translate_episode_id;
use crate::error::{RemoteError, Result};
use crate::health::{HealthPoller, HealthSnapshot, HealthStatus};

const USER_AGENT: &str = concat!("pi-remote/", env!("CARGO_PKG_VERSION"));

/// Remote control for a single playback device.
pub struct RaspberryRemote {
    endpoint: Arc<EndpointStore>,
    health: Arc<HealthPoller>,
    commands: CommandClient,
}

impl RaspberryRemote {
    /// Build the client stack on top of the given endpoint storage.
    pub fn new(config: &AppConfig, storage: Arc<dyn EndpointStorage>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(RemoteError::HttpClient)?;

        let endpoint = Arc::new(EndpointStore::new(storage));
        let health = Arc::new(HealthPoller::new(
            endpoint.clone(),
            http.clone(),
            &config.health,
        ));
        let commands = CommandClient::new(endpoint.clone(), http, &config.commands);

        Ok(Self {
            endpoint,
            health,
            commands,
        })
    }

    /// Build a client whose endpoint lives in the configuration file itself.
    pub fn from_config_file<P: AsRef<Path>>(config_path: P, config: &AppConfig) -> Result<Self> {
        Self::new(config, Arc::new(FileEndpointStorage::new(config_path)))
    }

    pub fn endpoint(&self) -> &Arc<EndpointStore> {
        &self.endpoint
    }

    pub fn commands(&self) -> &CommandClient {
        &self.commands
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.health.subscribe()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub fn status(&self) -> HealthStatus {
        self.health.status()
    }

    pub async fn base_url(&self) -> Option<String> {
        self.endpoint.base_url().await
    }

    pub async fn refresh(&self) -> HealthSnapshot {
        self.health.refresh().await
    }

    /// Store a new endpoint and immediately re-poll it.
    pub async fn set_endpoint(&self, raw: &str) -> Result<String> {
        let normalized = self.endpoint.set_base_url(raw).await?;
        self.health.refresh().await;
        Ok(normalized)
    }

    /// Play a catalog episode (`7x01`).
    pub async fn play(&self, catalog_episode_id: &str) -> Result<()> {
        let wire_id = translate_episode_id(catalog_episode_id)?;
        self.commands.play(&wire_id).await
    }

    /// Stop playback, then refresh health so subscribers see the effect.
    pub async fn stop(&self) -> Result<CommandResult> {
        let result = self.commands.stop().await?;
        self.health.refresh().await;
        Ok(result)
    }

    pub async fn volume_up(&self) -> Result<CommandResult> {
        self.commands.volume_up().await
    }

    pub async fn volume_down(&self) -> Result<CommandResult> {
        self.commands.volume_down().await
    }

    /// Start background polling; `None` if it already ran for this remote.
    pub fn start_polling(&self) -> Option<JoinHandle<()>> {
        self.health.start()
    }

    pub fn shutdown(&self) {
        self.health.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpointStorage;
    use crate::health::HealthError;

    fn remote_with(storage: MemoryEndpointStorage) -> RaspberryRemote {
        RaspberryRemote::new(&AppConfig::default(), Arc::new(storage)).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_episode_is_rejected_before_any_request() {
        let remote = remote_with(MemoryEndpointStorage::new());
        assert!(matches!(
            remote.play("abc").await,
            Err(RemoteError::InvalidEpisodeId(_))
        ));
        assert!(matches!(remote.play("7x01").await, Err(RemoteError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_keeps_state() {
        let remote = remote_with(MemoryEndpointStorage::new());

        assert!(matches!(
            remote.set_endpoint("   ").await,
            Err(RemoteError::InvalidEndpoint(_))
        ));
        assert_eq!(remote.base_url().await, None);
        assert_eq!(remote.snapshot(), HealthSnapshot::default());
    }

    #[tokio::test]
    async fn test_refresh_without_endpoint() {
        let remote = remote_with(MemoryEndpointStorage::new());
        let snapshot = remote.refresh().await;

        assert_eq!(snapshot.error, Some(HealthError::NotConfigured));
        assert_eq!(remote.status(), HealthStatus::Red);
    }
}
