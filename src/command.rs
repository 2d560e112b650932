//! Remote commands: play, stop and volume.
//!
//! Every command is a single best-effort HTTP exchange bounded by one timeout.
//! Nothing is queued, coalesced or retried; concurrent calls are independent.

use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::config::CommandConfig;
use crate::endpoint::EndpointStore;
use crate::error::{RemoteError, Result};

pub const PLAY_PATH: &str = "/play";
pub const STOP_PATH: &str = "/stop";
pub const VOLUME_UP_PATH: &str = "/volume/up";
pub const VOLUME_DOWN_PATH: &str = "/volume/down";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of `POST /play`.
#[derive(Debug, Serialize)]
struct PlayRequest<'a> {
    id: &'a str,
}

/// Outcome of a stop or volume command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    /// Response body when it was not valid JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Parsed JSON response body, if the device sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    /// Interpret the body of a successful response.
    ///
    /// An empty body means `ok`. A JSON body is kept in `data`, and its boolean
    /// `ok` field, when present, decides `ok`. Anything else is kept verbatim
    /// in `raw`.
    pub fn from_body(body: &str) -> Self {
        if body.is_empty() {
            return Self {
                ok: true,
                raw: None,
                data: None,
            };
        }

        match serde_json::from_str::<Value>(body) {
            Ok(data) => Self {
                ok: data.get("ok").and_then(Value::as_bool).unwrap_or(true),
                raw: None,
                data: Some(data),
            },
            Err(_) => Self {
                ok: true,
                raw: Some(body.to_string()),
                data: None,
            },
        }
    }
}

/// Issues commands against the configured device endpoint.
#[derive(Clone)]
pub struct CommandClient {
    endpoint: Arc<EndpointStore>,
    http: Client,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(endpoint: Arc<EndpointStore>, http: Client, settings: &CommandConfig) -> Self {
        Self {
            endpoint,
            http,
            timeout: settings.timeout(),
        }
    }

    /// Same client with a different per-command timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the device to play the episode with the given wire id (`S07E01`).
    pub async fn play(&self, episode_code: &str) -> Result<()> {
        let url = self.url_for(PLAY_PATH).await?;
        info!("Playing {} via {}", episode_code, url);

        self.bounded(PLAY_PATH, async {
            let response = self
                .http
                .post(&url)
                .json(&PlayRequest { id: episode_code })
                .send()
                .await
                .map_err(network_error(PLAY_PATH))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("Device refused to play {}: HTTP {} {}", episode_code, status, body);
                return Err(RemoteError::Playback {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(())
        })
        .await
    }

    /// Stop playback. Devices that do not accept `POST /stop` (404/405) get a
    /// single `GET /stop` instead.
    pub async fn stop(&self) -> Result<CommandResult> {
        let url = self.url_for(STOP_PATH).await?;
        info!("Stopping playback via {}", url);

        self.bounded(STOP_PATH, async {
            let mut response = self
                .http
                .post(&url)
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .send()
                .await
                .map_err(network_error(STOP_PATH))?;

            if matches!(
                response.status(),
                StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
            ) {
                debug!("POST {} answered {}, falling back to GET", url, response.status());
                response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(network_error(STOP_PATH))?;
            }

            read_result(STOP_PATH, response).await
        })
        .await
    }

    pub async fn volume_up(&self) -> Result<CommandResult> {
        self.post_command(VOLUME_UP_PATH).await
    }

    pub async fn volume_down(&self) -> Result<CommandResult> {
        self.post_command(VOLUME_DOWN_PATH).await
    }

    async fn post_command(&self, path: &'static str) -> Result<CommandResult> {
        let url = self.url_for(path).await?;
        info!("POST {}", url);

        self.bounded(path, async {
            let response = self
                .http
                .post(&url)
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .send()
                .await
                .map_err(network_error(path))?;

            read_result(path, response).await
        })
        .await
    }

    /// Resolves the endpoint at dispatch time; a later endpoint change does
    /// not affect a command already in flight.
    async fn url_for(&self, path: &str) -> Result<String> {
        let base_url = self
            .endpoint
            .base_url()
            .await
            .ok_or(RemoteError::NotConfigured)?;
        Ok(format!("{}{}", base_url, path))
    }

    /// Run a whole exchange under the command timeout. On expiry the exchange
    /// future is dropped, which aborts the in-flight request.
    async fn bounded<T, F>(&self, path: &str, exchange: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} timed out after {:?}", path, self.timeout);
                Err(RemoteError::Timeout {
                    path: path.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

async fn read_result(path: &str, response: Response) -> Result<CommandResult> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        warn!("Device rejected {}: HTTP {} {}", path, status, body);
        return Err(RemoteError::CommandRejected {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    Ok(CommandResult::from_body(&body))
}

fn network_error(path: &'static str) -> impl FnOnce(reqwest::Error) -> RemoteError {
    move |source| RemoteError::Network {
        path: path.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpointStorage;
    use tokio_test::assert_err;

    fn unconfigured_client() -> CommandClient {
        let endpoint = Arc::new(EndpointStore::new(Arc::new(MemoryEndpointStorage::new())));
        CommandClient::new(endpoint, Client::new(), &CommandConfig::default())
    }

    #[test]
    fn test_empty_body_is_ok() {
        assert_eq!(
            CommandResult::from_body(""),
            CommandResult {
                ok: true,
                raw: None,
                data: None
            }
        );
    }

    #[test]
    fn test_json_body_is_kept() {
        let result = CommandResult::from_body(r#"{"ok":true,"volume":42}"#);
        assert!(result.ok);
        assert_eq!(result.data.unwrap()["volume"], 42);

        let result = CommandResult::from_body(r#"{"ok":false,"reason":"idle"}"#);
        assert!(!result.ok);

        let result = CommandResult::from_body(r#"{"stopped":true}"#);
        assert!(result.ok);
    }

    #[test]
    fn test_text_body_is_raw() {
        let result = CommandResult::from_body("stopped");
        assert!(result.ok);
        assert_eq!(result.raw.as_deref(), Some("stopped"));
        assert_eq!(result.data, None);
    }

    #[tokio::test]
    async fn test_commands_require_endpoint() {
        let client = unconfigured_client();

        assert!(matches!(client.play("S07E01").await, Err(RemoteError::NotConfigured)));
        assert!(matches!(client.stop().await, Err(RemoteError::NotConfigured)));
        assert!(matches!(client.volume_up().await, Err(RemoteError::NotConfigured)));
        assert_err!(client.volume_down().await);
    }

    #[test]
    fn test_with_timeout_overrides_default() {
        let client = unconfigured_client();
        assert_eq!(client.timeout(), Duration::from_millis(5000));
        assert_eq!(
            client.with_timeout(Duration::from_millis(250)).timeout(),
            Duration::from_millis(250)
        );
    }
}
