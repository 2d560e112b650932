//! Health polling of the playback device.
//!
//! Every poll, whether from the timer, the first start-up tick or an explicit
//! refresh, goes through [`probe_health`] and produces a fresh
//! [`HealthSnapshot`]. Snapshots are never mutated; the poller swaps the held
//! one atomically. Polls are not serialized: when a timer tick and a manual
//! refresh overlap, the one that completes last wins.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::HealthConfig;
use crate::endpoint::EndpointStore;
use crate::logging::log_health_change;

pub const HEALTH_PATH: &str = "/health";

/// Tri-state device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Reachable and reporting `ok: true`.
    Green,
    /// Reachable, but the answer was malformed or not healthy.
    Yellow,
    /// Unreachable, timed out or not configured.
    Red,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        }
    }

    /// Human-readable label for status badges.
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Green => "Connected",
            HealthStatus::Yellow => "Degraded",
            HealthStatus::Red => "Disconnected",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a poll did not yield a usable health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthError {
    NotConfigured,
    InvalidJson,
    RequestFailed,
}

impl fmt::Display for HealthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthError::NotConfigured => "not_configured",
            HealthError::InvalidJson => "invalid_json",
            HealthError::RequestFailed => "request_failed",
        })
    }
}

/// One immutable sample of device status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    /// Raw `ok` flag reported by the device.
    pub ok: bool,
    pub running: bool,
    /// What the device is currently playing, if anything.
    pub playing: Option<String>,
    /// Device-reported sample time (`ts`).
    pub timestamp: Option<f64>,
    pub error: Option<HealthError>,
    /// Endpoint this sample was taken against.
    pub base_url: Option<String>,
}

impl Default for HealthSnapshot {
    /// The value held before the first poll completes.
    fn default() -> Self {
        Self {
            status: HealthStatus::Red,
            ok: false,
            running: false,
            playing: None,
            timestamp: None,
            error: None,
            base_url: None,
        }
    }
}

impl HealthSnapshot {
    fn failed(base_url: Option<String>, status: HealthStatus, error: HealthError) -> Self {
        Self {
            status,
            error: Some(error),
            base_url,
            ..Self::default()
        }
    }

    /// Reduce an HTTP answer from `/health` into a snapshot.
    pub fn from_response(base_url: &str, http_ok: bool, body: &str) -> Self {
        let base_url = Some(base_url.to_string());

        let json: Value = match serde_json::from_str(body) {
            Ok(json) => json,
            Err(_) => {
                return Self::failed(base_url, HealthStatus::Yellow, HealthError::InvalidJson)
            }
        };

        let ok = matches!(json.get("ok"), Some(Value::Bool(true)));
        let status = if http_ok && ok {
            HealthStatus::Green
        } else {
            HealthStatus::Yellow
        };

        Self {
            status,
            ok,
            running: json.get("running").is_some_and(is_truthy),
            playing: match json.get("playing") {
                None | Some(Value::Null) => None,
                Some(Value::String(title)) => Some(title.clone()),
                Some(other) => Some(other.to_string()),
            },
            timestamp: json.get("ts").and_then(Value::as_f64),
            error: None,
            base_url,
        }
    }

    /// Device sample time as a UTC instant. `ts` is Unix seconds; values too
    /// large for seconds are read as milliseconds.
    pub fn sampled_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp.filter(|ts| ts.is_finite() && *ts >= 0.0)?;
        let millis = if ts >= 1e12 { ts } else { ts * 1000.0 };
        DateTime::<Utc>::from_timestamp_millis(millis as i64)
    }

    /// A stop command only makes sense while something is playing.
    pub fn can_stop(&self) -> bool {
        self.running || self.playing.is_some()
    }
}

/// JavaScript-style truthiness, which is how the device's loosely typed
/// `running` flag is meant to be read.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Take one health sample. Never fails: every problem is folded into the
/// snapshot's `status` and `error`.
pub async fn probe_health(
    http: &Client,
    base_url: Option<&str>,
    timeout: Duration,
) -> HealthSnapshot {
    let Some(base_url) = base_url else {
        return HealthSnapshot::failed(None, HealthStatus::Red, HealthError::NotConfigured);
    };

    let url = format!("{}{}", base_url, HEALTH_PATH);
    let exchange = async {
        let response = http.get(&url).send().await?;
        let http_ok = response.status().is_success();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((http_ok, body))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok((http_ok, body))) => HealthSnapshot::from_response(base_url, http_ok, &body),
        Ok(Err(e)) => {
            debug!("Health request to {} failed: {}", url, e);
            HealthSnapshot::failed(
                Some(base_url.to_string()),
                HealthStatus::Red,
                HealthError::RequestFailed,
            )
        }
        Err(_) => {
            debug!("Health request to {} timed out after {:?}", url, timeout);
            HealthSnapshot::failed(
                Some(base_url.to_string()),
                HealthStatus::Red,
                HealthError::RequestFailed,
            )
        }
    }
}

/// Periodically samples device health and publishes snapshots to subscribers.
pub struct HealthPoller {
    endpoint: Arc<EndpointStore>,
    http: Client,
    timeout: Duration,
    interval: Duration,
    snapshot_tx: watch::Sender<HealthSnapshot>,
    started: AtomicBool,
    /// Token to signal the polling task to stop.
    cancel_token: CancellationToken,
}

impl HealthPoller {
    pub fn new(endpoint: Arc<EndpointStore>, http: Client, settings: &HealthConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(HealthSnapshot::default());

        Self {
            endpoint,
            http,
            timeout: settings.timeout(),
            interval: settings.poll_interval(),
            snapshot_tx,
            started: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Last produced snapshot, or the initial red one before the first poll.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn status(&self) -> HealthStatus {
        self.snapshot_tx.borrow().status
    }

    /// Receive every snapshot that replaces the held one.
    pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Poll right now and publish the result.
    pub async fn refresh(&self) -> HealthSnapshot {
        let base_url = self.endpoint.base_url().await;
        let snapshot = probe_health(&self.http, base_url.as_deref(), self.timeout).await;

        let previous = self.snapshot_tx.send_replace(snapshot.clone());
        log_health_change(&previous, &snapshot);

        snapshot
    }

    /// Spawn the polling loop. The first poll runs immediately, then once per
    /// interval until [`HealthPoller::stop`] is called.
    ///
    /// A poller runs at most one loop in its lifetime: returns `None` when the
    /// loop was already started or the poller has been stopped.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.cancel_token.is_cancelled() || self.started.swap(true, Ordering::SeqCst) {
            debug!("Health poller already started or stopped, not spawning another loop");
            return None;
        }

        let poller = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(poller.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Health poller started (every {:?})", poller.interval);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = poller.refresh() => {}
                }
            }

            info!("Health poller stopped");
        }))
    }

    /// Stop the polling loop; an in-flight poll is abandoned.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpointStorage;

    const BASE: &str = "http://10.1.35.27:5050";

    fn unconfigured_poller(poll_interval_secs: u64) -> Arc<HealthPoller> {
        let endpoint = Arc::new(EndpointStore::new(Arc::new(MemoryEndpointStorage::new())));
        let settings = HealthConfig {
            timeout_ms: 3500,
            poll_interval_secs,
        };
        Arc::new(HealthPoller::new(endpoint, Client::new(), &settings))
    }

    #[test]
    fn test_initial_snapshot() {
        let snapshot = HealthSnapshot::default();
        assert_eq!(snapshot.status, HealthStatus::Red);
        assert!(!snapshot.ok);
        assert!(!snapshot.running);
        assert_eq!(snapshot.playing, None);
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn test_healthy_response_is_green() {
        let snapshot = HealthSnapshot::from_response(
            BASE,
            true,
            r#"{"ok":true,"running":true,"playing":"S07E01","ts":1718000000.5}"#,
        );

        assert_eq!(snapshot.status, HealthStatus::Green);
        assert!(snapshot.ok);
        assert!(snapshot.running);
        assert_eq!(snapshot.playing.as_deref(), Some("S07E01"));
        assert_eq!(snapshot.timestamp, Some(1718000000.5));
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.base_url.as_deref(), Some(BASE));
    }

    #[test]
    fn test_http_error_with_json_is_yellow_without_error() {
        let snapshot = HealthSnapshot::from_response(BASE, false, r#"{"ok":false}"#);
        assert_eq!(snapshot.status, HealthStatus::Yellow);
        assert_eq!(snapshot.error, None);

        let snapshot = HealthSnapshot::from_response(BASE, false, r#"{"ok":true}"#);
        assert_eq!(snapshot.status, HealthStatus::Yellow);
        assert!(snapshot.ok);
    }

    #[test]
    fn test_ok_must_be_boolean_true() {
        for body in [r#"{"ok":"true"}"#, r#"{"ok":1}"#, "{}", "null", "42", "[]"] {
            let snapshot = HealthSnapshot::from_response(BASE, true, body);
            assert_eq!(snapshot.status, HealthStatus::Yellow, "body {body}");
            assert!(!snapshot.ok);
            assert_eq!(snapshot.error, None);
        }
    }

    #[test]
    fn test_malformed_body_is_invalid_json() {
        for body in ["<html>busy</html>", "", "{\"ok\":"] {
            let snapshot = HealthSnapshot::from_response(BASE, true, body);
            assert_eq!(snapshot.status, HealthStatus::Yellow);
            assert_eq!(snapshot.error, Some(HealthError::InvalidJson));
            assert!(!snapshot.running);
            assert_eq!(snapshot.playing, None);
        }
    }

    #[test]
    fn test_loose_field_types() {
        let snapshot = HealthSnapshot::from_response(
            BASE,
            true,
            r#"{"ok":true,"running":1,"playing":42,"ts":"yesterday"}"#,
        );
        assert!(snapshot.running);
        assert_eq!(snapshot.playing.as_deref(), Some("42"));
        assert_eq!(snapshot.timestamp, None);

        let snapshot =
            HealthSnapshot::from_response(BASE, true, r#"{"ok":true,"running":"","playing":null}"#);
        assert!(!snapshot.running);
        assert!(!snapshot.can_stop());
    }

    #[test]
    fn test_snapshot_serializes_for_ui() {
        let snapshot = HealthSnapshot::from_response(BASE, true, "oops");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "yellow");
        assert_eq!(json["error"], "invalid_json");
        assert_eq!(json["baseUrl"], BASE);
    }

    #[test]
    fn test_sampled_at_accepts_seconds_and_millis() {
        let mut snapshot =
            HealthSnapshot::from_response(BASE, true, r#"{"ok":true,"ts":1700000000}"#);
        let expected = DateTime::<Utc>::from_timestamp(1_700_000_000, 0);
        assert_eq!(snapshot.sampled_at(), expected);

        snapshot.timestamp = Some(1_700_000_000_000.0);
        assert_eq!(snapshot.sampled_at(), expected);

        snapshot.timestamp = None;
        assert_eq!(snapshot.sampled_at(), None);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(HealthStatus::Green.label(), "Connected");
        assert_eq!(HealthStatus::Yellow.label(), "Degraded");
        assert_eq!(HealthStatus::Red.label(), "Disconnected");
        assert_eq!(HealthStatus::Yellow.to_string(), "yellow");
    }

    #[tokio::test]
    async fn test_probe_without_endpoint_is_not_configured() {
        let snapshot = probe_health(&Client::new(), None, Duration::from_millis(10)).await;
        assert_eq!(snapshot.status, HealthStatus::Red);
        assert_eq!(snapshot.error, Some(HealthError::NotConfigured));
        assert_eq!(snapshot.base_url, None);
    }

    #[tokio::test]
    async fn test_refresh_notifies_subscribers() {
        let poller = unconfigured_poller(10);
        let mut rx = poller.subscribe();

        let snapshot = poller.refresh().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), snapshot);
        assert_eq!(poller.snapshot().error, Some(HealthError::NotConfigured));
        assert_eq!(poller.status(), HealthStatus::Red);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_loop_ticks_until_stopped() {
        let poller = unconfigured_poller(10);
        let mut rx = poller.subscribe();
        let started = tokio::time::Instant::now();

        let handle = poller.start().unwrap();
        assert!(poller.start().is_none());
        for _ in 0..3 {
            rx.changed().await.unwrap();
            assert_eq!(rx.borrow_and_update().error, Some(HealthError::NotConfigured));
        }
        assert!(started.elapsed() >= Duration::from_secs(20));

        poller.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_poller_cannot_restart() {
        let poller = unconfigured_poller(10);
        poller.stop();

        assert!(poller.start().is_none());
    }
}
