use thiserror::Error;

/// Errors surfaced by the device client.
///
/// Health polling never produces these: a failed poll degrades into a tagged
/// [`crate::health::HealthSnapshot`] instead.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No device endpoint is configured")]
    NotConfigured,

    #[error("Invalid device endpoint: {0:?}")]
    InvalidEndpoint(String),

    #[error("Cannot convert episode id {0:?} to the SxxExx format")]
    InvalidEpisodeId(String),

    #[error("Request to {path} timed out after {timeout_ms}ms")]
    Timeout { path: String, timeout_ms: u64 },

    #[error("Network error calling {path}: {source}")]
    Network {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Playback failed: HTTP {status} {body}")]
    Playback { status: u16, body: String },

    #[error("Device rejected {path}: HTTP {status} {body}")]
    CommandRejected {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Endpoint storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

impl RemoteError {
    /// Whether the caller can reasonably retry or fix the condition without
    /// restarting the application.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RemoteError::NotConfigured
            | RemoteError::InvalidEndpoint(_)
            | RemoteError::InvalidEpisodeId(_)
            | RemoteError::Timeout { .. }
            | RemoteError::Network { .. }
            | RemoteError::Playback { .. }
            | RemoteError::CommandRejected { .. } => true,
            RemoteError::HttpClient(_) | RemoteError::Storage(_) | RemoteError::Io(_) => false,
        }
    }

    pub fn recovery_actions(&self) -> Vec<String> {
        match self {
            RemoteError::NotConfigured => vec![
                "Set the device address with `pi-remote endpoint <URL>`".to_string(),
                "Scan the QR code shown by the device".to_string(),
            ],
            RemoteError::InvalidEndpoint(_) => vec![
                "Use a URL like http://10.1.35.27:5050".to_string(),
                "Only http and https are supported".to_string(),
            ],
            RemoteError::InvalidEpisodeId(_) => {
                vec!["Episode ids look like 7x01 (season x episode)".to_string()]
            }
            RemoteError::Timeout { .. } | RemoteError::Network { .. } => vec![
                "Check that the device is powered on and on the same network".to_string(),
                "Verify the configured endpoint with `pi-remote status`".to_string(),
            ],
            RemoteError::Playback { status, .. } | RemoteError::CommandRejected { status, .. } => {
                vec![format!("The device answered HTTP {}; check its logs", status)]
            }
            _ => vec!["Check file permissions of the configuration directory".to_string()],
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        let actions = self.recovery_actions();
        format!("{}\n\nTry:\n  - {}", self, actions.join("\n  - "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_lists_actions() {
        let err = RemoteError::NotConfigured;
        let message = err.user_message();
        assert!(message.starts_with("No device endpoint is configured"));
        assert!(message.contains("pi-remote endpoint"));
    }

    #[test]
    fn test_every_error_offers_a_next_step() {
        let errors = [
            RemoteError::InvalidEndpoint("ftp://pi".into()),
            RemoteError::CommandRejected { path: "/stop".into(), status: 500, body: String::new() },
            RemoteError::Storage(anyhow::anyhow!("disk full")),
            RemoteError::Io(std::io::Error::other("denied")),
        ];
        for err in errors {
            assert!(!err.recovery_actions().is_empty(), "{err}");
            assert!(err.user_message().contains("\n\nTry:\n  - "), "{err}");
        }
    }

    #[test]
    fn test_recoverability() {
        assert!(RemoteError::InvalidEpisodeId("abc".into()).is_recoverable());
        assert!(RemoteError::Timeout { path: "/stop".into(), timeout_ms: 5000 }.is_recoverable());
        assert!(!RemoteError::Storage(anyhow::anyhow!("disk full")).is_recoverable());
    }

    #[test]
    fn test_playback_display_carries_status_and_body() {
        let err = RemoteError::Playback { status: 404, body: "unknown episode".into() };
        assert_eq!(err.to_string(), "Playback failed: HTTP 404 unknown episode");
    }
}
