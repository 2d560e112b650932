use anyhow::{anyhow, Result};

use super::AppConfig;
use crate::endpoint::normalize_endpoint;

const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Configuration validator for ensuring configuration integrity
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration
    pub fn validate(config: &AppConfig) -> Result<()> {
        Self::validate_device_config(config);
        Self::validate_health_config(config)?;
        Self::validate_command_config(config)?;
        Ok(())
    }

    /// A stored endpoint that does not normalize is treated as "not configured"
    /// by the endpoint store, so it only warrants a warning here.
    fn validate_device_config(config: &AppConfig) {
        if let Some(base_url) = &config.device.base_url {
            if let Err(e) = normalize_endpoint(base_url) {
                tracing::warn!("Stored device endpoint will be ignored: {}", e);
            }
        }
    }

    fn validate_health_config(config: &AppConfig) -> Result<()> {
        if config.health.timeout_ms == 0 {
            return Err(anyhow!("Health timeout must be greater than 0 milliseconds"));
        }

        if config.health.poll_interval_secs == 0 {
            return Err(anyhow!("Health poll interval must be greater than 0 seconds"));
        }

        if config.health.timeout_ms > config.health.poll_interval_secs.saturating_mul(1000) {
            tracing::warn!(
                "Health timeout ({}ms) exceeds the poll interval ({}s); polls may overlap",
                config.health.timeout_ms,
                config.health.poll_interval_secs
            );
        }

        if config.health.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(anyhow!(
                "Health poll interval must be at most {} seconds",
                MAX_POLL_INTERVAL_SECS
            ));
        }

        Ok(())
    }

    fn validate_command_config(config: &AppConfig) -> Result<()> {
        if config.commands.timeout_ms == 0 {
            return Err(anyhow!("Command timeout must be greater than 0 milliseconds"));
        }

        Ok(())
    }
}
