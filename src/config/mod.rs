use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub mod validation;

use validation::ConfigValidator;

const APP_DIR_NAME: &str = "pi-remote";
const CONFIG_FILE_NAME: &str = "config.toml";

fn default_health_timeout_ms() -> u64 {
    3500
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_command_timeout_ms() -> u64 {
    5000
}

/// Main application configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub commands: CommandConfig,
}

/// Where the playback device lives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Normalized `scheme://host[:port]`, absent until the user configures one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Health polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_health_timeout_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Remote command settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default = "default_command_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl CommandConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Default location: `<platform config dir>/pi-remote/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load configuration from file or create with defaults
    pub fn load_or_create<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            Self::load_from_file(config_path)
        } else {
            let default_config = Self::default();
            default_config.save_to_file(config_path).with_context(|| {
                format!(
                    "Failed to create default configuration file at: {}",
                    config_path.display()
                )
            })?;

            tracing::info!("Created default configuration file at: {}", config_path.display());
            Ok(default_config)
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let content = std::fs::read_to_string(config_path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", config_path.as_ref().display())
        })?;

        let config = Self::from_toml_str(&content).with_context(|| {
            format!("Failed to parse config file: {}", config_path.as_ref().display())
        })?;

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = self.to_toml_string()?;

        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML configuration")
    }

    /// Serialize with a short commented header describing each section.
    pub fn to_toml_string(&self) -> Result<String> {
        let base_toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        let mut content = String::from("# pi-remote configuration\n\n");

        for line in base_toml.lines() {
            if line.starts_with("[device]") {
                content.push_str("# Playback device (set with `pi-remote endpoint <URL>`)\n");
            } else if line.starts_with("[health]") {
                content.push_str("\n# Health polling of GET /health\n");
            } else if line.starts_with("[commands]") {
                content.push_str("\n# play / stop / volume requests\n");
            }

            content.push_str(line);
            content.push('\n');
        }

        Ok(content)
    }
}
