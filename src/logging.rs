use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::health::HealthSnapshot;

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_options(None, false)
}

/// Initialize logging with debug flag
pub fn init_logging_with_debug(debug: bool) -> Result<()> {
    init_logging_with_options(None, debug)
}

/// Initialize logging. `RUST_LOG` takes precedence over `log_level`.
///
/// Output goes to stderr so command output on stdout stays machine-readable.
pub fn init_logging_with_options(log_level: Option<&str>, debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let level = log_level.unwrap_or(default_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("Invalid log level: {}", e))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(debug)
        .with_line_number(debug);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Logging already initialized: {}", e))?;

    debug!("Logging initialized with level: {}", level);
    Ok(())
}

/// Log where configuration came from and what it resolved to
pub fn log_configuration_status(config_path: &Path, config: &AppConfig, base_url: Option<&str>) {
    info!("=== Configuration Status ===");
    info!("Configuration file: {}", config_path.display());

    match base_url {
        Some(url) => info!("Device endpoint: {}", url),
        None => warn!("No device endpoint configured - commands will fail until one is set"),
    }

    info!(
        "Health: timeout {}ms, polling every {}s",
        config.health.timeout_ms, config.health.poll_interval_secs
    );
    info!("Commands: timeout {}ms", config.commands.timeout_ms);
}

/// Log a replaced health snapshot: status transitions at info, the rest at debug.
pub fn log_health_change(previous: &HealthSnapshot, current: &HealthSnapshot) {
    if previous.status != current.status {
        info!(
            "Device health changed: {} -> {}{}",
            previous.status,
            current.status,
            current
                .error
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    } else {
        debug!(
            "Device health unchanged: {} (running: {}, playing: {:?})",
            current.status, current.running, current.playing
        );
    }

    if previous.playing != current.playing {
        if let Some(playing) = &current.playing {
            info!("Now playing: {}", playing);
        }
    }
}
