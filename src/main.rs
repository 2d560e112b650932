use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use pi_remote::{
    config::AppConfig,
    logging::{init_logging_with_debug, log_configuration_status},
    CommandResult, HealthSnapshot, RaspberryRemote, RemoteError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Remote control for a Raspberry playback device", long_about = None)]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the device once and print its health
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep polling and print every health update until Ctrl-C
    Watch,
    /// Show the device endpoint, or set it from a URL or scanned QR payload
    Endpoint { url: Option<String> },
    /// Play a catalog episode such as 7x01
    Play { episode: String },
    /// Stop playback
    Stop,
    /// Change the volume
    Volume {
        #[arg(value_enum)]
        direction: VolumeDirection,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VolumeDirection {
    Up,
    Down,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging_with_debug(args.debug)?;

    let config_path = args.config.unwrap_or_else(AppConfig::default_config_path);
    let config = AppConfig::load_or_create(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let remote = RaspberryRemote::from_config_file(&config_path, &config)
        .context("Failed to set up the device client")?;
    log_configuration_status(&config_path, &config, remote.base_url().await.as_deref());

    if let Err(e) = run(&remote, args.command).await {
        eprintln!("{}", error_report(&e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(remote: &RaspberryRemote, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status { json } => {
            let snapshot = remote.refresh().await;
            if json {
                let out = serde_json::to_string_pretty(&snapshot)
                    .context("Failed to serialize health snapshot")?;
                println!("{}", out);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Command::Watch => watch(remote).await,
        Command::Endpoint { url: None } => match remote.base_url().await {
            Some(url) => println!("{}", url),
            None => return Err(RemoteError::NotConfigured.into()),
        },
        Command::Endpoint { url: Some(raw) } => {
            let normalized = remote.set_endpoint(&raw).await?;
            println!("Endpoint set to {}", normalized);
            print_snapshot(&remote.snapshot());
        }
        Command::Play { episode } => {
            remote.play(&episode).await?;
            println!("Playing {}", episode);
        }
        Command::Stop => {
            let result = remote.stop().await?;
            print_result("Stopped", &result);
        }
        Command::Volume { direction } => {
            let result = match direction {
                VolumeDirection::Up => remote.volume_up().await?,
                VolumeDirection::Down => remote.volume_down().await?,
            };
            print_result("Volume changed", &result);
        }
    }

    Ok(())
}

async fn watch(remote: &RaspberryRemote) {
    let mut updates = remote.subscribe();
    let poller = remote.start_polling();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping health poller");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_snapshot(&snapshot);
                println!();
            }
        }
    }

    remote.shutdown();
    if let Some(poller) = poller {
        let _ = poller.await;
    }
}

/// Device errors get their recovery hints; anything else prints its context chain.
fn error_report(error: &anyhow::Error) -> String {
    match error.downcast_ref::<RemoteError>() {
        Some(remote_error) => remote_error.user_message(),
        None => format!("Error: {:#}", error),
    }
}

fn print_snapshot(snapshot: &HealthSnapshot) {
    println!("Status:   {} ({})", snapshot.status, snapshot.status.label());
    println!("Endpoint: {}", snapshot.base_url.as_deref().unwrap_or("unknown"));
    println!("Running:  {}", if snapshot.running { "yes" } else { "no" });
    println!("Playing:  {}", snapshot.playing.as_deref().unwrap_or("-"));
    if let Some(sampled_at) = snapshot.sampled_at() {
        println!("Sampled:  {}", sampled_at.to_rfc3339());
    }
    if let Some(error) = snapshot.error {
        println!("Error:    {}", error);
    }
}

fn print_result(action: &str, result: &CommandResult) {
    if !result.ok {
        println!("{} (device reported ok=false)", action);
    } else {
        println!("{}", action);
    }

    if let Some(data) = &result.data {
        println!("{}", data);
    } else if let Some(raw) = &result.raw {
        println!("{}", raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_uses_recovery_hints() {
        let report = error_report(&RemoteError::NotConfigured.into());
        assert!(report.starts_with("No device endpoint is configured"));
        assert!(report.contains("Try:"));
    }

    #[test]
    fn test_error_report_keeps_context_chain() {
        let error = anyhow::anyhow!("key must be a string")
            .context("Failed to serialize health snapshot");
        assert_eq!(
            error_report(&error),
            "Error: Failed to serialize health snapshot: key must be a string"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_endpoint_command_fails() {
        let remote = RaspberryRemote::new(
            &AppConfig::default(),
            std::sync::Arc::new(pi_remote::endpoint::MemoryEndpointStorage::new()),
        )
        .unwrap();

        let error = run(&remote, Command::Endpoint { url: None }).await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RemoteError>(),
            Some(RemoteError::NotConfigured)
        ));
    }
}
