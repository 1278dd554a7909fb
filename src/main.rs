//! ws-hub listener daemon - Main Entry Point
//!
//! Starts every listener against the configured broker and runs until
//! interrupted or until all listeners have stopped.

use clap::{Parser, Subcommand};
use futures::future::join_all;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::task::AbortHandle;
use tracing::{error, info, Level};
use wshub_listener::config::HubConfig;
use wshub_listener::observability::logging::{parse_level, LogFormat};
use wshub_listener::observability::{init_default_logging, init_logging, metrics};
use wshub_listener::supervisor::{ListenerHandle, Supervisor};

/// Fan-out listeners for the ws-hub pub/sub channels
#[derive(Parser)]
#[command(name = "wshub-listener")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker URL, overrides the configuration file
    #[arg(long, value_name = "URL")]
    broker_url: Option<String>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the listeners (default)
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_observability(cli.verbose);

    info!("Starting wshub-listener v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config, cli.broker_url.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_listeners(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn init_observability(verbose: u8) {
    if verbose == 0 {
        init_default_logging();
        return;
    }

    let level = if verbose > 1 { Level::TRACE } else { Level::DEBUG };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    // An explicit LOG_LEVEL above the -v level wins
    let level = std::env::var("LOG_LEVEL")
        .map(|l| parse_level(&l).max(level))
        .unwrap_or(level);
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
    broker_url: Option<&str>,
) -> Result<HubConfig, Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            HubConfig::load_from_file(path)?
        }
        None => {
            let default_paths = ["wshub.toml", "config/wshub.toml"];
            match default_paths
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
            {
                Some(path) => {
                    info!("Loading configuration from: {}", path.display());
                    HubConfig::load_from_file(&path)?
                }
                None => {
                    info!("No configuration file found, using defaults");
                    HubConfig::from_env()?
                }
            }
        }
    };

    if let Some(url) = broker_url {
        config.broker.url = url.to_string();
        config.validate()?;
    }

    Ok(config)
}

async fn run_listeners(config: HubConfig) -> Result<(), Box<dyn std::error::Error>> {
    let handles = Supervisor::from_config(&config)?.start();
    let abort_handles: Vec<AbortHandle> =
        handles.iter().map(ListenerHandle::abort_handle).collect();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Listeners running");

    let all_stopped = tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
            false
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            false
        }
        _ = wait_for_listeners(handles) => {
            error!("All listeners have stopped");
            true
        }
    };

    for handle in &abort_handles {
        handle.abort();
    }

    match serde_json::to_string(&metrics().snapshot()) {
        Ok(snapshot) => info!(metrics = %snapshot, "Final listener metrics"),
        Err(e) => error!("Failed to serialize metrics: {}", e),
    }

    if all_stopped {
        return Err("no listener left running".into());
    }
    Ok(())
}

fn handle_config_command(config: HubConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolves once every listener task has finished
async fn wait_for_listeners(handles: Vec<ListenerHandle>) {
    join_all(handles.into_iter().map(ListenerHandle::join)).await;
}
