//! modelbridge — local backend for the Power BI assistant frontend.
//!
//! `modelbridge serve` starts the HTTP backend the browser frontend talks
//! to. Configuration is optional; without a modelbridge.toml the built-in
//! defaults (127.0.0.1:8000, 10s helper timeout, gpt-3.5-turbo) apply.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use modelbridge::BridgeConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// modelbridge — local assistant backend for Power BI Desktop.
#[derive(Parser)]
#[command(
    name = "modelbridge",
    version,
    about = "modelbridge — local assistant backend for Power BI Desktop"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP backend
    Serve {
        /// Path to modelbridge.toml [default: ./modelbridge.toml or ~/.config/modelbridge/modelbridge.toml]
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured HTTP port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the configured bind address
        #[arg(long)]
        host: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with env filter (RUST_LOG controls verbosity)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    // Ctrl-C handler — cancels the root token for graceful shutdown
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutting down modelbridge...");
        cancel_for_signal.cancel();
    });

    match cli.command {
        Commands::Serve { config, port, host } => {
            let mut config = load_config(resolve_config(config).as_deref()).await?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            modelbridge::run_server(&config, cancel)
                .await
                .map_err(|e| anyhow::anyhow!("modelbridge server error: {e}"))?;
        }
    }

    Ok(())
}

/// Resolve the config path: explicit flag → ./modelbridge.toml →
/// ~/.config/modelbridge/modelbridge.toml → built-in defaults (None).
fn resolve_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }

    let local = Path::new("modelbridge.toml");
    if local.exists() {
        return Some(local.to_path_buf());
    }

    if let Some(config_dir) = dirs::config_dir() {
        let xdg = config_dir.join("modelbridge").join("modelbridge.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }

    None
}

/// Load and parse a modelbridge.toml, or the defaults when no file was found.
async fn load_config(config_path: Option<&Path>) -> Result<BridgeConfig> {
    let Some(config_path) = config_path else {
        tracing::info!("no modelbridge.toml found, using built-in defaults");
        return Ok(BridgeConfig::default());
    };
    let content = tokio::fs::read_to_string(config_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", config_path, e))?;
    let config: BridgeConfig = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file {:?}: {}", config_path, e))?;
    Ok(config)
}
