//! SFTP Gateway
//!
//! HTTP service exposing a confined SFTP directory tree.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daemon::backend::{LocalConnector, SftpConnector};
use daemon::config::{default_config_path, BackendKind, Config};
use daemon::files::SessionConnector;
use daemon::{build_router, AppState, Gateway};
use tracing_subscriber::EnvFilter;

/// SFTP Gateway - confined HTTP access to a remote SFTP tree.
#[derive(Parser, Debug)]
#[command(name = "sftp-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Listen address, overriding the configuration
        #[arg(long, value_name = "ADDR")]
        bind: Option<SocketAddr>,
    },

    /// Connect to the remote backend and list the root directory
    Check,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine
    let _ = dotenvy::dotenv();

    if let Commands::InitConfig { force } = cli.command {
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        return init_config(&config_path, force);
    }

    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    init_tracing(cli.verbose, &config.effective_log_level());
    match &cli.config {
        Some(config_path) => tracing::info!("Using config file: {:?}", config_path),
        None => tracing::info!("Using config file: {:?}", default_config_path()),
    }

    config.apply_env_overrides();
    if let Commands::Serve { bind: Some(bind) } = &cli.command {
        config.server.bind = bind.to_string();
    }

    config.validate()?;

    match config.remote.backend {
        BackendKind::Sftp => {
            let connector = SftpConnector::new(config.sftp_settings());
            tracing::info!("Using SFTP backend at {}", connector.address());
            run(cli.command, &config, connector).await
        }
        BackendKind::Local => {
            tracing::info!("Using local filesystem backend");
            run(cli.command, &config, LocalConnector::new()).await
        }
    }
}

fn init_tracing(verbose: bool, log_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run<C: SessionConnector>(command: Commands, config: &Config, connector: C) -> anyhow::Result<()> {
    let gateway = Gateway::new(config.gateway_config(), connector);

    match command {
        Commands::Serve { .. } => serve(config, gateway).await,
        Commands::Check => check(gateway).await,
        Commands::InitConfig { .. } => Ok(()),
    }
}

async fn serve<C: SessionConnector>(config: &Config, gateway: Gateway<C>) -> anyhow::Result<()> {
    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind))?;

    if config.server.api_key == "change-me" {
        tracing::warn!("Serving with the default API key; set SFTP_GATEWAY_API_KEY");
    }

    let root = gateway.root().to_string();
    let state = Arc::new(AppState::new(gateway, &config.server.api_key));
    let app = build_router(state, config.files.max_upload_size);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("SFTP gateway listening on {} (root {})", bind, root);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("SFTP gateway stopped");
    Ok(())
}

async fn check<C: SessionConnector>(gateway: Gateway<C>) -> anyhow::Result<()> {
    let listing = gateway
        .list("/")
        .await
        .with_context(|| format!("Failed to list confinement root {}", gateway.root()))?;

    println!("Connected. {} entries in {}:", listing.entries.len(), listing.path);
    for entry in &listing.entries {
        let kind = if entry.is_directory { "dir " } else { "file" };
        println!("  {kind} {:>12}  {}", entry.size, entry.name);
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
    }
}
