//! VaultKV Server Binary
//!
//! Serves the command endpoint over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use vaultkv::config::{ConfigHandle, DEFAULT_CONFIG_FILE};
use vaultkv::network::Server;
use vaultkv::{logging, Registry};

/// VaultKV Server
#[derive(Parser, Debug)]
#[command(name = "vaultkv-server")]
#[command(about = "JSON record store over named embedded key-value databases")]
#[command(version)]
struct Args {
    /// Config file (created with defaults if missing)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Also append logs to this file
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = logging::init(args.log_file.as_deref());

    if let Err(e) = run(args).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> vaultkv::Result<()> {
    tracing::info!("VaultKV Server v{}", vaultkv::VERSION);

    let config = Arc::new(ConfigHandle::open(&args.config)?);
    let snapshot = config.snapshot();

    std::fs::create_dir_all(snapshot.backups_dir())?;
    let registry = Arc::new(Registry::open(snapshot.databases_dir())?);
    tracing::info!("Data directory: {}", snapshot.datadir.display());

    let addr: SocketAddr = format!("{}:{}", args.host, snapshot.port()?)
        .parse()
        .map_err(|e| vaultkv::VaultError::Config(format!("invalid listen address: {}", e)))?;

    #[cfg(unix)]
    spawn_reload_on_sighup(Arc::clone(&config))?;

    let server = Server::bind(addr, registry, config).await?;
    server.run(shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating shutdown...");
}

/// Re-read the config file whenever SIGHUP arrives
#[cfg(unix)]
fn spawn_reload_on_sighup(config: Arc<ConfigHandle>) -> vaultkv::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            if let Err(e) = config.reload() {
                tracing::warn!("Config reload failed, keeping previous config: {}", e);
            }
        }
    });
    Ok(())
}
