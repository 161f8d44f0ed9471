//! CLI command handlers
//!
//! Argument parsing lives in [`args`]; each subcommand is one `run_*`
//! function returning `anyhow::Result` to `main`.

pub mod args;

pub use args::{Cli, Commands};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::camera::{CameraCatalog, CameraSource};
use crate::config::{ConfigLoader, ProxyConfig};
use crate::server::ProxyServer;

/// Map `-v` occurrences to an env-filter directive.
pub fn get_log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,tower=debug",
    }
}

pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref()).await?;
    match cli.command {
        Commands::Serve { bind } => run_serve(config, bind).await,
        Commands::Check => run_check(&config),
        Commands::Probe { camera_id, bytes } => run_probe(&config, &camera_id, bytes.get()).await,
    }
}

async fn load_config(path: Option<&Path>) -> Result<ProxyConfig> {
    let config = ConfigLoader::load(path)
        .await
        .context("Failed to load configuration")?;
    debug!("Configuration: {:?}", config);
    Ok(config)
}

async fn run_serve(mut config: ProxyConfig, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let listener = TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    ProxyServer::from_config(config)
        .serve(listener, shutdown_signal())
        .await
}

fn run_check(config: &ProxyConfig) -> Result<()> {
    let catalog = CameraCatalog::new(config.cameras.clone());
    println!("Configuration OK: {} camera(s)", catalog.len());
    for camera in catalog.iter() {
        println!(
            "  {:<16} {:<24} {:<28} {}",
            camera.id,
            camera.name,
            camera.source_uri(),
            if camera.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

async fn run_probe(config: &ProxyConfig, camera_id: &str, bytes: usize) -> Result<()> {
    let catalog = CameraCatalog::new(config.cameras.clone());
    let camera = catalog.resolve(camera_id)?.clone();
    let uri = camera.source_uri();

    let mut source = CameraSource::new(camera);
    source
        .connect()
        .await
        .with_context(|| format!("Camera {camera_id} is unreachable at {uri}"))?;
    let chunk = source
        .read_chunk(bytes)
        .await
        .with_context(|| format!("Failed to read from camera {camera_id}"))?;
    source.disconnect();

    println!("Read {} byte(s) from {} ({})", chunk.len(), camera_id, uri);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
