//! The `serve` subcommand: wire the components together and run until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use courier_device::{CommandAutomation, DeviceChannel, DeviceRegistry, ProcessTransport};
use courier_pipeline::{DeferredDispatcher, UploadPipeline};
use courier_scheduler::Scheduler;
use courier_web::{AppState, create_router};

/// Settings for the `serve` subcommand.
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub adb_path: PathBuf,
    pub devices: Option<PathBuf>,
    pub automation_command: Option<PathBuf>,
    pub automation_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub log_dir: PathBuf,
}

pub async fn run(config: ServeConfig) -> Result<()> {
    let registry = Arc::new(
        DeviceRegistry::load(config.devices.as_deref())
            .await
            .map_err(|e| miette::miette!("failed to load device registry: {}", e))?,
    );
    info!(devices = ?registry.names(), "loaded device registry");

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|e| miette::miette!("failed to create upload directory: {}", e))?;
    let upload_root = tokio::fs::canonicalize(&config.upload_dir)
        .await
        .map_err(|e| miette::miette!("failed to resolve upload directory: {}", e))?;
    info!(path = %upload_root.display(), "upload directory ready");

    let transport = Arc::new(ProcessTransport::new(config.adb_path));
    let channel = Arc::new(DeviceChannel::new(Arc::clone(&registry), transport));
    channel.start_server().await;
    let connected = channel.refresh_connections().await;
    info!(connected = connected.len(), "initial device scan complete");

    if config.automation_command.is_none() {
        warn!("no automation driver configured, scheduled posts will fail");
    }
    let automation = Arc::new(
        CommandAutomation::new(config.automation_command)
            .with_timeout(Duration::from_secs(config.automation_timeout_secs)),
    );

    let scheduler = Arc::new(Scheduler::new());
    scheduler.start().await;

    let dispatcher = Arc::new(DeferredDispatcher::new(
        &upload_root,
        Arc::clone(&registry),
        automation,
    ));
    let pipeline = Arc::new(UploadPipeline::new(
        &upload_root,
        channel,
        Arc::clone(&scheduler),
        dispatcher,
    ));
    let state = Arc::new(AppState::new(pipeline, config.log_dir));
    let router = create_router(state, config.max_body_bytes);

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| miette::miette!("failed to bind {}:{}: {}", config.host, config.port, e))?;
    info!("courier listening on http://{}:{}", config.host, config.port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| miette::miette!("HTTP server error: {}", e))?;

    info!("HTTP server stopped, stopping scheduler");
    scheduler.stop().await;
    info!("courier shut down gracefully");
    Ok(())
}
