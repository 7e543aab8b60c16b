//! # Wearable Sync
//!
//! Headless host for the telemetry pipeline.
//!
//! Watch payloads are read from stdin, one payload per block of lines
//! separated by a blank line, and fed through the same device boundary the
//! companion SDK callbacks use. Stdin is presented to the pipeline as a
//! single always-connected device. Buffered readings are uploaded every
//! `upload.interval_s` seconds.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument or `WEARABLE_SYNC_CONFIG`, else defaults)
//!    - Set up console logging, plus a daily log file when configured
//!    - Log in with `WEARABLE_SYNC_EMAIL` / `WEARABLE_SYNC_PASSWORD` if no token is stored
//!    - Select the first known device and check the watch app is installed
//!
//! 2. **Main Loop**
//!    - Ingest device events into the telemetry buffer
//!    - Upload the buffer on every scheduler tick
//!    - Report forced logouts
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the scheduler and the ingest loop; the stdin reader
//!      thread is not joined, so a pending read does not hold up exit
//!    - Readings not yet uploaded stay on disk for the next run
//!
//! # Examples
//!
//! ```bash
//! printf 'Heart Rate: 72\nStress Score: 18\nSteps: 5230\n\n' | cargo run -- config/default.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use std::io::BufRead;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

use wearable_sync::api::{BackendClient, Credentials, ReqwestTransport, SessionEvent};
use wearable_sync::config::{Config, LoggingConfig};
use wearable_sync::device::{
    AppInfo, Companion, CompanionSdk, DeviceBridge, DeviceStatus, Ingestor, MessageStatus,
    WearableDevice,
};
use wearable_sync::error::Result as SyncResult;
use wearable_sync::storage::{KvNamespace, AUTH_NAMESPACE, TELEMETRY_NAMESPACE};
use wearable_sync::telemetry::TelemetryStore;
use wearable_sync::upload::UploadScheduler;

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "WEARABLE_SYNC_CONFIG";

/// Device name reported for the stdin source
const STDIN_DEVICE: &str = "stdin";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("Wearable Sync v{} starting...", env!("CARGO_PKG_VERSION"));

    let data_dir = PathBuf::from(&config.storage.data_dir);
    let credentials = Credentials::new(KvNamespace::open(&data_dir, AUTH_NAMESPACE)?);
    let store = Arc::new(TelemetryStore::new(
        KvNamespace::open(&data_dir, TELEMETRY_NAMESPACE)?,
        config.upload.max_buffered_readings,
    ));
    info!("{} readings pending from previous runs", store.len());

    let transport = ReqwestTransport::from_config(&config.backend)?;
    let client = Arc::new(BackendClient::new(transport, credentials, &config.backend));
    login_from_env(&client).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Arc::new(UploadScheduler::new(
        Arc::clone(&client),
        Arc::clone(&store),
        Duration::from_secs(config.upload.interval_s),
    ));
    let scheduler_task = {
        let scheduler = Arc::clone(&scheduler);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    let (bridge, events) = DeviceBridge::channel(config.device.event_channel_capacity);
    let ingestor = Ingestor::new(Arc::clone(&store), config.device.app_id.clone());
    let ingest_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { ingestor.run(events, shutdown).await })
    };

    let mut session_events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            match event {
                SessionEvent::ForcedLogout => {
                    warn!("Session expired, log in again to resume uploads");
                }
            }
        }
    });

    let companion = Companion::new(StdinSdk, config.device.app_id.clone());
    match companion.select_device().await {
        Ok(Some((device, status))) => {
            if let Err(e) = companion.app_info(&device).await {
                warn!("Could not check app status on {}: {}", device.name, e);
            }
            bridge.on_device_status(&device.name, status);
            spawn_stdin_reader(bridge, companion.app_id().to_string(), device.name)
                .context("Failed to start stdin reader")?;
        }
        Ok(None) => {}
        Err(e) => warn!("Companion SDK unavailable: {}", e),
    }

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    shutdown_tx.send(true).ok();
    scheduler_task.await.context("Upload scheduler panicked")?;
    ingest_task.await.context("Device ingest panicked")?;

    info!("{} readings left buffered", store.len());
    Ok(())
}

fn load_config() -> Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    match path {
        Some(path) => {
            Config::load(&path).with_context(|| format!("Failed to load config from {}", path))
        }
        None => Ok(Config::default()),
    }
}

fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wearable-sync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn login_from_env(client: &BackendClient<ReqwestTransport>) {
    if client.is_logged_in() {
        info!("Using stored credentials");
        return;
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("WEARABLE_SYNC_EMAIL"),
        std::env::var("WEARABLE_SYNC_PASSWORD"),
    ) else {
        warn!("Not logged in; set WEARABLE_SYNC_EMAIL and WEARABLE_SYNC_PASSWORD to upload");
        return;
    };

    if let Err(e) = client.login(&email, &password).await {
        warn!("Login failed: {}", e);
    }
}

/// The stdin source seen through the companion SDK seam
struct StdinSdk;

#[async_trait]
impl CompanionSdk for StdinSdk {
    async fn known_devices(&self) -> SyncResult<Vec<WearableDevice>> {
        Ok(vec![WearableDevice {
            id: 0,
            name: STDIN_DEVICE.to_string(),
        }])
    }

    async fn device_status(&self, _device: &WearableDevice) -> SyncResult<DeviceStatus> {
        Ok(DeviceStatus::Connected)
    }

    async fn application_info(&self, _device: &WearableDevice, _app_id: &str) -> SyncResult<AppInfo> {
        Ok(AppInfo::Installed { version: 1 })
    }

    async fn send_message(
        &self,
        _device: &WearableDevice,
        _app_id: &str,
        message: serde_json::Value,
    ) -> SyncResult<MessageStatus> {
        println!("{}", message);
        Ok(MessageStatus::Success)
    }
}

/// Read stdin on its own OS thread
///
/// A blocking read cannot be cancelled, so it must not live on the runtime's
/// blocking pool, which is drained on shutdown.
fn spawn_stdin_reader(
    bridge: DeviceBridge,
    app_id: String,
    device: String,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || read_stdin(&bridge, &app_id, &device))
}

/// Forward blank-line separated stdin blocks as app messages
fn read_stdin(bridge: &DeviceBridge, app_id: &str, device: &str) {
    forward_blocks(std::io::stdin().lock(), bridge, app_id, device);
}

fn forward_blocks(input: impl BufRead, bridge: &DeviceBridge, app_id: &str, device: &str) {
    let mut block = Vec::new();

    for line in input.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {
                if !block.is_empty() {
                    bridge.on_app_message(app_id, vec![block.join("\n")]);
                    block.clear();
                }
            }
            Ok(line) => block.push(line),
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    if !block.is_empty() {
        bridge.on_app_message(app_id, vec![block.join("\n")]);
    }
    bridge.on_device_status(device, DeviceStatus::NotConnected);
}
