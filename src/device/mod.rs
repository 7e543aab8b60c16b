//! # Device Module
//!
//! Boundary between the wearable companion SDK and the telemetry pipeline.
//!
//! The SDK delivers callbacks on its own threads. [`DeviceBridge`] turns them
//! into [`DeviceEvent`]s on a bounded channel without blocking the caller;
//! [`Ingestor`] drains the channel, parses every message payload and appends
//! the readings to the store in arrival order.
//!
//! Calls made into the SDK (discovery, app status, outbound messages) go
//! through the [`sdk::CompanionSdk`] trait.

pub mod sdk;

pub use sdk::{AppInfo, Companion, CompanionSdk, MessageStatus, WearableDevice};

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::telemetry::{parser, TelemetryStore};

/// Connection state reported by the companion SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    NotPaired,
    NotConnected,
    Connected,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStatus::NotPaired => "NOT_PAIRED",
            DeviceStatus::NotConnected => "NOT_CONNECTED",
            DeviceStatus::Connected => "CONNECTED",
            DeviceStatus::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Inbound event from the wearable side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device connection state changed
    Status { device: String, status: DeviceStatus },
    /// A watch app sent a message; each element is one raw payload
    AppMessage { app_id: String, payloads: Vec<String> },
}

/// Sending half handed to the SDK callback layer
#[derive(Debug, Clone)]
pub struct DeviceBridge {
    tx: mpsc::Sender<DeviceEvent>,
}

impl DeviceBridge {
    /// Create a bridge and the receiver the [`Ingestor`] consumes
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DeviceEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Device status callback
    ///
    /// Returns false if the event was dropped (queue full or pipeline gone).
    pub fn on_device_status(&self, device: &str, status: DeviceStatus) -> bool {
        self.forward(DeviceEvent::Status {
            device: device.to_string(),
            status,
        })
    }

    /// App message callback
    ///
    /// Returns false if the event was dropped (queue full or pipeline gone).
    pub fn on_app_message(&self, app_id: &str, payloads: Vec<String>) -> bool {
        self.forward(DeviceEvent::AppMessage {
            app_id: app_id.to_string(),
            payloads,
        })
    }

    fn forward(&self, event: DeviceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Device event queue full, dropping {:?}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Device event pipeline stopped, dropping event");
                false
            }
        }
    }
}

/// Consumes device events and feeds the telemetry store
#[derive(Debug)]
pub struct Ingestor {
    store: Arc<TelemetryStore>,
    app_id: String,
    last_status: Mutex<Option<DeviceStatus>>,
}

impl Ingestor {
    /// Only messages from `app_id` are stored
    pub fn new(store: Arc<TelemetryStore>, app_id: impl Into<String>) -> Self {
        Self {
            store,
            app_id: app_id.into(),
            last_status: Mutex::new(None),
        }
    }

    /// Most recent device status seen, if any
    pub fn last_status(&self) -> Option<DeviceStatus> {
        *self.last_status.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Process one event; returns how many readings were stored
    pub async fn handle(&self, event: DeviceEvent) -> usize {
        match event {
            DeviceEvent::Status { device, status } => {
                info!("Device {} status: {}", device, status);
                *self.last_status.lock().unwrap_or_else(|p| p.into_inner()) = Some(status);
                0
            }
            DeviceEvent::AppMessage { app_id, payloads } => {
                if app_id != self.app_id {
                    debug!("Ignoring message from app {}", app_id);
                    return 0;
                }
                if payloads.is_empty() {
                    debug!("Empty message received");
                    return 0;
                }

                let mut stored = 0;
                for payload in payloads {
                    debug!("Received data: {}", payload);
                    let reading = parser::parse(&payload);
                    match self.store.append_async(reading).await {
                        Ok(()) => stored += 1,
                        Err(e) => error!("Failed to buffer reading: {}", e),
                    }
                }
                stored
            }
        }
    }

    /// Drain `events` until the channel closes or `shutdown` turns true
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<DeviceEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Device ingest started for app {}", self.app_id);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Device ingest stopped");
    }
}
