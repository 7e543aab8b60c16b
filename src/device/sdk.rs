//! # Companion SDK
//!
//! Calls the app makes into the wearable companion SDK: listing paired
//! devices, querying their connection state, checking whether the watch app
//! is installed and sending it messages.
//!
//! The SDK itself is vendor code; [`CompanionSdk`] is the seam it plugs into.
//! [`Companion`] holds the app id and adds the logging around each call.

use async_trait::async_trait;
use tracing::{info, warn};

use super::DeviceStatus;
use crate::error::Result;

/// A device known to the companion SDK
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WearableDevice {
    pub id: u64,
    pub name: String,
}

/// Install state of a watch app on one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppInfo {
    Installed { version: u32 },
    NotInstalled,
}

/// Delivery result reported for an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Success,
    FailureUnknown,
    FailureInvalidFormat,
    FailureMessageTooLarge,
    FailureUnsupportedType,
    FailureDuringTransfer,
    FailureInvalidDevice,
    FailureDeviceNotConnected,
}

/// Outbound half of the companion SDK
///
/// Errors mean the SDK is not initialized or its service is unavailable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompanionSdk: Send + Sync {
    /// Devices paired with the phone, in the SDK's order
    async fn known_devices(&self) -> Result<Vec<WearableDevice>>;

    async fn device_status(&self, device: &WearableDevice) -> Result<DeviceStatus>;

    async fn application_info(&self, device: &WearableDevice, app_id: &str) -> Result<AppInfo>;

    /// Send one message to the app; resolves when the SDK reports delivery
    async fn send_message(
        &self,
        device: &WearableDevice,
        app_id: &str,
        message: serde_json::Value,
    ) -> Result<MessageStatus>;
}

/// SDK handle bound to one watch app
#[derive(Debug)]
pub struct Companion<S> {
    sdk: S,
    app_id: String,
}

impl<S: CompanionSdk> Companion<S> {
    pub fn new(sdk: S, app_id: impl Into<String>) -> Self {
        Self {
            sdk,
            app_id: app_id.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Pick the first known device, with its current status
    ///
    /// Returns `None` (and warns) when no device is paired.
    pub async fn select_device(&self) -> Result<Option<(WearableDevice, DeviceStatus)>> {
        let devices = self.sdk.known_devices().await?;
        let Some(device) = devices.into_iter().next() else {
            warn!("No wearable device found");
            return Ok(None);
        };

        let status = self.sdk.device_status(&device).await?;
        info!("Using device {} ({}), status {}", device.name, device.id, status);
        Ok(Some((device, status)))
    }

    /// Check whether the watch app is installed on `device`
    pub async fn app_info(&self, device: &WearableDevice) -> Result<AppInfo> {
        let info = self.sdk.application_info(device, &self.app_id).await?;
        match &info {
            AppInfo::Installed { version } => {
                info!("App {} installed on {}, version {}", self.app_id, device.name, version);
            }
            AppInfo::NotInstalled => {
                warn!("App {} is not installed on {}", self.app_id, device.name);
            }
        }
        Ok(info)
    }

    /// Send `message` to the watch app on `device`
    pub async fn send(&self, device: &WearableDevice, message: serde_json::Value) -> Result<MessageStatus> {
        let status = self.sdk.send_message(device, &self.app_id, message).await?;
        if status == MessageStatus::Success {
            info!("Message delivered to {}", device.name);
        } else {
            warn!("Message to {} not delivered: {:?}", device.name, status);
        }
        Ok(status)
    }
}
