//! # Upload Scheduler
//!
//! Periodically flushes the telemetry buffer to the backend.
//!
//! Each tick moves `Idle -> Uploading -> Idle`:
//! - empty buffer: no network call
//! - no stored token: no network call, data stays buffered
//! - 2xx: the uploaded readings are removed from the buffer
//! - anything else: the buffer is left untouched and resent next tick
//!
//! There is no backoff and no retry limit; every tick is an independent
//! attempt. Delivery is at-least-once.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{BackendClient, HttpTransport};
use crate::telemetry::TelemetryStore;

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Uploading,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing buffered
    Empty,
    /// Readings buffered but no token stored
    NotLoggedIn,
    /// This many readings were accepted and removed from the buffer
    Uploaded(usize),
    /// Upload failed; buffer unchanged
    Failed,
    /// Another tick was already uploading
    Busy,
}

/// Fixed-interval uploader
pub struct UploadScheduler<T> {
    client: Arc<BackendClient<T>>,
    store: Arc<TelemetryStore>,
    period: Duration,
    state: Mutex<UploadState>,
}

impl<T> std::fmt::Debug for UploadScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("period", &self.period)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Returns the scheduler to `Idle` even if the tick future is dropped
struct UploadingGuard<'a>(&'a Mutex<UploadState>);

impl Drop for UploadingGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = UploadState::Idle;
    }
}

impl<T> UploadScheduler<T> {
    pub fn state(&self) -> UploadState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn begin(&self) -> Option<UploadingGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state == UploadState::Uploading {
            return None;
        }
        *state = UploadState::Uploading;
        Some(UploadingGuard(&self.state))
    }
}

impl<T: HttpTransport> UploadScheduler<T> {
    pub fn new(client: Arc<BackendClient<T>>, store: Arc<TelemetryStore>, period: Duration) -> Self {
        Self {
            client,
            store,
            period,
            state: Mutex::new(UploadState::Idle),
        }
    }

    /// Run one upload attempt
    ///
    /// Also used for user-initiated flushes between timer ticks.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_uploading) = self.begin() else {
            debug!("Upload already in progress, skipping tick");
            return TickOutcome::Busy;
        };
        self.upload_pending().await
    }

    async fn upload_pending(&self) -> TickOutcome {
        let pending = self.store.snapshot();
        if pending.is_empty() {
            debug!("No telemetry to upload");
            return TickOutcome::Empty;
        }

        if !self.client.is_logged_in() {
            warn!("{} readings pending but no token stored, skipping upload", pending.len());
            return TickOutcome::NotLoggedIn;
        }

        if let Err(e) = self.client.upload(&pending.readings).await {
            warn!("Upload of {} readings failed: {}", pending.len(), e);
            return TickOutcome::Failed;
        }

        let sent = pending.len();
        match self.store.acknowledge_async(pending).await {
            Ok(()) => {
                info!("Uploaded {} readings", sent);
                TickOutcome::Uploaded(sent)
            }
            Err(e) => {
                warn!("Uploaded {} readings but could not drop them from the buffer: {}", sent, e);
                TickOutcome::Failed
            }
        }
    }

    /// Tick every period until `shutdown` turns true or its sender is dropped
    ///
    /// The first tick fires immediately. An upload already in flight when
    /// shutdown is requested runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Upload scheduler started, period {:?}", self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Upload scheduler stopped");
    }
}
