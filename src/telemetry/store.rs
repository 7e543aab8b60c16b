//! # Local Telemetry Store
//!
//! Durable, ordered buffer of readings waiting to be uploaded.
//!
//! The buffer is persisted as one JSON array under `data_list` in the
//! telemetry namespace. It is loaded once when the store is opened and kept
//! in memory behind a mutex; every mutation is written through to disk
//! before it returns, so reads never touch the file.
//!
//! An upload takes a [`PendingBatch`] snapshot and acknowledges that batch
//! once the backend accepts it. Positions are counted from the start of the
//! process, so readings appended (or evicted by the cap) while the upload is
//! in flight do not shift what gets removed.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, warn};

use super::reading::Reading;
use crate::error::{Result, SyncError};
use crate::storage::KvNamespace;

/// Key of the serialized buffer inside the namespace
pub const DATA_LIST_KEY: &str = "data_list";

/// Readings handed to an upload, plus the position just past the last one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBatch {
    pub readings: Vec<Reading>,
    end: u64,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[derive(Debug)]
struct Buffer {
    readings: Vec<Reading>,
    /// Readings removed from the front since the store was opened
    removed: u64,
}

impl Buffer {
    fn drop_front(&mut self, count: usize) {
        self.readings.drain(..count);
        self.removed += count as u64;
    }
}

/// Persisted reading buffer
#[derive(Debug)]
pub struct TelemetryStore {
    namespace: KvNamespace,
    /// Oldest entries are dropped beyond this length. 0 means unbounded.
    max_len: usize,
    buffer: Mutex<Buffer>,
}

impl TelemetryStore {
    /// Open the store, loading whatever a previous run left buffered
    pub fn new(namespace: KvNamespace, max_len: usize) -> Self {
        let readings = load(&namespace);
        Self {
            namespace,
            max_len,
            buffer: Mutex::new(Buffer { readings, removed: 0 }),
        }
    }

    /// Append a reading to the end of the buffer
    ///
    /// Returns once the new buffer has been written to disk.
    pub fn append(&self, reading: Reading) -> Result<()> {
        let mut buffer = self.lock();

        let excess = if self.max_len > 0 {
            (buffer.readings.len() + 1).saturating_sub(self.max_len)
        } else {
            0
        };
        {
            let next: Vec<&Reading> = buffer.readings[excess..]
                .iter()
                .chain(std::iter::once(&reading))
                .collect();
            self.save(&next)?;
        }

        if excess > 0 {
            buffer.drop_front(excess);
            warn!("Telemetry buffer full, dropped {} oldest readings", excess);
        }
        buffer.readings.push(reading);
        debug!("Buffered reading, {} pending", buffer.readings.len());
        Ok(())
    }

    /// [`append`](Self::append) on the blocking thread pool
    pub async fn append_async(self: &Arc<Self>, reading: Reading) -> Result<()> {
        let store = Arc::clone(self);
        run_blocking(move || store.append(reading)).await
    }

    /// Full buffer in append order, without removing anything
    pub fn read_all(&self) -> Vec<Reading> {
        self.lock().readings.clone()
    }

    /// Current buffer as a batch that can later be acknowledged
    pub fn snapshot(&self) -> PendingBatch {
        let buffer = self.lock();
        PendingBatch {
            readings: buffer.readings.clone(),
            end: buffer.removed + buffer.readings.len() as u64,
        }
    }

    /// Number of buffered readings
    pub fn len(&self) -> usize {
        self.lock().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the buffer with an empty one
    pub fn clear(&self) -> Result<()> {
        let mut buffer = self.lock();
        self.save::<Reading>(&[])?;
        let count = buffer.readings.len();
        buffer.drop_front(count);
        Ok(())
    }

    /// Drop the readings of `batch` after they were delivered
    ///
    /// Readings appended after the snapshot stay buffered, and readings of
    /// the batch that were already evicted are not counted twice.
    pub fn acknowledge(&self, batch: &PendingBatch) -> Result<()> {
        let mut buffer = self.lock();
        let still_buffered = batch.end.saturating_sub(buffer.removed);
        let count = usize::try_from(still_buffered)
            .unwrap_or(usize::MAX)
            .min(buffer.readings.len());
        if count == 0 {
            return Ok(());
        }

        let remaining = &buffer.readings[count..];
        self.save(remaining)?;
        buffer.drop_front(count);
        debug!("Acknowledged {} readings, {} still pending", count, buffer.readings.len());
        Ok(())
    }

    /// [`acknowledge`](Self::acknowledge) on the blocking thread pool
    pub async fn acknowledge_async(self: &Arc<Self>, batch: PendingBatch) -> Result<()> {
        let store = Arc::clone(self);
        run_blocking(move || store.acknowledge(&batch)).await
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        // Every mutation persists before touching memory, so a panic leaves both in step
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save<R: Serialize>(&self, readings: &[R]) -> Result<()> {
        let encoded = serde_json::to_string(readings)?;
        self.namespace.put(DATA_LIST_KEY, &encoded)
    }
}

fn load(namespace: &KvNamespace) -> Vec<Reading> {
    let Some(raw) = namespace.get(DATA_LIST_KEY) else {
        return Vec::new();
    };

    match serde_json::from_str(&raw) {
        Ok(readings) => readings,
        Err(e) => {
            warn!("Discarding unreadable telemetry buffer: {}", e);
            Vec::new()
        }
    }
}

async fn run_blocking<F>(op: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| SyncError::Storage(format!("telemetry store task failed: {}", e)))?
}
