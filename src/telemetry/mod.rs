//! # Telemetry Module
//!
//! Handles telemetry received from the watch.
//!
//! This module handles:
//! - Normalizing raw watch payloads into readings
//! - Buffering readings durably until the backend accepts them
//! - Shaping readings for the bulk upload endpoint

pub mod parser;
pub mod reading;
pub mod store;

pub use reading::Reading;
pub use store::{PendingBatch, TelemetryStore};
