//! # Wearable Sync Library
//!
//! Buffer telemetry from a paired wearable and upload it to the monitoring
//! backend.
//!
//! This library provides the pipeline behind the companion app: watch
//! messages are parsed into readings, buffered durably on disk and flushed
//! on a fixed interval through an authenticated HTTP client that refreshes
//! its token once on 401.

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod storage;
pub mod telemetry;
pub mod upload;
