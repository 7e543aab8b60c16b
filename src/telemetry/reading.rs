//! # Telemetry Records
//!
//! The normalized [`Reading`] and its upload wire form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One normalized telemetry sample
///
/// Every numeric field is always populated; values the watch did not
/// report are zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Time reported by the watch, or local `HH:MM:SS` at capture
    pub timestamp: String,

    /// Heart rate in beats per minute
    #[serde(default)]
    pub heart_rate: u32,

    /// Stress score (0-100 on current watches)
    #[serde(default)]
    pub stress_score: u32,

    /// Step count
    #[serde(default)]
    pub steps: u32,

    /// Instant the phone side received the sample
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl Reading {
    /// Convert into the element shape accepted by the bulk upload endpoint
    pub fn to_upload_record(&self) -> UploadRecord {
        UploadRecord {
            timestamp: format_iso8601(&self.captured_at),
            data: UploadData {
                hr_garmin: self.heart_rate,
                stress_garmin: self.stress_score,
                steps_garmin: self.steps,
                time_garmin: self.timestamp.clone(),
            },
        }
    }
}

/// Bulk upload element: `{ "timestamp": ..., "data": { ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub timestamp: String,
    pub data: UploadData,
}

/// Backend field names for one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    pub hr_garmin: u32,
    pub stress_garmin: u32,
    pub steps_garmin: u32,
    pub time_garmin: String,
}

/// ISO-8601 UTC with millisecond precision and a `Z` suffix
pub fn format_iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
