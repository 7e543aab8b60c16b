//! # Telemetry Parser
//!
//! Turns one raw payload from the watch into a [`Reading`].
//!
//! The watch app sends either a JSON object
//!
//! ```text
//! {"heartRate": 72, "stressScore": 18, "steps": 5230, "timestamp": "14:02:11"}
//! ```
//!
//! or a human-readable block such as
//!
//! ```text
//! 14:02:11 - Update
//! - Heart Rate: 72
//! - Stress Score: 18
//! - Steps: 5230
//! ```
//!
//! JSON is tried first. Anything that is not a JSON object goes through the
//! line scanner. Parsing is total: unknown input yields an all-zero reading
//! stamped with the receive time.

use std::sync::OnceLock;

use chrono::{DateTime, Local, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::reading::Reading;

/// Format used when the payload carries no time of its own
const LOCAL_TIME_FORMAT: &str = "%H:%M:%S";

const HEART_RATE_KEYS: &[&str] = &["heartRate", "hr"];
const STRESS_SCORE_KEYS: &[&str] = &["stressScore", "stress"];
const STEPS_KEYS: &[&str] = &["steps"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time"];

struct LinePatterns {
    heart_rate: Regex,
    stress_score: Regex,
    steps: Regex,
    time: Regex,
}

fn patterns() -> &'static LinePatterns {
    static PATTERNS: OnceLock<LinePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LinePatterns {
        heart_rate: Regex::new(r"(?i)heart\s*rate\s*:\s*(\d+)").unwrap(),
        stress_score: Regex::new(r"(?i)stress\s*score\s*:\s*(\d+)").unwrap(),
        steps: Regex::new(r"(?i)\bsteps\s*:\s*(\d+)").unwrap(),
        time: Regex::new(r"\b(\d{2}:\d{2}:\d{2})\b").unwrap(),
    })
}

/// Parse a payload received now
pub fn parse(raw: &str) -> Reading {
    parse_at(raw, Local::now())
}

/// Parse a payload received at `received_at`
///
/// `received_at` stamps [`Reading::captured_at`] and supplies the
/// `HH:MM:SS` fallback when the payload has no time token.
pub fn parse_at(raw: &str, received_at: DateTime<Local>) -> Reading {
    let captured_at = received_at.with_timezone(&Utc);
    let fallback_time = || received_at.format(LOCAL_TIME_FORMAT).to_string();

    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(fields)) => Reading {
            timestamp: timestamp_field(&fields).unwrap_or_else(fallback_time),
            heart_rate: counter_field(&fields, HEART_RATE_KEYS),
            stress_score: counter_field(&fields, STRESS_SCORE_KEYS),
            steps: counter_field(&fields, STEPS_KEYS),
            captured_at,
        },
        _ => parse_text(raw, captured_at, fallback_time),
    }
}

fn parse_text(
    raw: &str,
    captured_at: DateTime<Utc>,
    fallback_time: impl FnOnce() -> String,
) -> Reading {
    let p = patterns();
    let mut heart_rate = None;
    let mut stress_score = None;
    let mut steps = None;
    let mut time = None;

    for line in raw.lines() {
        heart_rate = heart_rate.or_else(|| capture_u32(&p.heart_rate, line));
        stress_score = stress_score.or_else(|| capture_u32(&p.stress_score, line));
        steps = steps.or_else(|| capture_u32(&p.steps, line));
        if time.is_none() {
            time = p.time.captures(line).map(|c| c[1].to_string());
        }
    }

    Reading {
        timestamp: time.unwrap_or_else(fallback_time),
        heart_rate: heart_rate.unwrap_or(0),
        stress_score: stress_score.unwrap_or(0),
        steps: steps.unwrap_or(0),
        captured_at,
    }
}

fn capture_u32(pattern: &Regex, line: &str) -> Option<u32> {
    pattern.captures(line)?[1].parse().ok()
}

fn counter_field(fields: &Map<String, Value>, keys: &[&str]) -> u32 {
    keys.iter()
        .find_map(|key| fields.get(*key))
        .and_then(|value| match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

fn timestamp_field(fields: &Map<String, Value>) -> Option<String> {
    match TIMESTAMP_KEYS.iter().find_map(|key| fields.get(*key))? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 3, 12, 34, 56).unwrap()
    }

    #[test]
    fn test_json_round_trips_all_fields() {
        let raw = r#"{"heartRate": 72, "stressScore": 18, "steps": 5230, "timestamp": "14:02:11"}"#;
        let reading = parse_at(raw, received_at());

        assert_eq!(reading.heart_rate, 72);
        assert_eq!(reading.stress_score, 18);
        assert_eq!(reading.steps, 5230);
        assert_eq!(reading.timestamp, "14:02:11");
        assert_eq!(reading.captured_at, received_at().with_timezone(&Utc));
    }

    #[test]
    fn test_json_short_keys() {
        let raw = r#"{"hr": 64, "stress": 30, "steps": 12, "time": "07:00:01"}"#;
        let reading = parse_at(raw, received_at());

        assert_eq!(reading.heart_rate, 64);
        assert_eq!(reading.stress_score, 30);
        assert_eq!(reading.steps, 12);
        assert_eq!(reading.timestamp, "07:00:01");
    }

    #[test]
    fn test_json_numeric_timestamp_kept_as_string() {
        let raw = r#"{"heartRate": 60, "timestamp": 1717410896}"#;
        let reading = parse_at(raw, received_at());
        assert_eq!(reading.timestamp, "1717410896");
    }

    #[test]
    fn test_json_missing_fields_are_zero() {
        let reading = parse_at(r#"{"heartRate": 80}"#, received_at());

        assert_eq!(reading.heart_rate, 80);
        assert_eq!(reading.stress_score, 0);
        assert_eq!(reading.steps, 0);
        assert_eq!(reading.timestamp, "12:34:56");
    }

    #[test]
    fn test_json_negative_and_fractional_values_are_zero() {
        let raw = r#"{"heartRate": -5, "stressScore": 12.5, "steps": "300"}"#;
        let reading = parse_at(raw, received_at());

        assert_eq!(reading.heart_rate, 0);
        assert_eq!(reading.stress_score, 0);
        assert_eq!(reading.steps, 300);
    }

    #[test]
    fn test_free_text_block() {
        let raw = "14:02:11 - Update\n- Heart Rate: 72\n- Stress Score: 18\n- Steps: 5230";
        let reading = parse_at(raw, received_at());

        assert_eq!(reading.heart_rate, 72);
        assert_eq!(reading.stress_score, 18);
        assert_eq!(reading.steps, 5230);
        assert_eq!(reading.timestamp, "14:02:11");
    }

    #[test]
    fn test_free_text_is_case_insensitive() {
        let raw = "HEART RATE: 90\nstress score:7\nsteps :  42";
        let reading = parse_at(raw, received_at());

        assert_eq!(reading.heart_rate, 90);
        assert_eq!(reading.stress_score, 7);
        assert_eq!(reading.steps, 42);
    }

    #[test]
    fn test_free_text_missing_labels_are_zero() {
        let reading = parse_at("- Steps: 100", received_at());

        assert_eq!(reading.heart_rate, 0);
        assert_eq!(reading.stress_score, 0);
        assert_eq!(reading.steps, 100);
        assert_eq!(reading.timestamp, "12:34:56");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let raw = "Heart Rate: 70\nHeart Rate: 99";
        assert_eq!(parse_at(raw, received_at()).heart_rate, 70);
    }

    #[test]
    fn test_overflowing_value_is_zero() {
        let raw = "Steps: 99999999999";
        assert_eq!(parse_at(raw, received_at()).steps, 0);
    }

    #[test]
    fn test_garbage_yields_zero_reading() {
        for raw in ["", "   ", "hello", "[1, 2, 3]", "42", "{broken json", "null"] {
            let reading = parse_at(raw, received_at());
            assert_eq!(reading.heart_rate, 0, "payload {:?}", raw);
            assert_eq!(reading.stress_score, 0, "payload {:?}", raw);
            assert_eq!(reading.steps, 0, "payload {:?}", raw);
            assert_eq!(reading.timestamp, "12:34:56", "payload {:?}", raw);
        }
    }

    #[test]
    fn test_time_token_anywhere_on_line() {
        let raw = "Sample at 09:15:30\nHeart Rate: 61";
        assert_eq!(parse_at(raw, received_at()).timestamp, "09:15:30");
    }

    #[test]
    fn test_parse_uses_current_time() {
        let before = Utc::now();
        let reading = parse("Heart Rate: 55");
        assert!(reading.captured_at >= before - chrono::Duration::seconds(1));
        assert_eq!(reading.timestamp.len(), 8);
    }
}
