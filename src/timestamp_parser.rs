use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// `YYYY-MM-DDTHH:MM:SS[.mmm]Z`, checked by shape only.
const CANONICAL_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{3})?Z$";

static CANONICAL: OnceLock<Regex> = OnceLock::new();

/// Handles parsing timestamps from Claude Code usage logs
pub struct TimestampParser;

impl TimestampParser {
    /// Parse a timestamp string into a DateTime<Utc>
    /// Handles both Z suffix and timezone info formats
    pub fn parse(timestamp_str: &str) -> Result<DateTime<Utc>> {
        let timestamp = if timestamp_str.ends_with('Z') {
            timestamp_str.replace('Z', "+00:00")
        } else {
            timestamp_str.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&timestamp) {
            return Ok(dt.with_timezone(&Utc));
        }

        // Try parsing as naive datetime and assume UTC
        if let Ok(naive) = NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
        }

        anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
    }

    /// True when the string has the canonical log shape. Calendar validity
    /// is not checked: `2024-13-40T99:99:99Z` passes.
    pub fn is_canonical(timestamp_str: &str) -> bool {
        CANONICAL
            .get_or_init(|| Regex::new(CANONICAL_PATTERN).expect("canonical timestamp pattern"))
            .is_match(timestamp_str)
    }

    /// Epoch seconds for the timestamp, or the current time when the string
    /// does not name a real instant.
    pub fn epoch_seconds_or_now(timestamp_str: &str) -> i64 {
        Self::parse(timestamp_str)
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|_| Utc::now().timestamp())
    }
}
