//! Core Data Models
//!
//! The data structures that flow through one collection cycle:
//!
//! 1. **Validated entry**: [`UsageEntry`] - a log line that passed the schema check
//! 2. **Reportable unit**: [`UsageRecord`] - token counts plus the cross-run record id
//! 3. **Wire types**: [`ReportPayload`] and [`ReportResponse`] - the collector API body
//!
//! A [`UsageRecord`] serializes directly into the wire shape expected by
//! `POST /api/usage/report`; its record id never leaves the agent.

use crate::timestamp_parser::TimestampParser;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

/// A log line accepted by [`crate::validator::EntryValidator`].
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    /// Raw timestamp string, canonical shape guaranteed.
    pub timestamp: String,
    pub message: MessageData,
    /// Top-level `requestId`.
    pub request_id: Option<String>,
    /// Top-level `sessionId` (or `session_id`).
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageData {
    pub id: Option<String>,
    pub model: Option<String>,
    pub usage: UsageData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageData {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl UsageData {
    pub fn is_empty(&self) -> bool {
        self.input_tokens == 0 && self.output_tokens == 0
    }
}

/// One usage event ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cache_create_tokens: u64,
    pub cache_read_tokens: u64,
    pub session_id: Option<String>,
    pub model: Option<String>,
    /// Epoch seconds.
    pub timestamp: i64,
    /// Cross-run identity persisted in the agent state.
    #[serde(skip)]
    pub record_id: String,
}

impl UsageRecord {
    /// Build the record for `entry` found in `file`. `dedup_hash` is the
    /// entry's `message.id:requestId` key when it has one.
    pub fn from_entry(file: &Path, entry: &UsageEntry, dedup_hash: Option<&str>) -> Self {
        let usage = &entry.message.usage;

        Self {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens.saturating_add(usage.output_tokens),
            cache_create_tokens: usage.cache_creation_input_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            session_id: entry.session_id.clone(),
            model: entry.message.model.clone(),
            timestamp: TimestampParser::epoch_seconds_or_now(&entry.timestamp),
            record_id: Self::record_id(file, entry, dedup_hash),
        }
    }

    /// `path:hash` when the entry carries both ids, otherwise
    /// `path:timestamp:input:output`.
    pub fn record_id(file: &Path, entry: &UsageEntry, dedup_hash: Option<&str>) -> String {
        match dedup_hash {
            Some(hash) => format!("{}:{}", file.display(), hash),
            None => format!(
                "{}:{}:{}:{}",
                file.display(),
                entry.timestamp,
                entry.message.usage.input_tokens,
                entry.message.usage.output_tokens
            ),
        }
    }
}

/// Request body for `POST /api/usage/report`.
#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    pub records: &'a [UsageRecord],
}

/// Collector acknowledgement. Both counts are optional and informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportResponse {
    pub inserted: Option<u64>,
    pub skipped: Option<u64>,
}

impl ReportResponse {
    /// Read the counts from an acknowledgement object. A count that is not a
    /// non-negative integer is treated as absent.
    pub fn from_object(body: &Map<String, Value>) -> Self {
        Self {
            inserted: body.get("inserted").and_then(Value::as_u64),
            skipped: body.get("skipped").and_then(Value::as_u64),
        }
    }
}
