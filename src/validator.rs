//! Strict schema check for Claude Code usage lines
//!
//! Only one shape is accepted: an assistant entry with a canonical
//! `timestamp` and a `message.usage` object holding numeric
//! `input_tokens` / `output_tokens`. Older layouts (top-level `usage`,
//! camelCase `inputTokens`) are rejected rather than translated.

use crate::models::{MessageData, UsageData, UsageEntry};
use crate::timestamp_parser::TimestampParser;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a line produced no usage entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("line is not valid JSON")]
    MalformedJson,
    #[error("`timestamp` is missing or not in YYYY-MM-DDTHH:MM:SS[.mmm]Z form")]
    InvalidTimestamp,
    #[error("`message` is missing or not an object")]
    MissingMessage,
    #[error("`message.usage` is missing or not an object")]
    MissingUsage,
    #[error("`message.usage.{0}` is missing or not a number")]
    NonNumericTokens(&'static str),
}

pub struct EntryValidator;

impl EntryValidator {
    /// Decode one JSONL line and validate it.
    pub fn parse_line(line: &str) -> Result<UsageEntry, RejectReason> {
        let raw: Value = serde_json::from_str(line).map_err(|_| RejectReason::MalformedJson)?;
        Self::validate(&raw)
    }

    /// Validate an already decoded line.
    pub fn validate(raw: &Value) -> Result<UsageEntry, RejectReason> {
        let timestamp = raw
            .get("timestamp")
            .and_then(Value::as_str)
            .filter(|ts| TimestampParser::is_canonical(ts))
            .ok_or(RejectReason::InvalidTimestamp)?;

        let message = raw
            .get("message")
            .and_then(Value::as_object)
            .ok_or(RejectReason::MissingMessage)?;

        let usage = message
            .get("usage")
            .and_then(Value::as_object)
            .ok_or(RejectReason::MissingUsage)?;

        let input_tokens = required_tokens(usage, "input_tokens")?;
        let output_tokens = required_tokens(usage, "output_tokens")?;

        Ok(UsageEntry {
            timestamp: timestamp.to_string(),
            message: MessageData {
                id: optional_string(message.get("id")),
                model: optional_string(message.get("model")),
                usage: UsageData {
                    input_tokens,
                    output_tokens,
                    cache_creation_input_tokens: usage
                        .get("cache_creation_input_tokens")
                        .and_then(token_count)
                        .unwrap_or(0),
                    cache_read_input_tokens: usage
                        .get("cache_read_input_tokens")
                        .and_then(token_count)
                        .unwrap_or(0),
                },
            },
            request_id: optional_string(raw.get("requestId")),
            session_id: optional_string(raw.get("sessionId"))
                .or_else(|| optional_string(raw.get("session_id"))),
        })
    }
}

fn required_tokens(usage: &Map<String, Value>, field: &'static str) -> Result<u64, RejectReason> {
    usage
        .get(field)
        .and_then(token_count)
        .ok_or(RejectReason::NonNumericTokens(field))
}

/// Integer or float JSON number as an unsigned count. Floats truncate,
/// negatives clamp to zero.
fn token_count(value: &Value) -> Option<u64> {
    let number = value.as_number()?;
    if let Some(count) = number.as_u64() {
        return Some(count);
    }
    if number.is_i64() {
        return Some(0);
    }
    number
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f.max(0.0) as u64)
}

fn optional_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
