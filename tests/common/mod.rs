#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Builder for one Claude Code assistant log line.
pub struct UsageLine {
    value: Value,
}

impl UsageLine {
    pub fn new(timestamp: &str, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            value: json!({
                "type": "assistant",
                "timestamp": timestamp,
                "message": {
                    "model": "claude-sonnet-4-20250514",
                    "usage": {
                        "input_tokens": input_tokens,
                        "output_tokens": output_tokens,
                    }
                }
            }),
        }
    }

    pub fn ids(mut self, message_id: &str, request_id: &str) -> Self {
        self.value["message"]["id"] = message_id.into();
        self.value["requestId"] = request_id.into();
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.value["sessionId"] = session_id.into();
        self
    }

    pub fn cache(mut self, create: u64, read: u64) -> Self {
        self.value["message"]["usage"]["cache_creation_input_tokens"] = create.into();
        self.value["message"]["usage"]["cache_read_input_tokens"] = read.into();
        self
    }

    pub fn build(self) -> String {
        self.value.to_string()
    }
}

pub fn create_test_jsonl(dir: &Path, relative: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

/// `count` distinct keyed lines, one second apart, with input tokens
/// `first_input..first_input + count`.
pub fn numbered_lines(count: usize, first_input: u64) -> Vec<String> {
    (0..count)
        .map(|i| {
            let seconds = i % 60;
            let minutes = (i / 60) % 60;
            let hours = i / 3600;
            UsageLine::new(
                &format!("2024-06-01T{:02}:{:02}:{:02}Z", hours, minutes, seconds),
                first_input + i as u64,
                1,
            )
            .ids(&format!("msg_{i}"), &format!("req_{i}"))
            .build()
        })
        .collect()
}
