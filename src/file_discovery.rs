use crate::timestamp_parser::TimestampParser;
use chrono::{DateTime, Utc};
use glob::glob;
use serde_json::Value;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Discovers Claude Code session logs under a projects directory
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `*.jsonl` files below the root, oldest first.
    pub fn scan(&self) -> Vec<PathBuf> {
        let files = self.find_jsonl_files();
        tracing::debug!(root = %self.root.display(), files = files.len(), "Discovered log files");
        Self::sort_files_by_timestamp(files)
    }

    /// Recursive walk. A missing root or unreadable entries yield nothing.
    pub fn find_jsonl_files(&self) -> Vec<PathBuf> {
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "Projects directory does not exist");
            return Vec::new();
        }

        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = Path::new(&root).join("**").join("*.jsonl");

        let paths = match glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(pattern = %pattern.display(), error = %e, "Invalid glob pattern");
                return Vec::new();
            }
        };

        paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::debug!(path = %e.path().display(), error = %e.error(), "Skipping unreadable path");
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect()
    }

    /// Timestamp of the first line that parses as JSON and carries a
    /// `timestamp` string. `None` when there is no such line or its value
    /// is not a real instant.
    pub fn get_earliest_timestamp(file_path: &Path) -> Option<DateTime<Utc>> {
        let file = File::open(file_path).ok()?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let Ok(line) = line else {
                continue;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Ok(value) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if let Some(timestamp) = value.get("timestamp").and_then(Value::as_str) {
                return TimestampParser::parse(timestamp).ok();
            }
        }

        None
    }

    /// Ascending by earliest content timestamp; untimestamped files last.
    /// Equal timestamps go to the least recently modified file, so a resumed
    /// or forked session sorts after the log it was copied from. Path breaks
    /// any remaining tie.
    pub fn sort_files_by_timestamp(files: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut keyed: Vec<(Option<DateTime<Utc>>, Option<SystemTime>, PathBuf)> = files
            .into_iter()
            .map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
                (Self::get_earliest_timestamp(&path), modified, path)
            })
            .collect();

        keyed.sort_by(|(a_ts, a_mtime, a_path), (b_ts, b_mtime, b_path)| {
            none_last(a_ts, b_ts)
                .then_with(|| none_last(a_mtime, b_mtime))
                .then_with(|| a_path.cmp(b_path))
        });

        keyed.into_iter().map(|(_, _, path)| path).collect()
    }
}

fn none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
