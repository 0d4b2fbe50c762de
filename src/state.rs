//! Persisted cross-run agent state
//!
//! Holds the record ids that the collector has already acknowledged plus the
//! time of the last acknowledgement. The id collection is bounded at
//! [`MAX_REPORTED_RECORDS`] and kept in insertion order, so overflow evicts the
//! oldest ids first.
//!
//! On disk the state is a small JSON document:
//!
//! ```json
//! {"lastReportedTimestamp": 1717237800, "reportedRecords": ["/path/a.jsonl:msg:req", "..."]}
//! ```
//!
//! `reportedRecords` is written oldest first. Saves go to a sibling temp file
//! that is renamed over the target, so an interrupted save leaves the previous
//! state intact.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_REPORTED_RECORDS: usize = 10_000;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(rename = "lastReportedTimestamp", default)]
    last_reported_timestamp: i64,
    #[serde(rename = "reportedRecords", default)]
    reported_records: Vec<String>,
}

#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    last_reported_timestamp: i64,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl StateStore {
    /// Empty state bound to `path`; nothing is read.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_reported_timestamp: 0,
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    /// Load state from `path`. A missing or unreadable file gives an empty
    /// state; the failure is logged, never returned.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::empty(path);

        if !store.path.exists() {
            debug!(path = %store.path.display(), "No state file yet, starting fresh");
            return store;
        }

        let persisted = match fs::read_to_string(&store.path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<PersistedState>(&raw).map_err(|e| e.to_string()))
        {
            Ok(persisted) => persisted,
            Err(error) => {
                warn!(path = %store.path.display(), %error, "Error loading state, starting fresh");
                return store;
            }
        };

        store.last_reported_timestamp = persisted.last_reported_timestamp;
        for record_id in persisted.reported_records {
            store.insert(record_id);
        }

        debug!(
            path = %store.path.display(),
            records = store.len(),
            last_reported = store.last_reported_timestamp,
            "Loaded agent state"
        );
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_reported(&self, record_id: &str) -> bool {
        self.index.contains(record_id)
    }

    /// Remember `record_id` and stamp the current time as last reported.
    pub fn mark_reported(&mut self, record_id: &str) {
        if !self.index.contains(record_id) {
            self.insert(record_id.to_string());
        }
        self.last_reported_timestamp = Utc::now().timestamp();
    }

    pub fn last_reported_timestamp(&self) -> i64 {
        self.last_reported_timestamp
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Record ids, oldest first.
    pub fn reported_records(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Write the whole state with write-then-rename.
    pub fn save(&self) -> Result<(), StateError> {
        let persisted = PersistedState {
            last_reported_timestamp: self.last_reported_timestamp,
            reported_records: self.order.iter().cloned().collect(),
        };
        let encoded = serde_json::to_vec(&persisted)?;

        let io_error = |source| StateError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path).map_err(io_error)?;
        file.write_all(&encoded).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(io_error)?;

        debug!(path = %self.path.display(), records = self.len(), "Saved agent state");
        Ok(())
    }

    fn insert(&mut self, record_id: String) {
        if !self.index.insert(record_id.clone()) {
            return;
        }
        self.order.push_back(record_id);

        while self.order.len() > MAX_REPORTED_RECORDS {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
