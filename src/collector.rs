//! One collection pass over the projects directory
//!
//! Files are visited in [`FileScanner`] order. Every line goes through the
//! [`EntryValidator`], entries without usage are dropped, the pass-scoped
//! [`Deduplicator`] removes repeated `message.id:requestId` keys, and records
//! whose id is already in the [`StateStore`] are skipped. What remains is the
//! list of records to report, in file order.

use crate::dedup::Deduplicator;
use crate::file_discovery::FileScanner;
use crate::models::UsageRecord;
use crate::state::StateStore;
use crate::validator::{EntryValidator, RejectReason};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub files: usize,
    pub unreadable_files: usize,
    pub lines: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub empty_usage: usize,
    pub duplicates: usize,
    pub unique_hashes: usize,
    pub already_reported: usize,
    pub new_records: usize,
}

#[derive(Debug, Default)]
pub struct CollectionPass {
    pub records: Vec<UsageRecord>,
    pub stats: CollectionStats,
}

pub struct UsageCollector {
    scanner: FileScanner,
}

impl UsageCollector {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            scanner: FileScanner::new(projects_dir),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        self.scanner.root()
    }

    /// Collect every record not yet reported according to `state`.
    pub fn collect(&self, state: &StateStore) -> CollectionPass {
        let files = self.scanner.scan();
        let mut dedup = Deduplicator::new();
        let mut pass = CollectionPass::default();
        pass.stats.files = files.len();

        for file in &files {
            self.collect_file(file, state, &mut dedup, &mut pass);
        }

        pass.stats.duplicates = dedup.duplicates();
        pass.stats.unique_hashes = dedup.unique_hashes();
        pass.stats.new_records = pass.records.len();
        pass
    }

    fn collect_file(
        &self,
        file_path: &Path,
        state: &StateStore,
        dedup: &mut Deduplicator,
        pass: &mut CollectionPass,
    ) {
        let file = match File::open(file_path) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %file_path.display(), error = %e, "Skipping unreadable log file");
                pass.stats.unreadable_files += 1;
                return;
            }
        };

        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    pass.stats.lines += 1;
                    pass.stats.rejected += 1;
                    continue;
                }
                Err(e) => {
                    warn!(path = %file_path.display(), error = %e, "Error reading log file, skipping rest of it");
                    pass.stats.unreadable_files += 1;
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            pass.stats.lines += 1;

            let entry = match EntryValidator::parse_line(line) {
                Ok(entry) => entry,
                Err(reason) => {
                    pass.stats.rejected += 1;
                    if reason != RejectReason::MalformedJson {
                        trace!(path = %file_path.display(), line = line_number + 1, %reason, "Rejected entry");
                    }
                    continue;
                }
            };
            pass.stats.accepted += 1;

            if entry.message.usage.is_empty() {
                pass.stats.empty_usage += 1;
                continue;
            }

            let dedup_hash = Deduplicator::dedup_hash(&entry);
            if !dedup.admit(dedup_hash.as_deref()) {
                continue;
            }

            let record = UsageRecord::from_entry(file_path, &entry, dedup_hash.as_deref());
            if state.is_reported(&record.record_id) {
                pass.stats.already_reported += 1;
                continue;
            }

            pass.records.push(record);
        }
    }
}
