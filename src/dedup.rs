//! Intra-pass deduplication
//!
//! The same assistant message is written to a parent session log and to any
//! sub-task log forked from it. Within one collection pass the first copy
//! seen wins; files are visited oldest first, so that is the parent's copy.
//!
//! The key is `message.id:requestId`. Entries missing either id have no key
//! and always pass through: two such entries cannot be told apart from two
//! genuine events with identical counts.
//!
//! The hash set lives for one pass only. Cross-run suppression is the job of
//! [`crate::state::StateStore`].

use crate::models::UsageEntry;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
    duplicates: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `message.id:requestId`, defined only when both ids are present.
    pub fn dedup_hash(entry: &UsageEntry) -> Option<String> {
        match (&entry.message.id, &entry.request_id) {
            (Some(message_id), Some(request_id)) => Some(format!("{}:{}", message_id, request_id)),
            _ => None,
        }
    }

    /// Returns false when `hash` was already admitted during this pass.
    pub fn admit(&mut self, hash: Option<&str>) -> bool {
        let Some(hash) = hash else {
            return true;
        };

        if self.seen.contains(hash) {
            self.duplicates += 1;
            tracing::debug!(dedup_hash = %hash, "Skipping duplicate entry");
            return false;
        }

        self.seen.insert(hash.to_string());
        true
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn unique_hashes(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageData, UsageData};

    fn entry(id: Option<&str>, request_id: Option<&str>) -> UsageEntry {
        UsageEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            message: MessageData {
                id: id.map(String::from),
                model: None,
                usage: UsageData {
                    input_tokens: 1,
                    output_tokens: 1,
                    ..Default::default()
                },
            },
            request_id: request_id.map(String::from),
            session_id: None,
        }
    }

    #[test]
    fn hash_requires_both_ids() {
        assert_eq!(
            Deduplicator::dedup_hash(&entry(Some("msg123"), Some("req456"))),
            Some("msg123:req456".to_string())
        );
        assert_eq!(Deduplicator::dedup_hash(&entry(Some("msg123"), None)), None);
        assert_eq!(Deduplicator::dedup_hash(&entry(None, Some("req456"))), None);
    }

    #[test]
    fn second_copy_of_a_hash_is_rejected() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.admit(Some("msg:req")));
        assert!(!dedup.admit(Some("msg:req")));
        assert!(dedup.admit(Some("msg:other")));

        assert_eq!(dedup.duplicates(), 1);
        assert_eq!(dedup.unique_hashes(), 2);
    }

    #[test]
    fn keyless_entries_always_pass() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.admit(None));
        assert!(dedup.admit(None));
        assert_eq!(dedup.duplicates(), 0);
        assert_eq!(dedup.unique_hashes(), 0);
    }
}
