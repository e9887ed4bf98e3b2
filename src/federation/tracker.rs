// src/federation/tracker.rs
//! Failing-source tracking for a federation
//!
//! Once a repository fails while failures are being ignored, it is marked as
//! failing and every later call to it is short-circuited to the operation's
//! default result. Marks are never cleared automatically; a cloned federation
//! starts with a fresh tracker.

use crate::error::Error;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Identity of a repository registered with a federation
pub type SourceId = Uuid;

/// Why and when a source was marked as failing
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// Repository name at the time of failure
    pub source_name: String,
    /// First error observed
    pub message: String,
    /// When the source was first marked
    pub failed_at: DateTime<Utc>,
    /// Failures recorded, including ones raced in by concurrent calls
    pub failure_count: u32,
}

/// Registry of failing sources
pub struct FailureTracker {
    /// Per-source failure records
    failing: DashMap<SourceId, FailureRecord>,
    /// Count of recorded failures (for stats)
    failure_count: AtomicU32,
    /// Count of calls skipped because their source was failing (for stats)
    skip_count: AtomicU32,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self {
            failing: DashMap::new(),
            failure_count: AtomicU32::new(0),
            skip_count: AtomicU32::new(0),
        }
    }

    /// Check if a source has been marked as failing
    pub fn is_failing(&self, id: &SourceId) -> bool {
        self.failing.contains_key(id)
    }

    /// Check if a call should be short-circuited, counting the skip if so
    pub fn should_skip(&self, id: &SourceId) -> bool {
        let failing = self.is_failing(id);
        if failing {
            self.skip_count.fetch_add(1, Ordering::Relaxed);
        }
        failing
    }

    /// Mark a source as failing
    ///
    /// The first error is kept; later ones only bump the count.
    pub fn record_failure(&self, id: SourceId, source_name: &str, error: &Error) {
        self.failing
            .entry(id)
            .and_modify(|record| record.failure_count += 1)
            .or_insert_with(|| {
                debug!("[federation] Marking source '{}' as failing", source_name);
                FailureRecord {
                    source_name: source_name.to_string(),
                    message: error.to_string(),
                    failed_at: Utc::now(),
                    failure_count: 1,
                }
            });
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the failure record of a source
    pub fn get(&self, id: &SourceId) -> Option<FailureRecord> {
        self.failing.get(id).map(|entry| entry.value().clone())
    }

    /// All failure records
    pub fn records(&self) -> Vec<FailureRecord> {
        self.failing.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Get the number of failing sources
    pub fn failing_count(&self) -> usize {
        self.failing.len()
    }

    /// Get total recorded failures
    pub fn total_failures(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Get total short-circuited calls
    pub fn total_skips(&self) -> u32 {
        self.skip_count.load(Ordering::Relaxed)
    }

    /// Forget every failure
    pub fn reset_all(&self) {
        self.failing.clear();
        self.failure_count.store(0, Ordering::Relaxed);
        self.skip_count.store(0, Ordering::Relaxed);
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn failure() -> Error {
        Error::source_failure("remote", "timed out")
    }

    #[test]
    fn test_tracker_starts_empty() {
        let tracker = FailureTracker::new();
        let id = Uuid::new_v4();
        assert!(!tracker.is_failing(&id));
        assert!(!tracker.should_skip(&id));
        assert_eq!(tracker.total_skips(), 0);
    }

    #[test]
    fn test_record_marks_source() {
        let tracker = FailureTracker::new();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        tracker.record_failure(id, "remote", &failure());
        assert!(tracker.is_failing(&id));
        assert!(!tracker.is_failing(&other));
        assert!(tracker.should_skip(&id));
        assert_eq!(tracker.total_skips(), 1);

        let record = tracker.get(&id).unwrap();
        assert_eq!(record.source_name, "remote");
        assert!(record.message.contains("timed out"));
    }

    #[test]
    fn test_first_error_is_kept() {
        let tracker = FailureTracker::new();
        let id = Uuid::new_v4();

        tracker.record_failure(id, "remote", &failure());
        tracker.record_failure(id, "remote", &Error::source_failure("remote", "refused"));

        let record = tracker.get(&id).unwrap();
        assert_eq!(record.failure_count, 2);
        assert!(record.message.contains("timed out"));
        assert_eq!(tracker.failing_count(), 1);
        assert_eq!(tracker.total_failures(), 2);
    }

    #[test]
    fn test_concurrent_recording() {
        let tracker = Arc::new(FailureTracker::new());
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.record_failure(id, "remote", &failure()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.failing_count(), 1);
        assert_eq!(tracker.get(&id).unwrap().failure_count, 8);
    }

    #[test]
    fn test_reset_all() {
        let tracker = FailureTracker::new();
        let id = Uuid::new_v4();
        tracker.record_failure(id, "remote", &failure());

        tracker.reset_all();
        assert!(!tracker.is_failing(&id));
        assert_eq!(tracker.total_failures(), 0);
        assert!(tracker.records().is_empty());
    }
}
