//! Process-wide registry of observed attempts.
//!
//! Each scenario id owns its own append-only list behind its own mutex, so
//! appends for different ids never wait on each other. The map itself is a
//! sharded [`DashMap`] whose shard lock is held only while an id's slot is
//! looked up or created.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::types::AttemptRecord;

/// Ordered attempts for one id.
type AttemptLog = Arc<Mutex<Vec<AttemptRecord>>>;

/// Point-in-time copy of the tracker, ordered by id.
pub type TrackerSnapshot = BTreeMap<String, Vec<AttemptRecord>>;

/// Concurrency-safe call tracker.
///
/// Cloning is cheap and every clone observes the same registry.
#[derive(Debug, Clone, Default)]
pub struct CallTracker {
    inner: Arc<DashMap<String, AttemptLog>>,
}

impl CallTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attempt for `id` and returns its zero-based sequence number.
    ///
    /// The sequence number and timestamp are assigned under the id's lock, so
    /// concurrent callers for one id receive contiguous numbers in a single
    /// total order with non-decreasing timestamps.
    pub fn record_attempt(&self, id: &str) -> u64 {
        self.record_attempt_at(id, Utc::now())
    }

    /// Appends an attempt read at `now`. A clock that stepped backwards is
    /// clamped to the previous record's timestamp.
    fn record_attempt_at(&self, id: &str, now: DateTime<Utc>) -> u64 {
        let log = self.log_for(id);
        let mut attempts = log.lock();
        let sequence_number = attempts.len() as u64;
        let observed_at = attempts
            .last()
            .map_or(now, |previous| previous.observed_at.max(now));
        attempts.push(AttemptRecord {
            sequence_number,
            observed_at,
        });
        sequence_number
    }

    /// Returns a copy of every id's attempts.
    ///
    /// Records are pushed whole under their id's lock, so a snapshot never
    /// contains a half-written entry.
    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        // Collect handles first so no shard lock is held while id locks are taken.
        let logs: Vec<(String, AttemptLog)> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        logs.into_iter()
            .map(|(id, log)| {
                let attempts = log.lock().clone();
                (id, attempts)
            })
            .collect()
    }

    /// Returns a copy of the attempts recorded for `id`.
    #[must_use]
    pub fn attempts(&self, id: &str) -> Vec<AttemptRecord> {
        self.existing_log(id)
            .map(|log| log.lock().clone())
            .unwrap_or_default()
    }

    /// Returns how many attempts were recorded for `id`.
    #[must_use]
    pub fn attempt_count(&self, id: &str) -> usize {
        self.existing_log(id).map_or(0, |log| log.lock().len())
    }

    /// Returns the number of distinct ids seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no attempt has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn existing_log(&self, id: &str) -> Option<AttemptLog> {
        self.inner.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn log_for(&self, id: &str) -> AttemptLog {
        if let Some(log) = self.existing_log(id) {
            return log;
        }
        Arc::clone(self.inner.entry(id.to_owned()).or_default().value())
    }
}
