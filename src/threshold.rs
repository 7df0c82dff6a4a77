//! # Threshold: Rolling Score History and Adaptive Cutoff
//!
//! Keeps the most recent scores that cleared the base bar and derives the
//! acceptance cutoff from them: the 80th percentile of the distinct values.
//!
//! The history is process-local. Writers (every scoring call that clears
//! [`BASE_THRESHOLD`]) and readers (every threshold query) share one
//! `RwLock`; neither side holds it across an `.await`.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

/// Acceptance bar used before any history exists, and the minimum score an
/// entry needs to be recorded at all.
pub const BASE_THRESHOLD: f64 = 0.7;

/// Maximum number of entries kept; the oldest is evicted first.
pub const HISTORY_CAPACITY: usize = 1000;

const PERCENTILE: f64 = 0.80;

/// One scored candidate that cleared the base bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub score: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub impressions_target: i64,
    pub clicks_target: i64,
}

pub struct ScoreHistory {
    entries: RwLock<VecDeque<HistoryEntry>>,
    capacity: usize,
}

impl ScoreHistory {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ScoreHistory {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(HISTORY_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting from the front once over capacity.
    pub fn record(&self, entry: HistoryEntry) {
        let mut entries = self.write();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Current acceptance cutoff.
    ///
    /// Returns [`BASE_THRESHOLD`] for an empty history. Otherwise the scores
    /// are deduplicated by exact value and sorted, and the value at index
    /// `floor(0.8 * n)` (clamped to the last index) is returned, so a single
    /// repeated score cannot dominate the percentile.
    pub fn threshold(&self) -> f64 {
        let mut scores: Vec<f64> = self.read().iter().map(|e| e.score).collect();
        if scores.is_empty() {
            return BASE_THRESHOLD;
        }
        scores.sort_by(f64::total_cmp);
        scores.dedup();

        let idx = ((scores.len() as f64 * PERCENTILE) as usize).min(scores.len() - 1);
        scores[idx]
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the recorded entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.read().iter().copied().collect()
    }
}

impl Default for ScoreHistory {
    fn default() -> Self {
        Self::new()
    }
}
