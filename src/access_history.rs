//! Bounded per-item access history
//!
//! Every score computation and every explicit attention signal appends to the
//! same bounded log; the two paths differ only in the recorded attention
//! level (0.0 for passive scoring reads, caller-supplied otherwise). The log
//! feeds the frequency, attention, temporal-pattern and novelty factors.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::constants::DEFAULT_ACCESS_HISTORY_MAX;

/// A single recorded access: when, and with how much user attention
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub attention: f32,
}

/// Coarse-locked access tracker shared by the working set and the scorer
///
/// One lock over the whole map is sufficient at working-set scale; per-item
/// locks would buy nothing under a few hundred items.
pub struct AccessHistory {
    records: RwLock<HashMap<String, VecDeque<AccessRecord>>>,
    max_length: usize,
}

impl AccessHistory {
    pub fn new(max_length: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_length,
        }
    }

    /// Record a passive access (scoring read), attention 0.0
    pub fn record_access(&self, id: &str, timestamp: DateTime<Utc>) {
        self.push(
            id,
            AccessRecord {
                timestamp,
                attention: 0.0,
            },
        );
    }

    /// Record an explicit user-attention signal
    pub fn record_attention(&self, id: &str, attention: f32, timestamp: DateTime<Utc>) {
        self.push(
            id,
            AccessRecord {
                timestamp,
                attention: attention.clamp(0.0, 1.0),
            },
        );
    }

    fn push(&self, id: &str, record: AccessRecord) {
        let mut records = self.records.write();
        let log = records.entry(id.to_string()).or_default();
        log.push_back(record);
        while log.len() > self.max_length {
            log.pop_front();
        }
    }

    /// Number of accesses at or after `cutoff`
    pub fn count_since(&self, id: &str, cutoff: DateTime<Utc>) -> usize {
        self.records
            .read()
            .get(id)
            .map(|log| log.iter().filter(|r| r.timestamp >= cutoff).count())
            .unwrap_or(0)
    }

    /// Mean attention level over accesses at or after `cutoff`
    ///
    /// Returns `None` when no access falls inside the window.
    pub fn mean_attention_since(&self, id: &str, cutoff: DateTime<Utc>) -> Option<f32> {
        let records = self.records.read();
        let log = records.get(id)?;

        let mut sum = 0.0f32;
        let mut count = 0usize;
        for record in log.iter().filter(|r| r.timestamp >= cutoff) {
            sum += record.attention;
            count += 1;
        }

        if count == 0 {
            None
        } else {
            Some(sum / count as f32)
        }
    }

    /// Ordered access timestamps (oldest first) for periodicity detection
    pub fn timestamps(&self, id: &str) -> Vec<DateTime<Utc>> {
        self.records
            .read()
            .get(id)
            .map(|log| log.iter().map(|r| r.timestamp).collect())
            .unwrap_or_default()
    }

    /// Total retained accesses for an item
    pub fn access_count(&self, id: &str) -> usize {
        self.records.read().get(id).map(|log| log.len()).unwrap_or(0)
    }
}

impl Default for AccessHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ACCESS_HISTORY_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_history_is_bounded() {
        let history = AccessHistory::new(5);
        let now = Utc::now();
        for i in 0..12 {
            history.record_access("item", now + Duration::seconds(i));
        }

        assert_eq!(history.access_count("item"), 5);
        // Oldest entries were dropped: remaining timestamps are the last 5
        let stamps = history.timestamps("item");
        assert_eq!(stamps[0], now + Duration::seconds(7));
    }

    #[test]
    fn test_count_since_window() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_access("item", now - Duration::days(10));
        history.record_access("item", now - Duration::days(2));
        history.record_access("item", now);

        assert_eq!(history.count_since("item", now - Duration::days(7)), 2);
        assert_eq!(history.count_since("missing", now - Duration::days(7)), 0);
    }

    #[test]
    fn test_mean_attention_mixes_both_write_paths() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_access("item", now); // passive, attention 0.0
        history.record_attention("item", 0.8, now);

        let mean = history
            .mean_attention_since("item", now - Duration::days(30))
            .unwrap();
        assert!((mean - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_mean_attention_none_without_records() {
        let history = AccessHistory::default();
        assert!(history
            .mean_attention_since("item", Utc::now() - Duration::days(30))
            .is_none());
    }

    #[test]
    fn test_attention_is_clamped() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_attention("item", 3.0, now);

        let mean = history
            .mean_attention_since("item", now - Duration::days(1))
            .unwrap();
        assert!((mean - 1.0).abs() < 1e-6);
    }
}
