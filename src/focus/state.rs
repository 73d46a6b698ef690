use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scoring::{percent, rounded_mean};
use crate::timer::Stopwatch;

/// Counts for one closed sampling bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketMetric {
    pub hits: u32,
    pub total: u32,
    pub focus_ratio: u8,
}

impl BucketMetric {
    pub fn from_counts(hits: u32, total: u32) -> Self {
        Self {
            hits,
            total,
            focus_ratio: percent(hits as usize, total as usize),
        }
    }
}

/// Everything one monitoring session accumulates.
#[derive(Debug, Clone, Default)]
pub struct FocusState {
    pub running: bool,
    /// Bumped on every start and stop; samples and ticks carry the epoch they
    /// were scheduled under and are dropped when it no longer matches.
    pub epoch: u64,
    hits: u32,
    total: u32,
    history: Vec<BucketMetric>,
    current_ratio: u8,
    running_average: u8,
    pub stopwatch: Stopwatch,
}

impl FocusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears counters and history and starts a new session. Returns its epoch.
    pub fn begin(&mut self, start_at: DateTime<Utc>) -> u64 {
        let epoch = self.epoch.wrapping_add(1);
        *self = Self {
            running: true,
            epoch,
            ..Self::default()
        };
        self.stopwatch.begin(start_at);
        epoch
    }

    pub fn record_sample(&mut self, hit: bool) {
        self.total = self.total.saturating_add(1);
        if hit {
            self.hits = self.hits.saturating_add(1);
        }
    }

    /// Snapshots the open bucket, appends it to the history and starts the
    /// next one from zero.
    pub fn close_bucket(&mut self) -> BucketMetric {
        let bucket = BucketMetric::from_counts(self.hits, self.total);
        self.hits = 0;
        self.total = 0;
        self.history.push(bucket);
        self.current_ratio = bucket.focus_ratio;
        self.running_average = self.average();
        bucket
    }

    /// Rounded mean of every closed bucket's ratio, 0 before the first one.
    pub fn average(&self) -> u8 {
        let ratios: Vec<u8> = self.history.iter().map(|b| b.focus_ratio).collect();
        rounded_mean(&ratios)
    }

    /// Ends the session and returns the final average.
    pub fn finish(&mut self) -> u8 {
        self.running = false;
        self.epoch = self.epoch.wrapping_add(1);
        self.stopwatch.stop();
        self.running_average = self.average();
        self.running_average
    }

    pub fn current_ratio(&self) -> u8 {
        self.current_ratio
    }

    pub fn running_average(&self) -> u8 {
        self.running_average
    }

    pub fn history(&self) -> &[BucketMetric] {
        &self.history
    }

    /// Counts of the bucket still being filled.
    pub fn open_counts(&self) -> (u32, u32) {
        (self.hits, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(state: &mut FocusState, hits: u32, total: u32) {
        for i in 0..total {
            state.record_sample(i < hits);
        }
    }

    #[test]
    fn empty_bucket_has_zero_ratio() {
        assert_eq!(BucketMetric::from_counts(0, 0).focus_ratio, 0);
    }

    #[test]
    fn ratio_is_rounded_percentage() {
        assert_eq!(BucketMetric::from_counts(1, 3).focus_ratio, 33);
        assert_eq!(BucketMetric::from_counts(2, 3).focus_ratio, 67);
        assert_eq!(BucketMetric::from_counts(5, 5).focus_ratio, 100);
    }

    #[test]
    fn running_average_follows_each_bucket() {
        let mut state = FocusState::new();
        state.begin(Utc::now());

        let mut averages = Vec::new();
        for (hits, total) in [(8, 10), (6, 10), (10, 10)] {
            fill(&mut state, hits, total);
            state.close_bucket();
            averages.push(state.running_average());
        }

        assert_eq!(averages, vec![80, 70, 80]);
        assert_eq!(state.current_ratio(), 100);
    }

    #[test]
    fn closing_a_bucket_resets_counters() {
        let mut state = FocusState::new();
        state.begin(Utc::now());
        fill(&mut state, 3, 4);
        assert_eq!(state.open_counts(), (3, 4));

        let bucket = state.close_bucket();
        assert_eq!((bucket.hits, bucket.total), (3, 4));
        assert_eq!(state.open_counts(), (0, 0));
    }

    #[test]
    fn finish_without_buckets_is_zero() {
        let mut state = FocusState::new();
        state.begin(Utc::now());
        fill(&mut state, 5, 5);
        assert_eq!(state.finish(), 0);
        assert!(!state.running);
    }

    #[test]
    fn begin_clears_previous_session_and_moves_epoch() {
        let mut state = FocusState::new();
        let first = state.begin(Utc::now());
        fill(&mut state, 1, 1);
        state.close_bucket();
        state.finish();

        let second = state.begin(Utc::now());
        assert!(second > first);
        assert!(state.history().is_empty());
        assert_eq!(state.running_average(), 0);
    }
}
