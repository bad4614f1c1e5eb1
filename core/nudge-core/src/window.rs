//! Rolling-window event counter.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Counts discrete events (tab switches) inside a rolling time window.
///
/// Eviction is lazy: stale entries are dropped when the count is read, which
/// happens on every classification cycle.
#[derive(Debug, Clone, Default)]
pub struct SlidingWindowCounter {
    events: VecDeque<DateTime<Utc>>,
}

impl SlidingWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: DateTime<Utc>) {
        self.events.push_back(timestamp);
    }

    /// Drops entries older than `now - window_ms` and returns what remains.
    /// An entry exactly at the cutoff is still counted.
    pub fn count_recent(&mut self, now: DateTime<Utc>, window_ms: u64) -> usize {
        let window = Duration::milliseconds(i64::try_from(window_ms).unwrap_or(i64::MAX));
        if let Some(cutoff) = now.checked_sub_signed(window) {
            self.events.retain(|timestamp| *timestamp >= cutoff);
        }
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Entries currently held, including any not yet evicted.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_760_000_000_000 + ms).unwrap()
    }

    #[test]
    fn empty_counter_counts_zero() {
        let mut counter = SlidingWindowCounter::new();
        assert_eq!(counter.count_recent(at(0), 45_000), 0);
    }

    #[test]
    fn counts_events_inside_window() {
        let mut counter = SlidingWindowCounter::new();
        counter.record(at(0));
        counter.record(at(10_000));
        counter.record(at(20_000));
        assert_eq!(counter.count_recent(at(30_000), 45_000), 3);
    }

    #[test]
    fn evicts_events_outside_window_on_read() {
        let mut counter = SlidingWindowCounter::new();
        counter.record(at(0));
        counter.record(at(10_000));
        counter.record(at(50_000));

        assert_eq!(counter.len(), 3);
        assert_eq!(counter.count_recent(at(60_000), 45_000), 1);
        assert_eq!(counter.len(), 1);
    }

    #[test]
    fn entry_at_cutoff_is_kept() {
        let mut counter = SlidingWindowCounter::new();
        counter.record(at(0));
        assert_eq!(counter.count_recent(at(45_000), 45_000), 1);
        assert_eq!(counter.count_recent(at(45_001), 45_000), 0);
    }

    #[test]
    fn clear_empties_counter() {
        let mut counter = SlidingWindowCounter::new();
        counter.record(at(0));
        counter.clear();
        assert!(counter.is_empty());
        assert_eq!(counter.count_recent(at(1), 45_000), 0);
    }
}
