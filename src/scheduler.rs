//! Tick scheduler: decides which batches are quote-worthy.
//!
//! The scheduler floors each batch timestamp to a fixed-width bucket
//! (default one minute) and keeps, per pair, the bucket of the previous
//! batch. A batch is quote-worthy iff its bucket differs from the stored
//! one, so exactly the first batch observed in each new bucket triggers a
//! quote, regardless of how many batches fall inside the bucket.
//!
//! State lifecycle: an entry is created on the first batch seen for a pair
//! (which always counts as changed), updated on every batch, and never
//! shared across pairs.

use ahash::AHashMap;
use chrono::{DateTime, Utc};

use crate::types::Pair;

/// Default bucket width: one minute.
pub const DEFAULT_BUCKET_SECS: i64 = 60;

/// Per-pair bucket tracker.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    bucket_secs: i64,
    previous: AHashMap<Pair, i64>,
}

impl TickScheduler {
    /// Create a scheduler with the default one-minute bucket.
    pub fn new() -> Self {
        Self::with_bucket_secs(DEFAULT_BUCKET_SECS)
    }

    /// Create a scheduler with a custom bucket width in seconds.
    ///
    /// Widths are validated by `QuoterConfig`; this constructor assumes a
    /// positive value.
    pub fn with_bucket_secs(bucket_secs: i64) -> Self {
        debug_assert!(bucket_secs > 0);
        Self {
            bucket_secs,
            previous: AHashMap::new(),
        }
    }

    /// Bucket width in seconds.
    #[inline]
    pub fn bucket_secs(&self) -> i64 {
        self.bucket_secs
    }

    /// Bucket index for a timestamp (floor division of epoch seconds).
    #[inline]
    pub fn bucket_of(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp().div_euclid(self.bucket_secs)
    }

    /// Observe a batch timestamp for a pair; returns whether the batch is
    /// quote-worthy.
    ///
    /// The first batch for a pair always is. Afterwards only the first
    /// batch of each new bucket is.
    pub fn observe(&mut self, pair: &Pair, timestamp: DateTime<Utc>) -> bool {
        let bucket = self.bucket_of(timestamp);
        match self.previous.get_mut(pair) {
            Some(prev) => {
                let changed = *prev != bucket;
                *prev = bucket;
                changed
            }
            None => {
                self.previous.insert(pair.clone(), bucket);
                true
            }
        }
    }

    /// Number of pairs with scheduler state.
    pub fn pair_count(&self) -> usize {
        self.previous.len()
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_first_batch_is_quote_worthy() {
        let mut sched = TickScheduler::new();
        let pair = Pair::new("Mango Markets", "SOL/USDC");
        assert!(sched.observe(&pair, ts(9, 30, 0)));
    }

    #[test]
    fn test_same_bucket_not_quote_worthy() {
        let mut sched = TickScheduler::new();
        let pair = Pair::new("Mango Markets", "SOL/USDC");
        assert!(sched.observe(&pair, ts(9, 30, 0)));
        assert!(!sched.observe(&pair, ts(9, 30, 15)));
        assert!(!sched.observe(&pair, ts(9, 30, 59)));
    }

    #[test]
    fn test_new_bucket_is_quote_worthy() {
        let mut sched = TickScheduler::new();
        let pair = Pair::new("Mango Markets", "SOL/USDC");
        assert!(sched.observe(&pair, ts(9, 30, 59)));
        assert!(sched.observe(&pair, ts(9, 31, 0)));
        assert!(!sched.observe(&pair, ts(9, 31, 30)));
    }

    #[test]
    fn test_pairs_tracked_independently() {
        let mut sched = TickScheduler::new();
        let sol = Pair::new("Mango Markets", "SOL/USDC");
        let btc = Pair::new("Mango Markets", "BTC/USDC");

        assert!(sched.observe(&sol, ts(9, 30, 0)));
        assert!(sched.observe(&btc, ts(9, 30, 10)));
        assert!(!sched.observe(&sol, ts(9, 30, 20)));
        assert!(!sched.observe(&btc, ts(9, 30, 30)));
        assert_eq!(sched.pair_count(), 2);
    }

    #[test]
    fn test_custom_bucket_width() {
        let mut sched = TickScheduler::with_bucket_secs(10);
        let pair = Pair::new("v", "i");
        assert!(sched.observe(&pair, ts(0, 0, 0)));
        assert!(!sched.observe(&pair, ts(0, 0, 9)));
        assert!(sched.observe(&pair, ts(0, 0, 10)));
    }
}
