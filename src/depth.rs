//! Depth/fill engine: prices hypothetical market orders against the book.
//!
//! At each quote-worthy instant the engine aggregates the book into sorted
//! price levels and sweeps them in priority order (asks ascending for a
//! buy, bids descending for a sell), accumulating notional volume
//! (`price * size`) until the target S is reached.
//!
//! Unit note: S is compared against cumulative *notional* volume, and the
//! weighted-average numerator is `Σ price * consumed-notional`. That is the
//! arithmetic the upstream system defined, carried through unchanged; see
//! `sweep_target_is_notional_not_quantity` in the tests.

use chrono::{DateTime, Utc};

use crate::book::BookStore;
use crate::error::{QuoterError, Result};
use crate::types::{Pair, PriceLevel, Quote, Side};

/// Target sizes used when none are configured, in notional volume units.
pub const DEFAULT_TARGET_SIZES: [f64; 5] = [1_000.0, 10_000.0, 25_000.0, 50_000.0, 100_000.0];

/// Sweep-based liquidity pricer for a fixed set of target sizes.
#[derive(Debug, Clone)]
pub struct DepthEngine {
    targets: Vec<f64>,
}

impl DepthEngine {
    /// Create an engine with the default target size set.
    pub fn new() -> Self {
        Self {
            targets: DEFAULT_TARGET_SIZES.to_vec(),
        }
    }

    /// Create an engine with custom target sizes.
    ///
    /// Every target must be strictly positive: a zero or negative target is
    /// a configuration error, not a quotable size.
    pub fn with_targets(targets: Vec<f64>) -> Result<Self> {
        if targets.is_empty() {
            return Err(QuoterError::Config("target size set is empty".into()));
        }
        if let Some(bad) = targets.iter().find(|t| !t.is_finite() || **t <= 0.0) {
            return Err(QuoterError::Config(format!(
                "target sizes must be finite and > 0, got {bad}"
            )));
        }
        Ok(Self { targets })
    }

    /// The configured target sizes.
    #[inline]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Compute one quote per configured target for a pair.
    ///
    /// Reads a consistent snapshot of the book (levels are materialized
    /// once per side) and never mutates it. An empty side yields null for
    /// the fields that need it; the other fields are still computed. When
    /// both sides are empty there is nothing to price and no quotes are
    /// produced at all, rather than rows of all-null fields.
    pub fn quote_pair(
        &self,
        book: &BookStore,
        pair: &Pair,
        timestamp: DateTime<Utc>,
    ) -> Vec<Quote> {
        let asks = book.levels(pair, Side::Ask);
        let bids = book.levels(pair, Side::Bid);
        if asks.is_empty() && bids.is_empty() {
            return Vec::new();
        }

        let mid_price = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / 2.0),
            _ => None,
        };

        self.targets
            .iter()
            .map(|&target| Quote {
                pair: pair.clone(),
                target,
                mid_price,
                weighted_average_buy_price: sweep(&asks, target),
                weighted_average_sell_price: sweep(&bids, target),
                timestamp,
            })
            .collect()
    }
}

impl Default for DepthEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Sweep priority-ordered levels to fill a target notional volume.
///
/// Walks levels accumulating notional volume. Levels before the crossing
/// level are consumed whole; the crossing level (the one that takes the
/// running total to >= target) contributes exactly `target - cum_before`,
/// and everything after it contributes nothing.
///
/// Returns `Some(weighted average) = Σ(price * consumed) / target` when the
/// side holds at least `target` notional, `None` otherwise; a partial fill
/// is never reported as a price.
pub fn sweep(levels: &[PriceLevel], target: f64) -> Option<f64> {
    let mut cum = 0.0;
    let mut numerator = 0.0;

    for level in levels {
        let cum_before = cum;
        cum += level.volume;
        if cum < target {
            numerator += level.price * level.volume;
        } else {
            // Crossing level: the fill completes here.
            numerator += level.price * (target - cum_before);
            return Some(numerator / target);
        }
    }

    None
}
