//! In-memory book store: resting orders per (venue, instrument) pair.
//!
//! The store is the single owner of the current order set. It supports the
//! three feed-driven mutations (snapshot reset, keyed upsert, keyed delete)
//! and on-demand aggregation into sorted price levels for the depth engine.
//!
//! Design notes:
//! - ahash maps for order lookup, one map per (pair, side)
//! - `price == 0.0` upserts are tombstones and route to delete, mirroring
//!   the feed where a cancel arrives indistinguishably from a zero re-quote
//! - `levels()` rebuilds the aggregation on every call; quoting is rare
//!   relative to updates, so correctness wins over caching

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use crate::types::{EventBatch, Pair, PriceLevel, Side};

/// One resting limit order, as tracked by the book store.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    /// Limit price (> 0; tombstones never rest)
    pub price: f64,
    /// Resting size
    pub size: f64,
    /// Owning account, when reported by the feed
    pub account: Option<String>,
}

/// The order book for a single pair: one order map per side.
#[derive(Debug, Clone, Default)]
pub struct PairBook {
    bids: AHashMap<String, RestingOrder>,
    asks: AHashMap<String, RestingOrder>,
}

impl PairBook {
    fn side(&self, side: Side) -> &AHashMap<String, RestingOrder> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut AHashMap<String, RestingOrder> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Total resting orders on both sides.
    pub fn order_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Look up a resting order by (side, id).
    pub fn get(&self, side: Side, order_id: &str) -> Option<&RestingOrder> {
        self.side(side).get(order_id)
    }

    /// Aggregate one side into price-priority-ordered levels.
    ///
    /// Bids come back by descending price, asks by ascending price. Each
    /// call recomputes from the current order set.
    pub fn levels(&self, side: Side) -> Vec<PriceLevel> {
        let mut sums: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();
        for order in self.side(side).values() {
            *sums.entry(OrderedFloat(order.price)).or_insert(0.0) += order.size;
        }

        let build = |(price, size): (OrderedFloat<f64>, f64)| PriceLevel::new(price.0, size);
        if side.is_bid() {
            sums.into_iter().rev().map(build).collect()
        } else {
            sums.into_iter().map(build).collect()
        }
    }

    /// Best price on a side (highest bid / lowest ask), if any.
    pub fn best_price(&self, side: Side) -> Option<f64> {
        let prices = self.side(side).values().map(|o| OrderedFloat(o.price));
        let best = if side.is_bid() {
            prices.max()
        } else {
            prices.min()
        };
        best.map(|p| p.0)
    }
}

/// Keyed store of order books, one per (venue, instrument) pair.
///
/// Pairs are fully isolated: a snapshot reset for one pair never touches
/// another. Books are created lazily on the first event for a pair.
#[derive(Debug, Clone, Default)]
pub struct BookStore {
    books: AHashMap<Pair, PairBook>,
}

impl BookStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all orders for a pair.
    ///
    /// Called exactly once before applying a snapshot batch's orders.
    pub fn reset(&mut self, pair: &Pair) {
        if let Some(book) = self.books.get_mut(pair) {
            book.bids.clear();
            book.asks.clear();
        }
    }

    /// Insert or fully replace the order keyed by (pair, side, id).
    ///
    /// A zero price is a tombstone and performs a delete instead.
    pub fn upsert(
        &mut self,
        pair: &Pair,
        side: Side,
        order_id: &str,
        price: f64,
        size: f64,
        account: Option<String>,
    ) {
        if price == 0.0 {
            self.delete(pair, order_id);
            return;
        }

        let book = self.books.entry(pair.clone()).or_default();
        book.side_mut(side).insert(
            order_id.to_string(),
            RestingOrder {
                price,
                size,
                account,
            },
        );
    }

    /// Remove the order with this id from the pair, on whichever side it
    /// rests. No-op when absent: cancels for already-removed or never-seen
    /// orders are expected during replay.
    ///
    /// Returns true when an order was actually removed.
    pub fn delete(&mut self, pair: &Pair, order_id: &str) -> bool {
        let Some(book) = self.books.get_mut(pair) else {
            return false;
        };
        let bid = book.bids.remove(order_id).is_some();
        let ask = book.asks.remove(order_id).is_some();
        bid || ask
    }

    /// Apply a normalized batch, events strictly in array order.
    ///
    /// For a snapshot batch the reset runs exactly once, before any upsert
    /// from the batch.
    pub fn apply_batch(&mut self, batch: &EventBatch) {
        if batch.is_snapshot {
            self.reset(&batch.pair);
        }
        for event in &batch.events {
            if event.is_tombstone() {
                self.delete(&batch.pair, &event.order_id);
            } else {
                self.upsert(
                    &batch.pair,
                    event.side,
                    &event.order_id,
                    event.price,
                    event.size,
                    event.account.clone(),
                );
            }
        }
    }

    /// Aggregated, priority-ordered levels for a (pair, side).
    pub fn levels(&self, pair: &Pair, side: Side) -> Vec<PriceLevel> {
        self.books
            .get(pair)
            .map(|book| book.levels(side))
            .unwrap_or_default()
    }

    /// Best price on a side for a pair, if the side is non-empty.
    pub fn best_price(&self, pair: &Pair, side: Side) -> Option<f64> {
        self.books.get(pair).and_then(|book| book.best_price(side))
    }

    /// The book for one pair, if any event has been seen for it.
    pub fn pair_book(&self, pair: &Pair) -> Option<&PairBook> {
        self.books.get(pair)
    }

    /// Number of resting orders for a pair.
    pub fn order_count(&self, pair: &Pair) -> usize {
        self.books.get(pair).map_or(0, |b| b.order_count())
    }

    /// Number of pairs with a book (possibly empty after a reset).
    pub fn pair_count(&self) -> usize {
        self.books.len()
    }

    /// Iterate over tracked pairs.
    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.books.keys()
    }
}
