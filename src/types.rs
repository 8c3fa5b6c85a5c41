//! Core data types for feed events, order books, and quotes.
//!
//! These types are designed to be:
//! - Cheap to clone where the pipeline needs it (events are small)
//! - Serde-compatible with the upstream L3 feed JSON shapes
//! - Unit-faithful: prices and sizes are reals, exactly as the feed carries
//!   them, with `price == 0.0` reserved as the tombstone convention

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Order side (bid or ask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buy order (bid)
    Bid,
    /// Sell order (ask)
    Ask,
}

impl Side {
    /// Parse a side from a feed string.
    ///
    /// The feed uses `buy`/`sell` on events and `bids`/`asks` on snapshot
    /// arrays; both map onto the canonical sides.
    pub fn from_feed(value: &str) -> Option<Self> {
        match value {
            "buy" | "bids" | "bid" => Some(Side::Bid),
            "sell" | "asks" | "ask" => Some(Side::Ask),
            _ => None,
        }
    }

    /// Canonical column value used by the persisted order table.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Bid => "bids",
            Side::Ask => "asks",
        }
    }

    /// The opposite side.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (venue, instrument) pair, the unit of book isolation.
///
/// All book state, scheduling state, and persisted rows are keyed by a
/// `Pair`; nothing is ever shared across pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Exchange name (e.g. "Mango Markets")
    pub venue: String,
    /// Traded symbol (e.g. "SOL/USDC")
    pub instrument: String,
}

impl Pair {
    /// Create a new pair.
    pub fn new(venue: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            instrument: instrument.into(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.venue, self.instrument)
    }
}

/// A raw feed message as read from the log store.
///
/// The envelope identifies the pair; the payload is the provider's JSON
/// (`type`, `timestamp`, and the event fields). Payloads stay untyped until
/// the normalizer validates them, so one bad message cannot poison the
/// surrounding batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Exchange name
    pub venue: String,
    /// Traded symbol
    pub instrument: String,
    /// Provider JSON payload
    pub payload: Value,
}

impl RawMessage {
    /// Create a new raw message.
    pub fn new(venue: impl Into<String>, instrument: impl Into<String>, payload: Value) -> Self {
        Self {
            venue: venue.into(),
            instrument: instrument.into(),
            payload,
        }
    }

    /// The pair this message belongs to.
    pub fn pair(&self) -> Pair {
        Pair::new(self.venue.clone(), self.instrument.clone())
    }
}

/// One normalized order event.
///
/// Invariant: `price == 0.0` means "remove this id" (a tombstone), never a
/// real resting order. `done` events normalize to tombstones; `open` events
/// with a missing or zero price do too.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    /// Canonical side
    pub side: Side,
    /// Limit price; 0.0 marks a tombstone
    pub price: f64,
    /// Resting size; 0.0 on tombstones
    pub size: f64,
    /// Owning account, when the feed reports one
    pub account: Option<String>,
    /// Exchange order id
    pub order_id: String,
    /// Whether this event came from a full snapshot expansion
    pub is_snapshot: bool,
}

impl OrderEvent {
    /// Whether this event removes an order rather than resting one.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.price == 0.0
    }
}

/// A batch of normalized events sharing one (pair, timestamp).
///
/// Batches are homogeneous: either entirely a snapshot expansion or
/// entirely incremental events. The normalizer rejects mixed batches.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// The pair all events in the batch belong to
    pub pair: Pair,
    /// Feed timestamp shared by every event in the batch
    pub timestamp: DateTime<Utc>,
    /// True when the batch replaces the whole book for the pair
    pub is_snapshot: bool,
    /// Events in feed order
    pub events: Vec<OrderEvent>,
}

impl EventBatch {
    /// Number of events in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch carries no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// One aggregated price level: all resting orders at a price, collapsed.
///
/// Derived inside the depth engine, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevel {
    /// Level price
    pub price: f64,
    /// Summed resting size at this price
    pub size: f64,
    /// Notional volume: `price * size`
    pub volume: f64,
}

impl PriceLevel {
    /// Build a level from a price and its summed size.
    #[inline]
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price,
            size,
            volume: price * size,
        }
    }
}

/// One computed liquidity quote for a (pair, timestamp, target size).
///
/// Append-only: once computed a quote row is written, never mutated.
/// Reprocessing the same batch overwrites the identical key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// The quoted pair
    pub pair: Pair,
    /// Requested notional target size S
    pub target: f64,
    /// (best bid + best ask) / 2; None when either side is empty
    pub mid_price: Option<f64>,
    /// Weighted-average price sweeping the asks; None when unfillable
    pub weighted_average_buy_price: Option<f64>,
    /// Weighted-average price sweeping the bids; None when unfillable
    pub weighted_average_sell_price: Option<f64>,
    /// Timestamp of the batch that triggered the quote
    pub timestamp: DateTime<Utc>,
}

/// Format a timestamp the way the upstream feed writes them.
///
/// RFC 3339 with millisecond precision (`2024-01-01T00:00:00.000Z`); used
/// for persisted quote keys so replays stay byte-identical.
pub fn format_feed_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
