//! # L3 Depth Quoter
//!
//! Order book reconstruction and bucketed liquidity-depth quoting over a
//! sequential log of L3 exchange feed events.
//!
//! The crate replays a feed log (full `l3snapshot` messages plus
//! incremental `open`/`done` events), maintains one order book per
//! (venue, instrument) pair, and once per fixed time bucket prices a set of
//! hypothetical market orders against the reconstructed book, appending the
//! resulting quote rows to SQLite.
//!
//! ## Processing model
//!
//! - **Sequential, single-writer**: events for a pair are applied strictly
//!   in timestamp order; a regression is fatal for the pair.
//! - **Batched**: events sharing one (pair, timestamp) form a homogeneous
//!   batch (a snapshot expansion or incremental events, never both).
//! - **Bucketed quoting**: exactly the first batch in each time bucket
//!   triggers a quote, computed over the book state after that batch.
//! - **Idempotent**: replaying the same log produces identical tables;
//!   quote writes overwrite their own keys.
//!
//! ## Quick start
//!
//! ```rust
//! use l3_depth_quoter::{Pipeline, QuoterConfig, RawMessage, SqliteStore, VecSource};
//! use serde_json::json;
//!
//! let messages = vec![
//!     RawMessage::new("Mango Markets", "SOL/USDC", json!({
//!         "type": "open", "timestamp": "2024-01-01T09:30:00.000Z",
//!         "side": "sell", "price": 10.0, "size": 5.0, "orderId": "a1",
//!     })),
//!     RawMessage::new("Mango Markets", "SOL/USDC", json!({
//!         "type": "open", "timestamp": "2024-01-01T09:30:01.000Z",
//!         "side": "buy", "price": 9.0, "size": 5.0, "orderId": "b1",
//!     })),
//! ];
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let config = QuoterConfig::new().with_target_sizes(vec![25.0]);
//! let mut pipeline = Pipeline::new(config, store).unwrap();
//! let stats = pipeline.run(VecSource::new(messages)).unwrap();
//! assert_eq!(stats.batches_applied, 2);
//! ```
//!
//! ## Module overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Core types: `Pair`, `Side`, `OrderEvent`, `EventBatch`, `Quote` |
//! | [`normalizer`] | Raw feed messages → homogeneous event batches |
//! | [`book`] | In-memory book store with on-demand level aggregation |
//! | [`scheduler`] | Per-pair bucket tracking and quote-worthiness |
//! | [`depth`] | Level sweep / fill simulation and quote assembly |
//! | [`store`] | SQLite persistence: order mirror, quote sink, message log |
//! | [`source`] | Feed source trait, in-memory and SQLite log sources |
//! | [`pipeline`] | The replay driver wiring everything together |
//! | [`warnings`] | Warning tracking for recoverable data-quality issues |

pub mod book;
pub mod depth;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;
pub mod warnings;

// Re-exports - Core types
pub use error::{QuoterError, Result};
pub use types::{
    format_feed_timestamp, EventBatch, OrderEvent, Pair, PriceLevel, Quote, RawMessage, Side,
};

// Re-exports - Components
pub use book::{BookStore, PairBook, RestingOrder};
pub use depth::{sweep, DepthEngine, DEFAULT_TARGET_SIZES};
pub use normalizer::{Normalizer, NormalizerStats};
pub use scheduler::{TickScheduler, DEFAULT_BUCKET_SECS};
pub use store::SqliteStore;

// Re-exports - Pipeline
pub use pipeline::{Pipeline, PipelineStats, QuoterConfig};

// Re-exports - Source abstraction
pub use source::{FeedSource, SourceMetadata, SqliteLogSource, VecSource};

// Re-exports - Warnings
pub use warnings::{Warning, WarningCategory, WarningSummary, WarningTracker};
