//! Feed source abstraction for flexible log ingestion.
//!
//! The replay pipeline only needs an ordered stream of raw messages; this
//! trait decouples it from where the log lives. Shipped sources:
//!
//! - [`VecSource`]: in-memory, for tests and simulations
//! - [`SqliteLogSource`]: the `messages` table of a SQLite log store,
//!   read eagerly in insertion order
//!
//! How messages were ingested or validated at the wire level is out of
//! scope; a source only promises per-pair log order.

use crate::error::Result;
use crate::store::SqliteStore;
use crate::types::{Pair, RawMessage};

/// Metadata about a feed source.
///
/// Useful for logging, progress reporting, and organizing output.
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    /// Pair filter applied at the source, if any
    pub pair: Option<Pair>,
    /// Provider name (e.g. "sqlite", "memory")
    pub provider: Option<String>,
    /// Known message count (for progress tracking)
    pub message_count: Option<u64>,
}

impl SourceMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pair filter.
    pub fn with_pair(mut self, pair: Pair) -> Self {
        self.pair = Some(pair);
        self
    }

    /// Set the provider.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set the message count.
    pub fn with_message_count(mut self, count: u64) -> Self {
        self.message_count = Some(count);
        self
    }
}

/// Trait for ordered raw-message sources.
///
/// `messages()` consumes `self` to allow single-pass iteration; metadata
/// should be populated before it is called.
pub trait FeedSource {
    /// The iterator type for messages.
    type MessageIter: Iterator<Item = RawMessage>;

    /// Consume the source and return an iterator over messages.
    fn messages(self) -> Result<Self::MessageIter>;

    /// Get metadata about the source.
    fn metadata(&self) -> &SourceMetadata;
}

/// A simple in-memory source for tests and simulations.
pub struct VecSource {
    messages: Vec<RawMessage>,
    metadata: SourceMetadata,
}

impl VecSource {
    /// Create a new vector source.
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_provider("memory")
                .with_message_count(messages.len() as u64),
            messages,
        }
    }

    /// Set custom metadata.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl FeedSource for VecSource {
    type MessageIter = std::vec::IntoIter<RawMessage>;

    fn messages(self) -> Result<Self::MessageIter> {
        Ok(self.messages.into_iter())
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

/// Source backed by the `messages` table of a SQLite log store.
///
/// The log is read eagerly at construction; replay is a finite batch job,
/// not a live service, so holding the filtered slice in memory keeps the
/// pipeline free of mid-computation I/O.
pub struct SqliteLogSource {
    messages: Vec<RawMessage>,
    metadata: SourceMetadata,
}

impl SqliteLogSource {
    /// Read the log from a store, optionally filtered to one pair.
    pub fn new(store: &SqliteStore, filter: Option<&Pair>) -> Result<Self> {
        let messages = store.read_messages(filter)?;
        let mut metadata = SourceMetadata::new()
            .with_provider("sqlite")
            .with_message_count(messages.len() as u64);
        if let Some(pair) = filter {
            metadata = metadata.with_pair(pair.clone());
        }
        Ok(Self { messages, metadata })
    }
}

impl FeedSource for SqliteLogSource {
    type MessageIter = std::vec::IntoIter<RawMessage>;

    fn messages(self) -> Result<Self::MessageIter> {
        Ok(self.messages.into_iter())
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(instrument: &str) -> RawMessage {
        RawMessage::new(
            "Mango Markets",
            instrument,
            json!({"type": "open", "timestamp": "2024-01-01T09:30:00.000Z", "side": "buy",
                   "price": 9.0, "size": 1.0, "orderId": "o1"}),
        )
    }

    #[test]
    fn test_vec_source_basic() {
        let source = VecSource::new(vec![msg("SOL/USDC"), msg("BTC/USDC")]);
        assert_eq!(source.metadata().message_count, Some(2));
        assert_eq!(source.metadata().provider.as_deref(), Some("memory"));

        let collected: Vec<_> = source.messages().unwrap().collect();
        assert_eq!(collected.len(), 2);
    }

    #[test]
    fn test_vec_source_empty() {
        let source = VecSource::new(Vec::new());
        assert_eq!(source.metadata().message_count, Some(0));
        assert!(source.messages().unwrap().next().is_none());
    }

    #[test]
    fn test_sqlite_log_source_order_and_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append_message(&msg("SOL/USDC")).unwrap();
        store.append_message(&msg("BTC/USDC")).unwrap();
        store.append_message(&msg("SOL/USDC")).unwrap();

        let all = SqliteLogSource::new(&store, None).unwrap();
        assert_eq!(all.metadata().message_count, Some(3));

        let pair = Pair::new("Mango Markets", "SOL/USDC");
        let filtered = SqliteLogSource::new(&store, Some(&pair)).unwrap();
        assert_eq!(filtered.metadata().pair.as_ref(), Some(&pair));
        let collected: Vec<_> = filtered.messages().unwrap().collect();
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(|m| m.instrument == "SOL/USDC"));
    }
}
