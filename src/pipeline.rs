//! Replay pipeline: wires normalizer, book store, scheduler, depth engine,
//! and the SQLite store into one sequential, single-writer job.
//!
//! Data flows one way: raw messages → normalizer → book store (always
//! updated, in memory and in the SQLite mirror) → depth engine for
//! quote-worthy batches → quote sink. Transactions commit at bucket
//! boundaries: everything since the previous quote-worthy batch plus the
//! new quote rows becomes visible atomically, so a crash never exposes a
//! partially-applied batch. On restart the book reloads from the committed
//! orders table and the log is replayed from there; all writes are
//! idempotent at (pair, timestamp) granularity.

use crate::book::BookStore;
use crate::depth::{DepthEngine, DEFAULT_TARGET_SIZES};
use crate::error::{QuoterError, Result};
use crate::normalizer::Normalizer;
use crate::scheduler::{TickScheduler, DEFAULT_BUCKET_SECS};
use crate::source::FeedSource;
use crate::store::SqliteStore;
use crate::types::{EventBatch, Pair};
use crate::warnings::{WarningCategory, WarningTracker};

/// Configuration for a replay run.
#[derive(Debug, Clone)]
pub struct QuoterConfig {
    /// Target notional sizes to quote, all strictly positive
    pub target_sizes: Vec<f64>,
    /// Bucket width in seconds for quote throttling
    pub bucket_secs: i64,
    /// Restrict processing to one (venue, instrument) pair
    pub pair_filter: Option<Pair>,
}

impl Default for QuoterConfig {
    fn default() -> Self {
        Self {
            target_sizes: DEFAULT_TARGET_SIZES.to_vec(),
            bucket_secs: DEFAULT_BUCKET_SECS,
            pair_filter: None,
        }
    }
}

impl QuoterConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target size set.
    pub fn with_target_sizes(mut self, sizes: Vec<f64>) -> Self {
        self.target_sizes = sizes;
        self
    }

    /// Set the bucket width in seconds.
    pub fn with_bucket_secs(mut self, secs: i64) -> Self {
        self.bucket_secs = secs;
        self
    }

    /// Restrict processing to one pair.
    pub fn with_pair_filter(mut self, pair: Pair) -> Self {
        self.pair_filter = Some(pair);
        self
    }

    /// Validate the configuration (target sizes are validated separately
    /// when the depth engine is built).
    pub fn validate(&self) -> Result<()> {
        if self.bucket_secs <= 0 {
            return Err(QuoterError::Config(format!(
                "bucket width must be > 0 seconds, got {}",
                self.bucket_secs
            )));
        }
        Ok(())
    }
}

/// Counters for monitoring a replay run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    /// Raw messages read from the source (after the pair filter)
    pub messages_seen: u64,
    /// Messages with unrecognized payload types (skipped)
    pub unknown_skipped: u64,
    /// Events or snapshot entries dropped as malformed
    pub malformed_dropped: u64,
    /// Batches rejected wholesale (mixed snapshot/incremental)
    pub batches_rejected: u64,
    /// Batches applied to the book
    pub batches_applied: u64,
    /// Snapshot batches among those applied
    pub snapshots_applied: u64,
    /// Individual events applied
    pub events_applied: u64,
    /// Quote rows written
    pub quotes_written: u64,
    /// Transaction commits (bucket boundaries plus the final flush)
    pub commits: u64,
}

/// The sequential replay pipeline.
pub struct Pipeline {
    config: QuoterConfig,
    book: BookStore,
    scheduler: TickScheduler,
    engine: DepthEngine,
    store: SqliteStore,
    warnings: WarningTracker,
    stats: PipelineStats,
}

impl Pipeline {
    /// Build a pipeline over a store.
    ///
    /// The in-memory book is seeded from the persisted orders table, so a
    /// run can resume after a crash from the last committed bucket.
    pub fn new(config: QuoterConfig, store: SqliteStore) -> Result<Self> {
        config.validate()?;
        let engine = DepthEngine::with_targets(config.target_sizes.clone())?;
        let scheduler = TickScheduler::with_bucket_secs(config.bucket_secs);
        let book = store.load_book()?;
        Ok(Self {
            config,
            book,
            scheduler,
            engine,
            store,
            warnings: WarningTracker::new(),
            stats: PipelineStats::default(),
        })
    }

    /// Replay a feed source to completion.
    ///
    /// Recoverable issues (malformed events, mixed batches) are logged and
    /// skipped; `OutOfOrder` and storage failures abort the run with the
    /// open transaction rolled back.
    pub fn run<S: FeedSource>(&mut self, source: S) -> Result<PipelineStats> {
        if let Some(count) = source.metadata().message_count {
            log::info!("replaying {count} raw messages");
        }

        let mut normalizer = Normalizer::new();
        for msg in source.messages()? {
            if let Some(filter) = &self.config.pair_filter {
                if msg.venue != filter.venue || msg.instrument != filter.instrument {
                    continue;
                }
            }
            self.stats.messages_seen += 1;

            match normalizer.push(&msg) {
                Ok(Some(batch)) => self.guarded_process(&batch)?,
                Ok(None) => {}
                Err(err) if err.is_recoverable() => self.note_rejection(err),
                Err(err) => {
                    self.store.rollback()?;
                    return Err(err);
                }
            }
        }
        for batch in normalizer.finish() {
            self.guarded_process(&batch)?;
        }

        // Flush the trailing partial bucket, if one is open.
        if self.store.in_transaction() {
            self.store.commit()?;
            self.stats.commits += 1;
        }

        let norm_stats = normalizer.stats();
        self.stats.unknown_skipped = norm_stats.unknown_skipped;
        self.stats.malformed_dropped += norm_stats.malformed_entries;

        log::info!(
            "replay done: {} batches applied, {} quotes written, {} warnings",
            self.stats.batches_applied,
            self.stats.quotes_written,
            self.warnings.total()
        );
        Ok(self.stats)
    }

    /// Process one batch, rolling back the open transaction on failure so
    /// the committed state stays at the last bucket boundary.
    fn guarded_process(&mut self, batch: &EventBatch) -> Result<()> {
        if let Err(err) = self.process_batch(batch) {
            self.store.rollback()?;
            return Err(err);
        }
        Ok(())
    }

    fn process_batch(&mut self, batch: &EventBatch) -> Result<()> {
        self.store.begin()?;
        self.book.apply_batch(batch);
        self.store.apply_batch(batch)?;

        self.stats.batches_applied += 1;
        self.stats.events_applied += batch.len() as u64;
        if batch.is_snapshot {
            self.stats.snapshots_applied += 1;
        }

        // Quote-worthiness is decided after the batch's events are applied:
        // the quote reflects the book as of the first update in the bucket.
        if self.scheduler.observe(&batch.pair, batch.timestamp) {
            for quote in self.engine.quote_pair(&self.book, &batch.pair, batch.timestamp) {
                self.store.insert_quote(&quote)?;
                self.stats.quotes_written += 1;
            }
            self.store.commit()?;
            self.stats.commits += 1;
            log::debug!(
                "{}: quoted bucket at {}",
                batch.pair,
                crate::types::format_feed_timestamp(batch.timestamp)
            );
        }
        Ok(())
    }

    fn note_rejection(&mut self, err: QuoterError) {
        let (category, pair, timestamp) = match &err {
            QuoterError::MalformedEvent {
                venue, instrument, ..
            } => (
                WarningCategory::MalformedEvent,
                Some(format!("{venue}/{instrument}")),
                None,
            ),
            QuoterError::MixedBatch {
                venue,
                instrument,
                timestamp,
            } => {
                self.stats.batches_rejected += 1;
                (
                    WarningCategory::MixedBatch,
                    Some(format!("{venue}/{instrument}")),
                    Some(timestamp.clone()),
                )
            }
            _ => (WarningCategory::Other, None, None),
        };
        if matches!(category, WarningCategory::MalformedEvent) {
            self.stats.malformed_dropped += 1;
        }
        log::warn!("dropping: {err}");
        self.warnings.record(category, err.to_string(), pair, timestamp);
    }

    /// Run statistics so far.
    #[inline]
    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Warnings recorded so far.
    #[inline]
    pub fn warnings(&self) -> &WarningTracker {
        &self.warnings
    }

    /// The in-memory book store.
    #[inline]
    pub fn book(&self) -> &BookStore {
        &self.book
    }

    /// The backing SQLite store.
    #[inline]
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Tear down the pipeline and hand back the store.
    pub fn into_store(self) -> SqliteStore {
        self.store
    }
}
