//! SQLite persistence: order mirror, quote sink, and raw message log.
//!
//! Layout matches the deployment target the system replays into:
//!
//! - `orders`: primary key (venue, instrument, side, id); the durable
//!   mirror of the in-memory book store
//! - `quotes`: primary key (venue, instrument, timestamp, size);
//!   append-only, `INSERT OR REPLACE` so reprocessing a batch overwrites
//!   identical keys instead of duplicating them
//! - `messages`: the ordered raw feed log this system reads from
//!   (read-only as far as replay is concerned; a writer helper exists for
//!   tests and ingestion tooling)
//!
//! Transactions are explicit and drawn at bucket granularity by the
//! pipeline: every mutation between two quote-worthy batches plus the
//! resulting quote rows commit together, so a crash never leaves a
//! partially-applied batch visible.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::book::BookStore;
use crate::error::{QuoterError, Result};
use crate::types::{format_feed_timestamp, EventBatch, Pair, Quote, RawMessage, Side};

/// SQLite-backed store for orders, quotes, and the raw message log.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    in_tx: bool,
}

impl SqliteStore {
    /// Open (creating if needed) a store at a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_conn(Connection::open(path)?)
    }

    /// Open an in-memory store (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        let store = Self { conn, in_tx: false };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS orders (
                venue      TEXT NOT NULL,
                instrument TEXT NOT NULL,
                side       TEXT NOT NULL,
                id         TEXT NOT NULL,
                price      REAL NOT NULL,
                size       REAL NOT NULL,
                account    TEXT,
                PRIMARY KEY (venue, instrument, side, id)
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS quotes (
                venue                       TEXT NOT NULL,
                instrument                  TEXT NOT NULL,
                timestamp                   TEXT NOT NULL,
                size                        REAL NOT NULL,
                mid_price                   REAL,
                weighted_average_buy_price  REAL,
                weighted_average_sell_price REAL,
                PRIMARY KEY (venue, instrument, timestamp, size)
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS messages (
                venue      TEXT NOT NULL,
                instrument TEXT NOT NULL,
                content    TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction; no-op when one is already open.
    pub fn begin(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_tx = true;
        }
        Ok(())
    }

    /// Commit the open transaction; no-op when none is open.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("COMMIT")?;
            self.in_tx = false;
        }
        Ok(())
    }

    /// Roll back the open transaction; no-op when none is open.
    pub fn rollback(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("ROLLBACK")?;
            self.in_tx = false;
        }
        Ok(())
    }

    /// Whether a transaction is currently open.
    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.in_tx
    }

    // ========================================================================
    // Order mirror
    // ========================================================================

    /// Remove all persisted orders for a pair (snapshot reset).
    pub fn reset_pair(&self, pair: &Pair) -> Result<()> {
        self.conn.execute(
            "DELETE FROM orders WHERE venue = ?1 AND instrument = ?2",
            params![pair.venue, pair.instrument],
        )?;
        Ok(())
    }

    /// Insert or fully replace the order keyed by (pair, side, id).
    pub fn upsert_order(
        &self,
        pair: &Pair,
        side: Side,
        order_id: &str,
        price: f64,
        size: f64,
        account: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO orders (venue, instrument, side, id, price, size, account)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pair.venue,
                pair.instrument,
                side.as_str(),
                order_id,
                price,
                size,
                account
            ],
        )?;
        Ok(())
    }

    /// Delete the order with this id from both sides of the pair; no-op
    /// when absent.
    pub fn delete_order(&self, pair: &Pair, order_id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM orders WHERE venue = ?1 AND instrument = ?2 AND id = ?3",
            params![pair.venue, pair.instrument, order_id],
        )?;
        Ok(())
    }

    /// Mirror a normalized batch into the orders table, same semantics as
    /// `BookStore::apply_batch`.
    pub fn apply_batch(&self, batch: &EventBatch) -> Result<()> {
        if batch.is_snapshot {
            self.reset_pair(&batch.pair)?;
        }
        for event in &batch.events {
            if event.is_tombstone() {
                self.delete_order(&batch.pair, &event.order_id)?;
            } else {
                self.upsert_order(
                    &batch.pair,
                    event.side,
                    &event.order_id,
                    event.price,
                    event.size,
                    event.account.as_deref(),
                )?;
            }
        }
        Ok(())
    }

    /// Rebuild an in-memory book store from the persisted orders.
    ///
    /// Supports restart: the book resumes from the last committed bucket
    /// and the log is replayed from there.
    pub fn load_book(&self) -> Result<BookStore> {
        let mut book = BookStore::new();
        let mut stmt = self
            .conn
            .prepare("SELECT venue, instrument, side, id, price, size, account FROM orders")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let venue: String = row.get(0)?;
            let instrument: String = row.get(1)?;
            let side_raw: String = row.get(2)?;
            let side = Side::from_feed(&side_raw).ok_or_else(|| {
                QuoterError::generic(format!("orders table holds unknown side {side_raw:?}"))
            })?;
            let id: String = row.get(3)?;
            let price: f64 = row.get(4)?;
            let size: f64 = row.get(5)?;
            let account: Option<String> = row.get(6)?;
            book.upsert(&Pair::new(venue, instrument), side, &id, price, size, account);
        }
        Ok(book)
    }

    /// Number of persisted orders.
    pub fn order_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========================================================================
    // Quote sink
    // ========================================================================

    /// Write one quote row; identical keys overwrite (idempotent replay).
    pub fn insert_quote(&self, quote: &Quote) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO quotes
             (venue, instrument, timestamp, size, mid_price,
              weighted_average_buy_price, weighted_average_sell_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                quote.pair.venue,
                quote.pair.instrument,
                format_feed_timestamp(quote.timestamp),
                quote.target,
                quote.mid_price,
                quote.weighted_average_buy_price,
                quote.weighted_average_sell_price
            ],
        )?;
        Ok(())
    }

    /// Number of persisted quote rows.
    pub fn quote_count(&self) -> Result<u64> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM quotes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All quotes for a pair, key order.
    pub fn quotes_for(&self, pair: &Pair) -> Result<Vec<Quote>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, size, mid_price,
                    weighted_average_buy_price, weighted_average_sell_price
             FROM quotes WHERE venue = ?1 AND instrument = ?2
             ORDER BY timestamp, size",
        )?;
        let mut rows = stmt.query(params![pair.venue, pair.instrument])?;
        let mut quotes = Vec::new();
        while let Some(row) = rows.next()? {
            let raw_ts: String = row.get(0)?;
            let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
                .map_err(|e| QuoterError::generic(format!("bad quote timestamp {raw_ts:?}: {e}")))?
                .with_timezone(&Utc);
            quotes.push(Quote {
                pair: pair.clone(),
                timestamp,
                target: row.get(1)?,
                mid_price: row.get(2)?,
                weighted_average_buy_price: row.get(3)?,
                weighted_average_sell_price: row.get(4)?,
            });
        }
        Ok(quotes)
    }

    // ========================================================================
    // Raw message log
    // ========================================================================

    /// Append one raw message to the log (ingestion tooling and tests; the
    /// replay side only reads).
    pub fn append_message(&self, msg: &RawMessage) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (venue, instrument, content) VALUES (?1, ?2, ?3)",
            params![msg.venue, msg.instrument, msg.payload.to_string()],
        )?;
        Ok(())
    }

    /// Read the message log in insertion order, optionally filtered to one
    /// pair. Rows whose content fails to parse as JSON are skipped with a
    /// warning; wire-level validation is out of scope here.
    pub fn read_messages(&self, filter: Option<&Pair>) -> Result<Vec<RawMessage>> {
        let (sql, bind): (&str, Vec<&str>) = match filter {
            Some(pair) => (
                "SELECT venue, instrument, content FROM messages
                 WHERE venue = ?1 AND instrument = ?2 ORDER BY rowid",
                vec![pair.venue.as_str(), pair.instrument.as_str()],
            ),
            None => (
                "SELECT venue, instrument, content FROM messages ORDER BY rowid",
                Vec::new(),
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bind))?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            let venue: String = row.get(0)?;
            let instrument: String = row.get(1)?;
            let content: String = row.get(2)?;
            match serde_json::from_str(&content) {
                Ok(payload) => messages.push(RawMessage::new(venue, instrument, payload)),
                Err(e) => log::warn!("{venue}/{instrument}: skipping unparseable message: {e}"),
            }
        }
        Ok(messages)
    }

    /// Dump both persisted tables as text rows, stable order. Used by
    /// replay-idempotence checks.
    pub fn dump(&self) -> Result<Vec<String>> {
        let mut dump = Vec::new();
        let mut stmt = self.conn.prepare(
            "SELECT venue, instrument, side, id, price, size, account
             FROM orders ORDER BY venue, instrument, side, id",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let account: Option<String> = row.get(6)?;
            dump.push(format!(
                "order|{}|{}|{}|{}|{:?}|{:?}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                account.unwrap_or_default(),
            ));
        }

        let mut stmt = self.conn.prepare(
            "SELECT venue, instrument, timestamp, size, mid_price,
                    weighted_average_buy_price, weighted_average_sell_price
             FROM quotes ORDER BY venue, instrument, timestamp, size",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            dump.push(format!(
                "quote|{}|{}|{}|{:?}|{:?}|{:?}|{:?}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ));
        }
        Ok(dump)
    }

    /// Look up one persisted order row (tests, debugging).
    pub fn get_order(
        &self,
        pair: &Pair,
        side: Side,
        order_id: &str,
    ) -> Result<Option<(f64, f64, Option<String>)>> {
        let row = self
            .conn
            .query_row(
                "SELECT price, size, account FROM orders
                 WHERE venue = ?1 AND instrument = ?2 AND side = ?3 AND id = ?4",
                params![pair.venue, pair.instrument, side.as_str(), order_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(row)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // An open transaction at drop means an aborted batch; roll it back
        // so the retry starts from the last committed bucket.
        if self.in_tx {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}
