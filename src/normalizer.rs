//! Event normalizer: raw feed messages → homogeneous event batches.
//!
//! Recognized payload types are `l3snapshot` (two arrays of order entries,
//! one per side), `open` (one resting order) and `done` (a cancel,
//! implicitly a tombstone). Anything else is skipped and counted.
//!
//! Messages sharing the exact same (venue, instrument, timestamp) are
//! grouped into one batch. Pairs may interleave in the log (ordering only
//! holds within a pair), so one open group is held per pair and closes when
//! that pair's own timestamp advances. Batches must be homogeneous: a
//! snapshot expansion never mixes with incremental events, and such a group
//! is rejected wholesale rather than silently merged. Timestamps must be
//! nondecreasing per pair; a regression is fatal for the pair because book
//! state becomes unreliable from that point on.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{QuoterError, Result};
use crate::types::{format_feed_timestamp, EventBatch, OrderEvent, Pair, RawMessage, Side};

/// Counters for normalizer activity, exposed for pipeline stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizerStats {
    /// Raw messages pushed in
    pub messages_seen: u64,
    /// Messages with an unrecognized payload type (skipped, not errors)
    pub unknown_skipped: u64,
    /// Snapshot entries dropped for missing required fields
    pub malformed_entries: u64,
    /// Completed batches emitted
    pub batches_emitted: u64,
}

/// Streaming normalizer with per-pair ordering state.
///
/// Push raw messages in log order; a pair's completed batch comes back as
/// soon as that pair's next timestamp arrives. Call [`Normalizer::finish`]
/// once at end of stream to flush the remaining open group of every pair.
#[derive(Debug, Default)]
pub struct Normalizer {
    last_ts: AHashMap<Pair, DateTime<Utc>>,
    pending: AHashMap<Pair, EventBatch>,
    rejected: AHashMap<Pair, DateTime<Utc>>,
    stats: NormalizerStats,
}

impl Normalizer {
    /// Create a new normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer counters.
    #[inline]
    pub fn stats(&self) -> NormalizerStats {
        self.stats
    }

    /// Push one raw message.
    ///
    /// Returns `Ok(Some(batch))` when this message advances its pair to a
    /// new timestamp, closing that pair's previous group; `Ok(None)` when
    /// the message was absorbed or skipped. Messages from other pairs never
    /// close a group. Recoverable errors (`MalformedEvent`, `MixedBatch`)
    /// leave the normalizer consistent so the caller can log and continue;
    /// `OutOfOrder` is fatal for the pair.
    pub fn push(&mut self, msg: &RawMessage) -> Result<Option<EventBatch>> {
        self.stats.messages_seen += 1;

        let kind = match field_str(&msg.payload, "type") {
            Some("l3snapshot") => MessageKind::Snapshot,
            Some("open") => MessageKind::Open,
            Some("done") => MessageKind::Done,
            Some(_) => {
                self.stats.unknown_skipped += 1;
                return Ok(None);
            }
            None => {
                return Err(QuoterError::malformed(
                    &msg.venue,
                    &msg.instrument,
                    "missing payload type",
                ))
            }
        };

        let timestamp = field_str(&msg.payload, "timestamp")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| {
                QuoterError::malformed(&msg.venue, &msg.instrument, "missing or invalid timestamp")
            })?;

        let pair = msg.pair();

        // Ordering check runs before batching: a regression poisons the
        // pair no matter what the payload carried.
        if let Some(prev) = self.last_ts.get(&pair) {
            if timestamp < *prev {
                return Err(QuoterError::OutOfOrder {
                    venue: pair.venue,
                    instrument: pair.instrument,
                    previous: format_feed_timestamp(*prev),
                    current: format_feed_timestamp(timestamp),
                });
            }
        }
        self.last_ts.insert(pair.clone(), timestamp);

        if self.rejected.get(&pair) == Some(&timestamp) {
            // Remainder of a group already rejected as mixed.
            return Ok(None);
        }

        let is_snapshot = kind == MessageKind::Snapshot;
        let events = self.expand(msg, kind, &pair)?;

        let same_group = self
            .pending
            .get(&pair)
            .is_some_and(|open| open.timestamp == timestamp);

        if same_group {
            let mixed = self
                .pending
                .get(&pair)
                .is_some_and(|open| open.is_snapshot != is_snapshot);
            if mixed {
                self.pending.remove(&pair);
                self.rejected.insert(pair.clone(), timestamp);
                return Err(QuoterError::MixedBatch {
                    venue: pair.venue,
                    instrument: pair.instrument,
                    timestamp: format_feed_timestamp(timestamp),
                });
            }
            if let Some(open) = self.pending.get_mut(&pair) {
                open.events.extend(events);
            }
            Ok(None)
        } else {
            let batch = EventBatch {
                pair: pair.clone(),
                timestamp,
                is_snapshot,
                events,
            };
            let completed = self.pending.insert(pair, batch);
            if completed.is_some() {
                self.stats.batches_emitted += 1;
            }
            Ok(completed)
        }
    }

    /// Flush every pair's open group at end of stream, ordered by timestamp
    /// (then pair, for a stable order across runs).
    pub fn finish(&mut self) -> Vec<EventBatch> {
        let mut batches: Vec<EventBatch> = self.pending.drain().map(|(_, batch)| batch).collect();
        batches.sort_by(|a, b| {
            a.timestamp.cmp(&b.timestamp).then_with(|| {
                (a.pair.venue.as_str(), a.pair.instrument.as_str())
                    .cmp(&(b.pair.venue.as_str(), b.pair.instrument.as_str()))
            })
        });
        self.stats.batches_emitted += batches.len() as u64;
        batches
    }

    /// Expand a message payload into normalized events.
    fn expand(&mut self, msg: &RawMessage, kind: MessageKind, pair: &Pair) -> Result<Vec<OrderEvent>> {
        match kind {
            MessageKind::Snapshot => {
                let mut events = Vec::new();
                for (array, implied) in [("bids", Side::Bid), ("asks", Side::Ask)] {
                    let entries = msg.payload.get(array).and_then(Value::as_array);
                    for entry in entries.into_iter().flatten() {
                        match parse_entry(entry, Some(implied), true) {
                            Ok(event) => events.push(event),
                            Err(reason) => {
                                // Entry-level damage drops only the entry.
                                self.stats.malformed_entries += 1;
                                log::warn!("{pair}: dropping snapshot entry: {reason}");
                            }
                        }
                    }
                }
                Ok(events)
            }
            MessageKind::Open | MessageKind::Done => {
                let event = parse_entry(&msg.payload, None, false)
                    .map_err(|reason| QuoterError::malformed(&msg.venue, &msg.instrument, reason))?;
                Ok(vec![event])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageKind {
    Snapshot,
    Open,
    Done,
}

/// Parse one order entry (a snapshot array element, or the inline body of
/// an `open`/`done` payload).
///
/// The entry's own `side` field is authoritative; snapshot entries may omit
/// it and inherit the array's side. Missing price or size normalize to 0.0,
/// which makes `done` events tombstones by construction.
fn parse_entry(
    entry: &Value,
    implied_side: Option<Side>,
    is_snapshot: bool,
) -> std::result::Result<OrderEvent, String> {
    let side = match field_str(entry, "side") {
        Some(raw) => Side::from_feed(raw).ok_or_else(|| format!("unknown side {raw:?}"))?,
        None => implied_side.ok_or("missing side")?,
    };

    let order_id = field_str(entry, "orderId")
        .map(str::to_string)
        .ok_or("missing orderId")?;

    let price = field_f64(entry, "price").unwrap_or(0.0);
    let size = field_f64(entry, "size").unwrap_or(0.0);
    let account = field_str(entry, "account").map(str::to_string);

    Ok(OrderEvent {
        side,
        price,
        size,
        account,
        order_id,
        is_snapshot,
    })
}

fn field_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Numeric field that may arrive as a JSON number or a numeric string.
fn field_f64(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(payload: Value) -> RawMessage {
        RawMessage::new("Mango Markets", "SOL/USDC", payload)
    }

    fn open(ts: &str, id: &str, side: &str, price: f64, size: f64) -> RawMessage {
        raw(json!({
            "type": "open",
            "timestamp": ts,
            "side": side,
            "price": price,
            "size": size,
            "account": "acct",
            "orderId": id,
        }))
    }

    fn drain(norm: &mut Normalizer, msgs: &[RawMessage]) -> Vec<EventBatch> {
        let mut batches = Vec::new();
        for msg in msgs {
            if let Some(batch) = norm.push(msg).unwrap() {
                batches.push(batch);
            }
        }
        batches.extend(norm.finish());
        batches
    }

    #[test]
    fn test_open_event_normalization() {
        let mut norm = Normalizer::new();
        let batches = drain(
            &mut norm,
            &[open("2024-01-01T09:30:00.000Z", "o1", "buy", 9.5, 2.0)],
        );

        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert!(!batch.is_snapshot);
        assert_eq!(batch.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.side, Side::Bid);
        assert_eq!(event.price, 9.5);
        assert_eq!(event.account.as_deref(), Some("acct"));
        assert!(!event.is_tombstone());
    }

    #[test]
    fn test_done_event_is_tombstone() {
        let mut norm = Normalizer::new();
        let msg = raw(json!({
            "type": "done",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "side": "sell",
            "orderId": "o1",
        }));
        let batches = drain(&mut norm, &[msg]);
        assert_eq!(batches[0].events[0].price, 0.0);
        assert!(batches[0].events[0].is_tombstone());
    }

    #[test]
    fn test_snapshot_expansion() {
        let mut norm = Normalizer::new();
        let msg = raw(json!({
            "type": "l3snapshot",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "bids": [
                {"side": "buy", "price": 9.0, "size": 1.0, "orderId": "b1"},
                {"price": 8.5, "size": 2.0, "orderId": "b2"},
            ],
            "asks": [
                {"side": "sell", "price": "10.5", "size": "3", "orderId": "a1"},
            ],
        }));
        let batches = drain(&mut norm, &[msg]);

        let batch = &batches[0];
        assert!(batch.is_snapshot);
        assert_eq!(batch.len(), 3);
        assert!(batch.events.iter().all(|e| e.is_snapshot));
        // Entry without a side inherits the array's side.
        assert_eq!(batch.events[1].side, Side::Bid);
        // Numeric strings parse too.
        assert_eq!(batch.events[2].price, 10.5);
        assert_eq!(batch.events[2].size, 3.0);
    }

    fn open_for(instrument: &str, ts: &str, id: &str, side: &str, price: f64, size: f64) -> RawMessage {
        RawMessage::new(
            "Mango Markets",
            instrument,
            json!({
                "type": "open",
                "timestamp": ts,
                "side": side,
                "price": price,
                "size": size,
                "orderId": id,
            }),
        )
    }

    #[test]
    fn test_same_timestamp_messages_grouped() {
        let mut norm = Normalizer::new();
        let batches = drain(
            &mut norm,
            &[
                open("2024-01-01T09:30:00.000Z", "o1", "buy", 9.0, 1.0),
                open("2024-01-01T09:30:00.000Z", "o2", "sell", 10.0, 1.0),
                open("2024-01-01T09:30:01.000Z", "o3", "buy", 9.1, 1.0),
            ],
        );
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn test_interleaved_pairs_keep_groups_whole() {
        // A message from another pair in the middle of a same-timestamp
        // group must not split that group in two.
        let mut norm = Normalizer::new();
        let batches = drain(
            &mut norm,
            &[
                open_for("SOL/USDC", "2024-01-01T09:30:00.000Z", "s1", "sell", 10.0, 5.0),
                open_for("BTC/USDC", "2024-01-01T09:30:00.000Z", "x1", "sell", 40000.0, 1.0),
                open_for("SOL/USDC", "2024-01-01T09:30:00.000Z", "s2", "sell", 11.0, 10.0),
            ],
        );

        assert_eq!(batches.len(), 2);
        let sol = batches
            .iter()
            .find(|b| b.pair.instrument == "SOL/USDC")
            .unwrap();
        assert_eq!(sol.len(), 2);
        assert_eq!(sol.events[0].order_id, "s1");
        assert_eq!(sol.events[1].order_id, "s2");
    }

    #[test]
    fn test_interleaved_pairs_cannot_evade_mixed_batch() {
        let mut norm = Normalizer::new();
        let snap = raw(json!({
            "type": "l3snapshot",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "bids": [{"side": "buy", "price": 9.0, "size": 1.0, "orderId": "b1"}],
            "asks": [],
        }));
        norm.push(&snap).unwrap();
        norm.push(&open_for("BTC/USDC", "2024-01-01T09:30:00.000Z", "x1", "buy", 40000.0, 1.0))
            .unwrap();

        // Same pair, same timestamp, incremental after snapshot: still mixed
        // even with another pair's message in between.
        let err = norm
            .push(&open("2024-01-01T09:30:00.000Z", "o1", "buy", 9.1, 1.0))
            .unwrap_err();
        assert!(matches!(err, QuoterError::MixedBatch { .. }));

        // The other pair's group is untouched by the rejection.
        let batches = norm.finish();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].pair.instrument, "BTC/USDC");
    }

    #[test]
    fn test_finish_flushes_all_pairs() {
        let mut norm = Normalizer::new();
        norm.push(&open_for("SOL/USDC", "2024-01-01T09:31:00.000Z", "s1", "buy", 9.0, 1.0))
            .unwrap();
        norm.push(&open_for("BTC/USDC", "2024-01-01T09:30:00.000Z", "x1", "buy", 40000.0, 1.0))
            .unwrap();

        let batches = norm.finish();
        assert_eq!(batches.len(), 2);
        // Flushed oldest first.
        assert_eq!(batches[0].pair.instrument, "BTC/USDC");
        assert_eq!(batches[1].pair.instrument, "SOL/USDC");
        assert!(norm.finish().is_empty());
    }

    #[test]
    fn test_unknown_type_skipped() {
        let mut norm = Normalizer::new();
        let msg = raw(json!({"type": "trade", "timestamp": "2024-01-01T09:30:00.000Z"}));
        assert!(norm.push(&msg).unwrap().is_none());
        assert_eq!(norm.stats().unknown_skipped, 1);
        assert!(norm.finish().is_empty());
    }

    #[test]
    fn test_missing_order_id_is_malformed() {
        let mut norm = Normalizer::new();
        let msg = raw(json!({
            "type": "open",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "side": "buy",
            "price": 9.0,
            "size": 1.0,
        }));
        let err = norm.push(&msg).unwrap_err();
        assert!(matches!(err, QuoterError::MalformedEvent { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_malformed_snapshot_entry_dropped_not_fatal() {
        let mut norm = Normalizer::new();
        let msg = raw(json!({
            "type": "l3snapshot",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "bids": [
                {"side": "buy", "price": 9.0, "size": 1.0, "orderId": "b1"},
                {"side": "buy", "price": 8.0, "size": 1.0}, // no orderId
            ],
            "asks": [],
        }));
        let batches = drain(&mut norm, &[msg]);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(norm.stats().malformed_entries, 1);
    }

    #[test]
    fn test_out_of_order_is_fatal() {
        let mut norm = Normalizer::new();
        norm.push(&open("2024-01-01T09:31:00.000Z", "o1", "buy", 9.0, 1.0))
            .unwrap();
        let err = norm
            .push(&open("2024-01-01T09:30:00.000Z", "o2", "buy", 9.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, QuoterError::OutOfOrder { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_equal_timestamps_are_in_order() {
        let mut norm = Normalizer::new();
        norm.push(&open("2024-01-01T09:30:00.000Z", "o1", "buy", 9.0, 1.0))
            .unwrap();
        assert!(norm
            .push(&open("2024-01-01T09:30:00.000Z", "o2", "buy", 9.1, 1.0))
            .is_ok());
    }

    #[test]
    fn test_pairs_ordered_independently() {
        let mut norm = Normalizer::new();
        norm.push(&open("2024-01-01T09:31:00.000Z", "o1", "buy", 9.0, 1.0))
            .unwrap();
        let other = RawMessage::new(
            "Mango Markets",
            "BTC/USDC",
            json!({
                "type": "open",
                "timestamp": "2024-01-01T09:30:00.000Z",
                "side": "buy",
                "price": 40000.0,
                "size": 1.0,
                "orderId": "x1",
            }),
        );
        // Earlier timestamp on a different pair is fine.
        assert!(norm.push(&other).is_ok());
    }

    #[test]
    fn test_mixed_batch_rejected() {
        let mut norm = Normalizer::new();
        let snap = raw(json!({
            "type": "l3snapshot",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "bids": [{"side": "buy", "price": 9.0, "size": 1.0, "orderId": "b1"}],
            "asks": [],
        }));
        norm.push(&snap).unwrap();

        let err = norm
            .push(&open("2024-01-01T09:30:00.000Z", "o1", "buy", 9.1, 1.0))
            .unwrap_err();
        assert!(matches!(err, QuoterError::MixedBatch { .. }));

        // The rest of the poisoned group is swallowed; the next timestamp
        // starts cleanly.
        assert!(norm
            .push(&open("2024-01-01T09:30:00.000Z", "o2", "buy", 9.2, 1.0))
            .unwrap()
            .is_none());
        let batches = drain(
            &mut norm,
            &[open("2024-01-01T09:31:00.000Z", "o3", "buy", 9.3, 1.0)],
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].events[0].order_id, "o3");
    }

    #[test]
    fn test_empty_snapshot_still_a_batch() {
        // A snapshot with no entries must still reset the book.
        let mut norm = Normalizer::new();
        let msg = raw(json!({
            "type": "l3snapshot",
            "timestamp": "2024-01-01T09:30:00.000Z",
            "bids": [],
            "asks": [],
        }));
        let batches = drain(&mut norm, &[msg]);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_snapshot);
        assert!(batches[0].is_empty());
    }
}
