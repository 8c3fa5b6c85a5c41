//! Warning tracking for feed replay.
//!
//! Recoverable data-quality issues (malformed events, mixed batches,
//! unknown payload types) must not abort a replay, but they must not vanish
//! either: every one is categorized, counted, and kept in a bounded buffer
//! that can be exported as JSON for root cause analysis afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Category of warning for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCategory {
    /// Event dropped for a missing or invalid required field
    MalformedEvent,
    /// Batch mixed snapshot and incremental events and was rejected
    MixedBatch,
    /// Payload type outside the recognized set (skipped, informational)
    UnknownEventType,
    /// Timestamp anomaly short of a fatal regression (e.g. large gap)
    TimestampAnomaly,
    /// Other/uncategorized warning
    Other,
}

impl WarningCategory {
    /// Human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            WarningCategory::MalformedEvent => "MALFORMED_EVENT",
            WarningCategory::MixedBatch => "MIXED_BATCH",
            WarningCategory::UnknownEventType => "UNKNOWN_EVENT_TYPE",
            WarningCategory::TimestampAnomaly => "TIMESTAMP_ANOMALY",
            WarningCategory::Other => "OTHER",
        }
    }
}

/// A single warning record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Warning category
    pub category: WarningCategory,
    /// Human-readable message
    pub message: String,
    /// Affected pair, rendered as "venue/instrument"
    pub pair: Option<String>,
    /// Feed timestamp of the offending message, when known
    pub timestamp: Option<String>,
}

/// Warning tracker with per-category counts and a bounded recent buffer.
#[derive(Debug)]
pub struct WarningTracker {
    /// Most recent warnings, capped at `max_kept`
    recent: Vec<Warning>,
    max_kept: usize,
    total: u64,
    by_category: HashMap<WarningCategory, u64>,
}

/// Default cap on warnings kept in memory.
const DEFAULT_MAX_KEPT: usize = 10_000;

impl WarningTracker {
    /// Create a tracker with the default buffer cap.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_KEPT)
    }

    /// Create a tracker keeping at most `max_kept` recent warnings.
    pub fn with_capacity(max_kept: usize) -> Self {
        Self {
            recent: Vec::new(),
            max_kept,
            total: 0,
            by_category: HashMap::new(),
        }
    }

    /// Record a warning. Counts always update; the record itself is kept
    /// only while the buffer has room.
    pub fn record(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
        pair: Option<String>,
        timestamp: Option<String>,
    ) {
        self.total += 1;
        *self.by_category.entry(category).or_insert(0) += 1;

        if self.recent.len() < self.max_kept {
            self.recent.push(Warning {
                category,
                message: message.into(),
                pair,
                timestamp,
            });
        }
    }

    /// Total warnings recorded (including any not retained).
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Count for one category.
    pub fn count(&self, category: WarningCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }

    /// Retained warnings, oldest first.
    pub fn recent(&self) -> &[Warning] {
        &self.recent
    }

    /// Summary of counts by category name.
    pub fn summary(&self) -> WarningSummary {
        WarningSummary {
            total: self.total,
            by_category: self
                .by_category
                .iter()
                .map(|(cat, count)| (cat.name().to_string(), *count))
                .collect(),
        }
    }

    /// Export retained warnings as a JSON array.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string_pretty(&self.recent)
            .map_err(|e| format!("failed to serialize warnings: {e}"))?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for WarningTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary statistics for warnings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarningSummary {
    /// Total number of warnings
    pub total: u64,
    /// Count by category name
    pub by_category: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut tracker = WarningTracker::new();
        tracker.record(
            WarningCategory::MalformedEvent,
            "missing orderId",
            Some("Mango Markets/SOL/USDC".into()),
            None,
        );
        tracker.record(WarningCategory::MalformedEvent, "missing side", None, None);
        tracker.record(WarningCategory::MixedBatch, "rejected", None, None);

        assert_eq!(tracker.total(), 3);
        assert_eq!(tracker.count(WarningCategory::MalformedEvent), 2);
        assert_eq!(tracker.count(WarningCategory::MixedBatch), 1);
        assert_eq!(tracker.count(WarningCategory::Other), 0);
    }

    #[test]
    fn test_buffer_cap_keeps_counts() {
        let mut tracker = WarningTracker::with_capacity(2);
        for i in 0..5 {
            tracker.record(WarningCategory::Other, format!("w{i}"), None, None);
        }
        assert_eq!(tracker.recent().len(), 2);
        assert_eq!(tracker.total(), 5);
    }

    #[test]
    fn test_summary_by_name() {
        let mut tracker = WarningTracker::new();
        tracker.record(WarningCategory::UnknownEventType, "trade", None, None);
        let summary = tracker.summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_category.get("UNKNOWN_EVENT_TYPE"), Some(&1));
    }

    #[test]
    fn test_export_to_file() {
        let mut tracker = WarningTracker::new();
        tracker.record(WarningCategory::MalformedEvent, "x", None, None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings.json");
        tracker.export_to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<Warning> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, WarningCategory::MalformedEvent);
    }
}
