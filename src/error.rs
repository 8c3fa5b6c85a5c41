//! Error types for the depth quoter.
//!
//! Clean error handling using `thiserror` for ergonomic error definitions.
//!
//! The taxonomy follows the processing model: malformed events are
//! recoverable (dropped and logged by the pipeline), timestamp regressions
//! are fatal for the affected pair, and storage failures abort the current
//! transaction so the batch can be retried on restart.

use thiserror::Error;

/// Result type alias for quoter operations.
pub type Result<T> = std::result::Result<T, QuoterError>;

/// Main error type for quoter operations.
#[derive(Error, Debug)]
pub enum QuoterError {
    /// A feed message or order entry is missing a required field
    #[error("Malformed event for {venue}/{instrument}: {reason}")]
    MalformedEvent {
        venue: String,
        instrument: String,
        reason: String,
    },

    /// Timestamps regressed within a (venue, instrument) pair
    #[error("Out-of-order event for {venue}/{instrument}: {current} < {previous}")]
    OutOfOrder {
        venue: String,
        instrument: String,
        previous: String,
        current: String,
    },

    /// A batch mixes snapshot and incremental events at one timestamp
    #[error("Mixed batch for {venue}/{instrument} at {timestamp}")]
    MixedBatch {
        venue: String,
        instrument: String,
        timestamp: String,
    },

    /// Persistence layer failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Invalid configuration (e.g. non-positive target size)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl QuoterError {
    /// Create a malformed-event error for a pair.
    pub fn malformed(venue: &str, instrument: &str, reason: impl Into<String>) -> Self {
        QuoterError::MalformedEvent {
            venue: venue.to_string(),
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        QuoterError::Generic(msg.into())
    }

    /// Whether the pipeline may drop the offending event and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QuoterError::MalformedEvent { .. } | QuoterError::MixedBatch { .. }
        )
    }
}

impl From<std::io::Error> for QuoterError {
    fn from(err: std::io::Error) -> Self {
        QuoterError::Generic(format!("IO error: {err}"))
    }
}

impl From<String> for QuoterError {
    fn from(err: String) -> Self {
        QuoterError::Generic(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuoterError::malformed("Mango Markets", "SOL/USDC", "missing orderId");
        assert_eq!(
            err.to_string(),
            "Malformed event for Mango Markets/SOL/USDC: missing orderId"
        );
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(QuoterError::malformed("v", "i", "x").is_recoverable());
        assert!(QuoterError::MixedBatch {
            venue: "v".into(),
            instrument: "i".into(),
            timestamp: "t".into(),
        }
        .is_recoverable());
        assert!(!QuoterError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_result_type() {
        let result: Result<i32> = Err(QuoterError::Config("target size must be > 0".into()));
        assert!(result.is_err());
    }
}
