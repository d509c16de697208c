//! Phase engine error types.
//!
//! Every failure mode of the oscillator network is an explicit variant; the
//! engine never substitutes fallback phases or silently clamps bad input.

use thiserror::Error;

/// Errors that can occur while building or driving a phase network.
#[derive(Debug, Error, PartialEq)]
pub enum PhaseError {
    /// Configuration value out of range or inconsistent.
    #[error("Invalid phase configuration: {0}")]
    InvalidConfig(String),

    /// A network needs at least one oscillator.
    #[error("Phase network must contain at least one oscillator")]
    EmptyNetwork,

    /// Oscillator index beyond the network size.
    #[error("Oscillator index {index} out of range [0, {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of oscillators
        len: usize,
    },

    /// Per-oscillator vectors disagree in length.
    #[error("Dimension mismatch for {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which input had the wrong length
        field: &'static str,
        /// Expected length (number of oscillators)
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Adjacency list references an invalid neighbor.
    #[error("Invalid adjacency at oscillator {node} -> {neighbor}: {reason}")]
    InvalidAdjacency {
        /// Oscillator whose list is invalid
        node: usize,
        /// Offending neighbor index
        neighbor: usize,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Neighbor coupling requested but no adjacency supplied.
    #[error("Neighbor coupling requires an adjacency list")]
    MissingAdjacency,

    /// A numeric input was NaN or infinite.
    #[error("Non-finite value for {field}: {value}")]
    NonFinite {
        /// Field name
        field: &'static str,
        /// The rejected value
        value: f64,
    },
}

/// Result type alias for phase engine operations.
pub type PhaseResult<T> = Result<T, PhaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhaseError::IndexOutOfRange { index: 20, len: 16 };
        let msg = err.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_adjacency_error_names_both_ends() {
        let err = PhaseError::InvalidAdjacency {
            node: 3,
            neighbor: 3,
            reason: "self loop",
        };
        assert!(err.to_string().contains("3 -> 3"));
        assert!(err.to_string().contains("self loop"));
    }
}
