//! Error types for ignition-core.
//!
//! This module defines the central error type [`CoreError`] used throughout
//! the crate, along with the [`CoreResult<T>`] type alias.
//!
//! Admission rejections and failed ignitions are *decisions*, not errors:
//! they are returned as values (`AdmissionDecision`, `TriggerOutcome`).
//! `CoreError` is reserved for malformed input, impossible configurations
//! and broken lifecycles.
//!
//! # Examples
//!
//! ```rust
//! use ignition_core::{CoreError, NodeId};
//!
//! fn lookup(id: NodeId) -> Result<(), CoreError> {
//!     Err(CoreError::NodeNotFound { id })
//! }
//!
//! let err = lookup(NodeId(7)).unwrap_err();
//! assert!(err.to_string().contains("node-007"));
//! ```

use ignition_phase::PhaseError;
use thiserror::Error;
use uuid::Uuid;

use crate::coordinator::IgnitionPhase;
use crate::fabric::NodeId;

/// Top-level error type for ignition-core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The fabric could not be built to the requested shape.
    ///
    /// # When This Occurs
    ///
    /// - Density, clustering and minimum degree cannot be met together
    /// - Every attempt exhausted its mutation budget
    /// - Parameters fail bounds checks before the first attempt (`attempts == 0`)
    #[error("Topology construction failed after {attempts} attempt(s): {reason}")]
    TopologyConstruction {
        /// Attempts made before giving up
        attempts: u32,
        /// Last violated goal
        reason: String,
    },

    /// A node id is not part of the fabric or clock hierarchy.
    #[error("Node not found: {id}")]
    NodeNotFound {
        /// The missing node
        id: NodeId,
    },

    /// A field value failed validation constraints.
    ///
    /// # When This Occurs
    ///
    /// - Salience component outside [0, 1]
    /// - NaN or infinity in a numeric input
    /// - A second grand master registered with the clock service
    #[error("Validation error: {field} - {message}")]
    ValidationError {
        /// Name of the field that failed validation
        field: String,
        /// Description of the validation failure
        message: String,
    },

    /// Configuration is invalid or could not be loaded.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A clock exchange could not be completed.
    ///
    /// # When This Occurs
    ///
    /// - No grand master registered
    /// - The time exchange transport failed or timed out
    #[error("Clock synchronization failed for {node}: {message}")]
    ClockSync {
        /// Node being synchronized
        node: NodeId,
        /// What went wrong
        message: String,
    },

    /// The phase engine rejected its inputs.
    #[error("Phase engine error: {0}")]
    Phase(#[from] PhaseError),

    /// An ignition event was asked to make a transition its state machine forbids.
    #[error("Invalid ignition transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase
        from: IgnitionPhase,
        /// Requested phase
        to: IgnitionPhase,
    },

    /// An ignition event was finalized twice.
    #[error("Ignition event {event_id} already finalized")]
    AlreadyFinalized {
        /// The event
        event_id: Uuid,
    },

    /// A background component was started twice.
    #[error("{component} already running - call stop() first")]
    AlreadyRunning {
        /// Component name
        component: &'static str,
    },

    /// A background component was used or stopped while not running.
    #[error("{component} not running - call start() first")]
    NotRunning {
        /// Component name
        component: &'static str,
    },

    /// A background task did not stop within its join timeout.
    #[error("{component} shutdown timeout after {timeout_ms}ms - task may be stuck")]
    ShutdownTimeout {
        /// Component name
        component: &'static str,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// A transport failed to deliver to a node.
    #[error("Delivery to {node} failed: {message}")]
    Delivery {
        /// Target node
        node: NodeId,
        /// Transport message
        message: String,
    },

    /// Error during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An unexpected internal error occurred.
    ///
    /// These errors indicate a bug and should be reported.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::ConfigError(err.to_string())
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
