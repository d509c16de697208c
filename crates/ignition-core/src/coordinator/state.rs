//! Ignition state machine.
//!
//! ```text
//! Idle → Prepare → Synchronize → Broadcast → Sustain → Dissolve → Complete
//!   └───────┴───────────┴────────────┴──────────┴──────────┴──────→ Failed
//! ```
//!
//! `Complete` and `Failed` are terminal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnitionPhase {
    Idle,
    Prepare,
    Synchronize,
    Broadcast,
    Sustain,
    Dissolve,
    Complete,
    Failed,
}

impl IgnitionPhase {
    pub const ALL: [IgnitionPhase; 8] = [
        IgnitionPhase::Idle,
        IgnitionPhase::Prepare,
        IgnitionPhase::Synchronize,
        IgnitionPhase::Broadcast,
        IgnitionPhase::Sustain,
        IgnitionPhase::Dissolve,
        IgnitionPhase::Complete,
        IgnitionPhase::Failed,
    ];

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, IgnitionPhase::Complete | IgnitionPhase::Failed)
    }

    /// The phase that follows on success, if any.
    pub fn next(self) -> Option<IgnitionPhase> {
        use IgnitionPhase::*;
        match self {
            Idle => Some(Prepare),
            Prepare => Some(Synchronize),
            Synchronize => Some(Broadcast),
            Broadcast => Some(Sustain),
            Sustain => Some(Dissolve),
            Dissolve => Some(Complete),
            Complete | Failed => None,
        }
    }

    pub fn can_transition_to(self, to: IgnitionPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == IgnitionPhase::Failed || self.next() == Some(to)
    }
}

impl std::fmt::Display for IgnitionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IgnitionPhase::Idle => "idle",
            IgnitionPhase::Prepare => "prepare",
            IgnitionPhase::Synchronize => "synchronize",
            IgnitionPhase::Broadcast => "broadcast",
            IgnitionPhase::Sustain => "sustain",
            IgnitionPhase::Dissolve => "dissolve",
            IgnitionPhase::Complete => "complete",
            IgnitionPhase::Failed => "failed",
        })
    }
}

/// Why an ignition ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Too few eligible nodes when preparing.
    InsufficientNodes { eligible: usize, required: usize },
    /// r stayed below the conscious threshold for the whole budget.
    SyncTimeout { final_r: f64, elapsed_ms: f64 },
    ClockReadinessLost,
    /// Participants dropped below the minimum mid-protocol.
    NodesExhausted { remaining: usize, required: usize },
    /// Kill switch.
    Cancelled { reason: String },
    /// A collaborator returned an error mid-protocol.
    Aborted { message: String },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::InsufficientNodes { .. } => "INSUFFICIENT_NODES",
            FailureReason::SyncTimeout { .. } => "SYNC_TIMEOUT",
            FailureReason::ClockReadinessLost => "CLOCK_READINESS_LOST",
            FailureReason::NodesExhausted { .. } => "NODES_EXHAUSTED",
            FailureReason::Cancelled { .. } => "CANCELLED",
            FailureReason::Aborted { .. } => "ABORTED",
        }
    }

    /// Failures the supervising layer must hear about.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureReason::NodesExhausted { .. }
                | FailureReason::Cancelled { .. }
                | FailureReason::Aborted { .. }
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InsufficientNodes { eligible, required } => {
                write!(f, "{} eligible nodes, {} required", eligible, required)
            }
            FailureReason::SyncTimeout {
                final_r,
                elapsed_ms,
            } => write!(
                f,
                "coherence {:.3} after {:.0}ms of synchronization",
                final_r, elapsed_ms
            ),
            FailureReason::ClockReadinessLost => f.write_str("clock readiness lost"),
            FailureReason::NodesExhausted {
                remaining,
                required,
            } => write!(f, "{} participants left, {} required", remaining, required),
            FailureReason::Cancelled { reason } => write!(f, "cancelled: {}", reason),
            FailureReason::Aborted { message } => write!(f, "aborted: {}", message),
        }
    }
}
