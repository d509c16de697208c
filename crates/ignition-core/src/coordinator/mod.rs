//! Ignition coordination.
//!
//! The [`IgnitionCoordinator`] admits triggers through the salience gate,
//! the refractory timer and the frequency limiter, then drives one ignition
//! at a time through the phase state machine:
//!
//! 1. **Prepare**: snapshot eligible nodes
//! 2. **Synchronize**: step the phase engine until r crosses the conscious
//!    threshold or the budget runs out
//! 3. **Broadcast**: deliver the content to every participant
//! 4. **Sustain**: hold coherence for `sustain_ms`
//! 5. **Dissolve**: relax the coupling and let coherence decay
//!
//! Finalized events land in the shared [`IgnitionContext`], which keeps a
//! bounded history and fans events out to subscribers in sequence order.
//! [`ControlLoop`] feeds the coordinator from a bounded queue on a fixed
//! cadence.

mod context;
mod control_loop;
mod event;
mod ignition;
mod limiter;
mod state;
mod transport;

pub use context::{EventSubscription, IgnitionContext};
pub use control_loop::{ArousalSource, ControlLoop, FixedArousal};
pub use event::{BroadcastSummary, CoherenceSummary, IgnitionEvent, PhaseTransition, TriggerOutcome};
pub use ignition::{CoordinatorMetrics, IgnitionCoordinator};
pub use limiter::{FrequencyLimiter, RefractoryTimer};
pub use state::{FailureReason, IgnitionPhase};
pub use transport::{BroadcastTransport, LocalTransport};
