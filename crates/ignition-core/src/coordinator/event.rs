//! Ignition event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{FailureReason, IgnitionPhase};
use crate::error::{CoreError, CoreResult};
use crate::fabric::NodeId;
use crate::salience::{AdmissionDecision, SalienceInput, SalienceScore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: IgnitionPhase,
    pub to: IgnitionPhase,
    pub at: DateTime<Utc>,
}

/// Coherence observed over one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSummary {
    pub peak_r: f64,
    /// Mean r over broadcast and sustain samples.
    pub mean_r: f64,
    pub final_r: f64,
    /// Wall-clock time from entering Synchronize to crossing the conscious
    /// threshold. `None` when the threshold was never crossed.
    pub time_to_ignition_ms: Option<f64>,
    pub sync_ticks: u64,
    /// Oscillator time spent synchronizing.
    pub sync_time_ms: f64,
}

/// Delivery result of the broadcast phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub delivered: usize,
    pub failed: Vec<NodeId>,
    /// Refused by the node's breaker before dispatch.
    pub skipped: Vec<NodeId>,
}

/// One ignition attempt, from admission to its terminal phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnitionEvent {
    pub id: Uuid,
    /// Publication order; assigned when the event is published.
    pub sequence: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub phase: IgnitionPhase,
    pub transitions: Vec<PhaseTransition>,
    pub content: serde_json::Value,
    pub source: String,
    pub salience: SalienceScore,
    pub eligible_nodes: Vec<NodeId>,
    pub participating_nodes: Vec<NodeId>,
    pub coherence: CoherenceSummary,
    pub broadcast: Option<BroadcastSummary>,
    pub sustain_duration_ms: f64,
    pub success: bool,
    pub failure: Option<FailureReason>,
}

impl IgnitionEvent {
    /// A fresh event in `Idle`.
    pub fn new(input: &SalienceInput, salience: SalienceScore) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            started_at: Utc::now(),
            ended_at: None,
            phase: IgnitionPhase::Idle,
            transitions: Vec::new(),
            content: serde_json::json!({
                "source": input.source,
                "salience": salience.total,
                "level": salience.level,
                "context": input.context,
            }),
            source: input.source.clone(),
            salience,
            eligible_nodes: Vec::new(),
            participating_nodes: Vec::new(),
            coherence: CoherenceSummary::default(),
            broadcast: None,
            sustain_duration_ms: 0.0,
            success: false,
            failure: None,
        }
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to a non-terminal phase.
    ///
    /// # Errors
    ///
    /// `AlreadyFinalized` on a terminal event, `InvalidTransition` for any
    /// move the state machine forbids or for a terminal target (use
    /// [`complete`](Self::complete) or [`fail`](Self::fail)).
    pub fn transition(&mut self, to: IgnitionPhase) -> CoreResult<()> {
        if self.is_finalized() {
            return Err(CoreError::AlreadyFinalized { event_id: self.id });
        }
        if to.is_terminal() || !self.phase.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.record(to);
        Ok(())
    }

    /// Finalize successfully. Only legal from `Dissolve`.
    pub fn complete(&mut self) -> CoreResult<()> {
        self.finalize(IgnitionPhase::Complete)?;
        self.success = true;
        Ok(())
    }

    /// Finalize as failed from any non-terminal phase.
    pub fn fail(&mut self, reason: FailureReason) -> CoreResult<()> {
        self.finalize(IgnitionPhase::Failed)?;
        self.success = false;
        self.failure = Some(reason);
        Ok(())
    }

    fn finalize(&mut self, to: IgnitionPhase) -> CoreResult<()> {
        if self.is_finalized() {
            return Err(CoreError::AlreadyFinalized { event_id: self.id });
        }
        if !self.phase.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.record(to);
        self.ended_at = self.transitions.last().map(|t| t.at);
        Ok(())
    }

    fn record(&mut self, to: IgnitionPhase) {
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        self.phase = to;
    }

    /// Wall-clock duration, once finalized.
    pub fn duration_ms(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_microseconds().unwrap_or(i64::MAX) as f64 / 1000.0)
    }

    /// Fraction of eligible nodes that took part.
    pub fn coverage(&self) -> f64 {
        if self.eligible_nodes.is_empty() {
            0.0
        } else {
            self.participating_nodes.len() as f64 / self.eligible_nodes.len() as f64
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Not admitted; no event was created.
    Rejected(AdmissionDecision),
    Completed(IgnitionEvent),
    Failed(IgnitionEvent),
}

impl TriggerOutcome {
    pub fn event(&self) -> Option<&IgnitionEvent> {
        match self {
            TriggerOutcome::Rejected(_) => None,
            TriggerOutcome::Completed(event) | TriggerOutcome::Failed(event) => Some(event),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TriggerOutcome::Completed(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TriggerOutcome::Rejected(_))
    }

    /// Machine-readable label: the rejection codes, failure code or
    /// `COMPLETED`.
    pub fn code(&self) -> String {
        match self {
            TriggerOutcome::Rejected(decision) => decision.codes().join(","),
            TriggerOutcome::Completed(_) => "COMPLETED".to_string(),
            TriggerOutcome::Failed(event) => event
                .failure
                .as_ref()
                .map_or("FAILED", FailureReason::code)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SalienceConfig;
    use crate::salience::SalienceGate;

    fn event() -> IgnitionEvent {
        let input = SalienceInput::new(0.9, 0.8, 0.7).with_context(serde_json::json!({"topic": "alarm"}));
        let score = SalienceGate::new(SalienceConfig::default())
            .evaluate(&input)
            .unwrap();
        IgnitionEvent::new(&input, score)
    }

    #[test]
    fn test_full_lifecycle() {
        let mut e = event();
        for to in [
            IgnitionPhase::Prepare,
            IgnitionPhase::Synchronize,
            IgnitionPhase::Broadcast,
            IgnitionPhase::Sustain,
            IgnitionPhase::Dissolve,
        ] {
            e.transition(to).unwrap();
        }
        e.complete().unwrap();
        assert!(e.success);
        assert!(e.ended_at.is_some());
        assert_eq!(e.transitions.len(), 6);
        assert_eq!(e.content["context"]["topic"], "alarm");
    }

    #[test]
    fn test_skipping_phases_rejected() {
        let mut e = event();
        e.transition(IgnitionPhase::Prepare).unwrap();
        let err = e.transition(IgnitionPhase::Broadcast).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: IgnitionPhase::Prepare,
                to: IgnitionPhase::Broadcast
            }
        ));
        assert!(e.complete().is_err());
        assert!(e.transition(IgnitionPhase::Complete).is_err());
    }

    #[test]
    fn test_finalized_exactly_once() {
        let mut e = event();
        e.transition(IgnitionPhase::Prepare).unwrap();
        e.fail(FailureReason::ClockReadinessLost).unwrap();
        assert!(!e.success);

        let err = e
            .fail(FailureReason::Cancelled {
                reason: "late".into(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyFinalized { .. }));
        assert!(matches!(
            e.transition(IgnitionPhase::Synchronize),
            Err(CoreError::AlreadyFinalized { .. })
        ));
        assert_eq!(e.failure, Some(FailureReason::ClockReadinessLost));
    }

    #[test]
    fn test_coverage() {
        let mut e = event();
        assert_eq!(e.coverage(), 0.0);
        e.eligible_nodes = (0..10).map(NodeId).collect();
        e.participating_nodes = (0..7).map(NodeId).collect();
        assert!((e.coverage() - 0.7).abs() < 1e-12);
    }
}
