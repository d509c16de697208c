//! Post-hoc compliance scoring.
//!
//! Pure functions over recorded data: [`score_event`] grades a finalized
//! ignition against its coherence samples, [`score_topology`] grades fabric
//! structure. Neither touches live state.

mod criteria;

pub use criteria::{EventCriteria, TopologyCriteria};

use serde::{Deserialize, Serialize};

use crate::coordinator::{IgnitionEvent, IgnitionPhase};
use crate::fabric::StructuralMetrics;
use crate::sync::CoherenceSample;

/// Event-level criteria, in reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCriterion {
    MeanCoherence,
    PeakCoherence,
    TimeToIgnition,
    Coverage,
    SustainDuration,
    CoherenceStability,
}

impl EventCriterion {
    pub const ALL: [EventCriterion; 6] = [
        EventCriterion::MeanCoherence,
        EventCriterion::PeakCoherence,
        EventCriterion::TimeToIgnition,
        EventCriterion::Coverage,
        EventCriterion::SustainDuration,
        EventCriterion::CoherenceStability,
    ];
}

impl std::fmt::Display for EventCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EventCriterion::MeanCoherence => "mean_coherence",
            EventCriterion::PeakCoherence => "peak_coherence",
            EventCriterion::TimeToIgnition => "time_to_ignition",
            EventCriterion::Coverage => "coverage",
            EventCriterion::SustainDuration => "sustain_duration",
            EventCriterion::CoherenceStability => "coherence_stability",
        })
    }
}

/// Outcome of one criterion. `value` is `None` when the measurement does
/// not exist (e.g. no time-to-ignition for an event that never ignited).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion: EventCriterion,
    pub value: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCompliance {
    pub event_id: uuid::Uuid,
    pub checks: Vec<CriterionCheck>,
    /// Fraction of criteria passed.
    pub score: f64,
    pub compliant: bool,
}

impl EventCompliance {
    pub fn check(&self, criterion: EventCriterion) -> Option<&CriterionCheck> {
        self.checks.iter().find(|c| c.criterion == criterion)
    }

    pub fn failed(&self) -> Vec<EventCriterion> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.criterion)
            .collect()
    }
}

/// Grade one event.
///
/// Mean coherence and the coefficient of variation are taken over the
/// event's broadcast and sustain samples; peak coherence over all of its
/// samples. Samples belonging to other events are ignored.
pub fn score_event(
    event: &IgnitionEvent,
    samples: &[CoherenceSample],
    criteria: &EventCriteria,
) -> EventCompliance {
    let own: Vec<&CoherenceSample> = samples.iter().filter(|s| s.event_id == event.id).collect();
    let held: Vec<f64> = own
        .iter()
        .filter(|s| matches!(s.phase, IgnitionPhase::Broadcast | IgnitionPhase::Sustain))
        .map(|s| s.r)
        .collect();

    let mean = mean(&held);
    let peak = own.iter().map(|s| s.r).fold(None, |acc: Option<f64>, r| {
        Some(acc.map_or(r, |a| a.max(r)))
    });
    let cv = mean.and_then(|m| coefficient_of_variation(&held, m));
    let ttl = event.coherence.time_to_ignition_ms;
    let coverage = (!event.eligible_nodes.is_empty()).then(|| event.coverage());
    let sustain = (event.broadcast.is_some()).then_some(event.sustain_duration_ms);
    let (sustain_min, sustain_max) = criteria.sustain_range_ms;

    let checks = vec![
        CriterionCheck {
            criterion: EventCriterion::MeanCoherence,
            value: mean,
            passed: mean.is_some_and(|m| m >= criteria.min_mean_coherence),
        },
        CriterionCheck {
            criterion: EventCriterion::PeakCoherence,
            value: peak,
            passed: peak.is_some_and(|p| p >= criteria.min_peak_coherence),
        },
        CriterionCheck {
            criterion: EventCriterion::TimeToIgnition,
            value: ttl,
            passed: ttl.is_some_and(|t| t < criteria.max_time_to_ignition_ms),
        },
        CriterionCheck {
            criterion: EventCriterion::Coverage,
            value: coverage,
            passed: coverage.is_some_and(|c| c >= criteria.min_coverage),
        },
        CriterionCheck {
            criterion: EventCriterion::SustainDuration,
            value: sustain,
            passed: sustain.is_some_and(|s| (sustain_min..=sustain_max).contains(&s)),
        },
        CriterionCheck {
            criterion: EventCriterion::CoherenceStability,
            value: cv,
            passed: cv.is_some_and(|c| c < criteria.max_coefficient_of_variation),
        },
    ];

    let passed = checks.iter().filter(|c| c.passed).count();
    EventCompliance {
        event_id: event.id,
        score: passed as f64 / checks.len() as f64,
        compliant: passed == checks.len(),
        checks,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation over the mean. Undefined for a zero mean.
fn coefficient_of_variation(values: &[f64], mean: f64) -> Option<f64> {
    if values.is_empty() || mean <= f64::EPSILON {
        return None;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt() / mean)
}

/// A violated structural invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyViolation {
    LowClustering { value: f64, minimum: f64 },
    LongPaths { value: f64, maximum: f64 },
    Disconnected,
    WeakConnectivity { value: f64, minimum: f64 },
}

impl TopologyViolation {
    pub fn code(&self) -> &'static str {
        match self {
            TopologyViolation::LowClustering { .. } => "LOW_CLUSTERING",
            TopologyViolation::LongPaths { .. } => "LONG_PATHS",
            TopologyViolation::Disconnected => "DISCONNECTED",
            TopologyViolation::WeakConnectivity { .. } => "WEAK_CONNECTIVITY",
        }
    }
}

impl std::fmt::Display for TopologyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyViolation::LowClustering { value, minimum } => {
                write!(f, "clustering {:.3} below {:.3}", value, minimum)
            }
            TopologyViolation::LongPaths { value, maximum } => {
                write!(f, "average path length {:.3} above {:.3}", value, maximum)
            }
            TopologyViolation::Disconnected => f.write_str("fabric is not connected"),
            TopologyViolation::WeakConnectivity { value, minimum } => {
                write!(f, "algebraic connectivity {:.3} below {:.3}", value, minimum)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyCompliance {
    pub clustering_coefficient: f64,
    pub average_path_length: f64,
    /// ln(N) scaled by the path-length factor.
    pub max_path_length: f64,
    pub algebraic_connectivity: f64,
    pub violations: Vec<TopologyViolation>,
    pub compliant: bool,
}

/// Grade fabric structure.
///
/// A disconnected fabric always violates the path-length invariant since
/// some pairs have no path at all.
pub fn score_topology(metrics: &StructuralMetrics, criteria: &TopologyCriteria) -> TopologyCompliance {
    let n = metrics.node_count.max(1) as f64;
    let max_path_length = n.ln() * criteria.max_path_length_factor;
    let mut violations = Vec::new();

    if !(metrics.clustering_coefficient >= criteria.min_clustering) {
        violations.push(TopologyViolation::LowClustering {
            value: metrics.clustering_coefficient,
            minimum: criteria.min_clustering,
        });
    }
    if !metrics.connected {
        violations.push(TopologyViolation::Disconnected);
    } else if !(metrics.average_path_length <= max_path_length) {
        violations.push(TopologyViolation::LongPaths {
            value: metrics.average_path_length,
            maximum: max_path_length,
        });
    }
    if !(metrics.algebraic_connectivity >= criteria.min_algebraic_connectivity) {
        violations.push(TopologyViolation::WeakConnectivity {
            value: metrics.algebraic_connectivity,
            minimum: criteria.min_algebraic_connectivity,
        });
    }

    TopologyCompliance {
        clustering_coefficient: metrics.clustering_coefficient,
        average_path_length: metrics.average_path_length,
        max_path_length,
        algebraic_connectivity: metrics.algebraic_connectivity,
        compliant: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SalienceConfig;
    use crate::coordinator::BroadcastSummary;
    use crate::fabric::NodeId;
    use crate::salience::{SalienceGate, SalienceInput};
    use chrono::Utc;
    use ignition_phase::CoherenceLevel;

    fn event() -> IgnitionEvent {
        let input = SalienceInput::new(0.9, 0.8, 0.7);
        let score = SalienceGate::new(SalienceConfig::default())
            .evaluate(&input)
            .unwrap();
        let mut event = IgnitionEvent::new(&input, score);
        event.eligible_nodes = (0..10).map(NodeId).collect();
        event.participating_nodes = (0..9).map(NodeId).collect();
        event.coherence.time_to_ignition_ms = Some(4.0);
        event.broadcast = Some(BroadcastSummary {
            delivered: 9,
            ..Default::default()
        });
        event.sustain_duration_ms = 200.0;
        event
    }

    fn sample(event: &IgnitionEvent, phase: IgnitionPhase, r: f64) -> CoherenceSample {
        CoherenceSample {
            event_id: event.id,
            phase,
            tick: 0,
            oscillator_time_ms: 0.0,
            r,
            psi: 0.0,
            level: CoherenceLevel::Conscious,
            participants: 9,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn test_compliant_event() {
        let e = event();
        let mut samples = vec![sample(&e, IgnitionPhase::Synchronize, 0.4)];
        samples.extend((0..20).map(|i| sample(&e, IgnitionPhase::Sustain, 0.85 + 0.005 * (i % 3) as f64)));

        let report = score_event(&e, &samples, &EventCriteria::default());
        assert!(report.compliant, "failed: {:?}", report.failed());
        assert_eq!(report.score, 1.0);
        // Synchronize samples do not drag the mean down.
        let mean = report.check(EventCriterion::MeanCoherence).unwrap().value.unwrap();
        assert!(mean > 0.84);
    }

    #[test]
    fn test_failures_are_listed_per_criterion() {
        let mut e = event();
        e.coherence.time_to_ignition_ms = Some(40.0);
        e.sustain_duration_ms = 50.0;
        e.participating_nodes.truncate(5);
        let samples: Vec<CoherenceSample> = [0.9, 0.3, 0.9, 0.3]
            .iter()
            .map(|&r| sample(&e, IgnitionPhase::Broadcast, r))
            .collect();

        let report = score_event(&e, &samples, &EventCriteria::default());
        assert!(!report.compliant);
        assert_eq!(
            report.failed(),
            vec![
                EventCriterion::MeanCoherence,
                EventCriterion::TimeToIgnition,
                EventCriterion::Coverage,
                EventCriterion::SustainDuration,
                EventCriterion::CoherenceStability,
            ]
        );
        assert!((report.score - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_event_without_samples_fails_closed() {
        let mut e = event();
        e.coherence.time_to_ignition_ms = None;
        let report = score_event(&e, &[], &EventCriteria::default());
        for criterion in [
            EventCriterion::MeanCoherence,
            EventCriterion::PeakCoherence,
            EventCriterion::TimeToIgnition,
            EventCriterion::CoherenceStability,
        ] {
            let check = report.check(criterion).unwrap();
            assert!(!check.passed);
            assert!(check.value.is_none());
        }
    }

    #[test]
    fn test_topology_violations_named() {
        let metrics = StructuralMetrics {
            node_count: 32,
            clustering_coefficient: 0.5,
            average_path_length: 5.0,
            algebraic_connectivity: 0.1,
            connected: true,
            ..Default::default()
        };
        let report = score_topology(&metrics, &TopologyCriteria::default());
        let codes: Vec<&str> = report.violations.iter().map(|v| v.code()).collect();
        assert_eq!(codes, vec!["LOW_CLUSTERING", "LONG_PATHS", "WEAK_CONNECTIVITY"]);
        assert!(!report.compliant);
    }

    #[test]
    fn test_disconnected_topology() {
        let metrics = StructuralMetrics {
            node_count: 8,
            clustering_coefficient: 1.0,
            average_path_length: 1.0,
            algebraic_connectivity: 0.0,
            connected: false,
            ..Default::default()
        };
        let report = score_topology(&metrics, &TopologyCriteria::default());
        assert!(report.violations.contains(&TopologyViolation::Disconnected));
    }
}
