//! Salience gate.
//!
//! Scores incoming signals and decides whether the cluster may attempt an
//! ignition right now. A rejection is a value ([`AdmissionDecision`]) carrying
//! every reason that applied, never an error.

mod source;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SalienceConfig;
use crate::error::{CoreError, CoreResult};
use crate::fabric::FabricMetrics;

pub use source::{SalienceProvider, SignalSource};

/// Raw signal submitted for ignition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalienceInput {
    pub novelty: f64,
    pub relevance: f64,
    pub urgency: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Free-form payload carried into the broadcast.
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_source() -> String {
    "manual".to_string()
}

impl SalienceInput {
    pub fn new(novelty: f64, relevance: f64, urgency: f64) -> Self {
        Self {
            novelty,
            relevance,
            urgency,
            confidence: default_confidence(),
            context: serde_json::Value::Null,
            source: default_source(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Ordered salience bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalienceLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl SalienceLevel {
    pub fn from_total(total: f64) -> Self {
        match total {
            t if t < 0.25 => SalienceLevel::Minimal,
            t if t < 0.50 => SalienceLevel::Low,
            t if t < 0.75 => SalienceLevel::Medium,
            t if t < 0.85 => SalienceLevel::High,
            _ => SalienceLevel::Critical,
        }
    }
}

impl std::fmt::Display for SalienceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SalienceLevel::Minimal => "minimal",
            SalienceLevel::Low => "low",
            SalienceLevel::Medium => "medium",
            SalienceLevel::High => "high",
            SalienceLevel::Critical => "critical",
        })
    }
}

/// Weighted salience of one input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalienceScore {
    pub novelty: f64,
    pub relevance: f64,
    pub urgency: f64,
    pub confidence: f64,
    /// Weighted sum in [0, 1].
    pub total: f64,
    pub level: SalienceLevel,
}

/// Why a trigger was not admitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    BelowThreshold { score: f64, threshold: f64 },
    ClockNotReady,
    LatencyCeiling { latency_ms: f64, ceiling_ms: f64 },
    InsufficientNodes { healthy: usize, required: usize },
    InsufficientCapacity { available: f64, required: f64 },
    Refractory { remaining_ms: u64 },
    RateLimited,
    IgnitionInProgress,
}

impl RejectionReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::BelowThreshold { .. } => "BELOW_THRESHOLD",
            RejectionReason::ClockNotReady => "CLOCK_NOT_READY",
            RejectionReason::LatencyCeiling { .. } => "LATENCY_CEILING",
            RejectionReason::InsufficientNodes { .. } => "INSUFFICIENT_NODES",
            RejectionReason::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            RejectionReason::Refractory { .. } => "REFRACTORY",
            RejectionReason::RateLimited => "RATE_LIMITED",
            RejectionReason::IgnitionInProgress => "IGNITION_IN_PROGRESS",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::BelowThreshold { score, threshold } => {
                write!(f, "salience {:.3} below threshold {:.3}", score, threshold)
            }
            RejectionReason::ClockNotReady => f.write_str("clock not ready for ignition"),
            RejectionReason::LatencyCeiling {
                latency_ms,
                ceiling_ms,
            } => write!(
                f,
                "fabric latency {:.2}ms at or above {:.2}ms",
                latency_ms, ceiling_ms
            ),
            RejectionReason::InsufficientNodes { healthy, required } => {
                write!(f, "{} healthy nodes, {} required", healthy, required)
            }
            RejectionReason::InsufficientCapacity {
                available,
                required,
            } => write!(
                f,
                "available capacity {:.2} below {:.2}",
                available, required
            ),
            RejectionReason::Refractory { remaining_ms } => {
                write!(f, "refractory for another {}ms", remaining_ms)
            }
            RejectionReason::RateLimited => f.write_str("event rate limit reached"),
            RejectionReason::IgnitionInProgress => f.write_str("an ignition is already in progress"),
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub admitted: bool,
    pub score: SalienceScore,
    pub effective_threshold: f64,
    pub reasons: Vec<RejectionReason>,
}

impl AdmissionDecision {
    /// A decision rejected for a single reason found outside the gate.
    pub(crate) fn rejected(score: SalienceScore, effective_threshold: f64, reason: RejectionReason) -> Self {
        Self {
            admitted: false,
            score,
            effective_threshold,
            reasons: vec![reason],
        }
    }

    /// Codes of every rejection reason, in check order.
    pub fn codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(RejectionReason::code).collect()
    }
}

/// Salience scoring and admission.
#[derive(Debug, Clone)]
pub struct SalienceGate {
    config: SalienceConfig,
}

impl SalienceGate {
    pub fn new(config: SalienceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SalienceConfig {
        &self.config
    }

    /// Weighted score of an input.
    ///
    /// # Errors
    ///
    /// `CoreError::ValidationError` for a component outside [0, 1] or NaN.
    pub fn evaluate(&self, input: &SalienceInput) -> CoreResult<SalienceScore> {
        for (field, value) in [
            ("novelty", input.novelty),
            ("relevance", input.relevance),
            ("urgency", input.urgency),
            ("confidence", input.confidence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(CoreError::validation(
                    field,
                    format!("must be in [0, 1], got {}", value),
                ));
            }
        }

        let w = &self.config.weights;
        let total = (w.novelty * input.novelty
            + w.relevance * input.relevance
            + w.urgency * input.urgency
            + w.confidence * input.confidence)
            .clamp(0.0, 1.0);

        Ok(SalienceScore {
            novelty: input.novelty,
            relevance: input.relevance,
            urgency: input.urgency,
            confidence: input.confidence,
            total,
            level: SalienceLevel::from_total(total),
        })
    }

    /// Salience bar after arousal and refractory adjustment.
    ///
    /// Arousal above 0.5 lowers the bar and below 0.5 raises it, scaled by
    /// `arousal_sensitivity`; the refractory boost is added on top.
    pub fn effective_threshold(&self, arousal_level: f64, refractory_boost: f64) -> f64 {
        let arousal = if arousal_level.is_finite() {
            arousal_level.clamp(0.0, 1.0)
        } else {
            0.5
        };
        let scaled =
            self.config.min_salience * (1.0 + self.config.arousal_sensitivity * (0.5 - arousal));
        (scaled + refractory_boost.max(0.0)).clamp(0.0, 1.0)
    }

    /// Check every admission condition and collect all that fail.
    pub fn check_admission(
        &self,
        score: &SalienceScore,
        metrics: &FabricMetrics,
        clock_ready: bool,
        arousal_level: f64,
        refractory_boost: f64,
    ) -> AdmissionDecision {
        let threshold = self.effective_threshold(arousal_level, refractory_boost);
        let mut reasons = Vec::new();

        if score.total < threshold {
            reasons.push(RejectionReason::BelowThreshold {
                score: score.total,
                threshold,
            });
        }
        if !clock_ready {
            reasons.push(RejectionReason::ClockNotReady);
        }
        if metrics.mean_latency_ms >= self.config.max_latency_ms {
            reasons.push(RejectionReason::LatencyCeiling {
                latency_ms: metrics.mean_latency_ms,
                ceiling_ms: self.config.max_latency_ms,
            });
        }
        if metrics.healthy_nodes < self.config.min_healthy_nodes {
            reasons.push(RejectionReason::InsufficientNodes {
                healthy: metrics.healthy_nodes,
                required: self.config.min_healthy_nodes,
            });
        }
        if metrics.available_capacity < self.config.min_available_capacity {
            reasons.push(RejectionReason::InsufficientCapacity {
                available: metrics.available_capacity,
                required: self.config.min_available_capacity,
            });
        }

        let admitted = reasons.is_empty();
        if !admitted {
            debug!(
                total = score.total,
                threshold,
                reasons = ?reasons.iter().map(RejectionReason::code).collect::<Vec<_>>(),
                "Admission rejected"
            );
        }
        AdmissionDecision {
            admitted,
            score: *score,
            effective_threshold: threshold,
            reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_metrics() -> FabricMetrics {
        FabricMetrics {
            mean_latency_ms: 0.8,
            healthy_nodes: 32,
            usable_nodes: 32,
            available_capacity: 0.7,
            ..FabricMetrics::default()
        }
    }

    #[test]
    fn test_reference_signal_is_admitted() {
        let gate = SalienceGate::new(SalienceConfig::default());
        // Equal weights: (0.9 + 0.8 + 0.7 + 1.0) / 4 sits on the Critical bound.
        let input = SalienceInput::new(0.9, 0.8, 0.7).with_confidence(1.0);
        let score = gate.evaluate(&input).unwrap();
        assert!((score.total - 0.85).abs() < 1e-12);
        assert_eq!(score.level, SalienceLevel::Critical);

        let decision = gate.check_admission(&score, &healthy_metrics(), true, 0.5, 0.0);
        assert!(decision.admitted, "{:?}", decision.reasons);
        assert!((decision.effective_threshold - 0.60).abs() < 1e-12);

        let score = gate.evaluate(&input.with_confidence(0.9)).unwrap();
        assert!((score.total - 0.825).abs() < 1e-12);
        assert_eq!(score.level, SalienceLevel::High);
        assert!(gate
            .check_admission(&score, &healthy_metrics(), true, 0.5, 0.0)
            .admitted);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(SalienceLevel::from_total(0.0), SalienceLevel::Minimal);
        assert_eq!(SalienceLevel::from_total(0.25), SalienceLevel::Low);
        assert_eq!(SalienceLevel::from_total(0.50), SalienceLevel::Medium);
        assert_eq!(SalienceLevel::from_total(0.75), SalienceLevel::High);
        assert_eq!(SalienceLevel::from_total(0.85), SalienceLevel::Critical);
        assert!(SalienceLevel::Critical > SalienceLevel::High);
    }

    #[test]
    fn test_out_of_range_components_rejected() {
        let gate = SalienceGate::new(SalienceConfig::default());
        let err = gate.evaluate(&SalienceInput::new(1.2, 0.5, 0.5)).unwrap_err();
        assert!(matches!(err, CoreError::ValidationError { ref field, .. } if field == "novelty"));
        assert!(gate
            .evaluate(&SalienceInput::new(0.5, f64::NAN, 0.5))
            .is_err());
    }

    #[test]
    fn test_arousal_moves_threshold() {
        let gate = SalienceGate::new(SalienceConfig::default());
        let calm = gate.effective_threshold(0.0, 0.0);
        let neutral = gate.effective_threshold(0.5, 0.0);
        let alert = gate.effective_threshold(1.0, 0.0);
        assert!(calm > neutral && neutral > alert);
        assert!((alert - 0.45).abs() < 1e-12);
        assert!((gate.effective_threshold(0.5, 0.15) - 0.75).abs() < 1e-12);
        assert!(gate.effective_threshold(0.0, 5.0) <= 1.0);
    }

    #[test]
    fn test_every_failed_condition_reported() {
        let gate = SalienceGate::new(SalienceConfig::default());
        let score = gate.evaluate(&SalienceInput::new(0.1, 0.1, 0.1)).unwrap();
        let metrics = FabricMetrics {
            mean_latency_ms: 7.0,
            healthy_nodes: 3,
            available_capacity: 0.1,
            ..FabricMetrics::default()
        };
        let decision = gate.check_admission(&score, &metrics, false, 0.5, 0.0);
        assert!(!decision.admitted);
        assert_eq!(
            decision.codes(),
            vec![
                "BELOW_THRESHOLD",
                "CLOCK_NOT_READY",
                "LATENCY_CEILING",
                "INSUFFICIENT_NODES",
                "INSUFFICIENT_CAPACITY"
            ]
        );
    }

    #[test]
    fn test_rejection_reason_serializes_with_code() {
        let json = serde_json::to_value(RejectionReason::RateLimited).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
    }
}
