//! Signal sources.

use serde::{Deserialize, Serialize};

use super::SalienceInput;

/// Anything that can express itself as a salience input.
pub trait SalienceProvider {
    /// Label carried into the input's `source` field.
    fn name(&self) -> &str;

    fn compute_salience(&self) -> SalienceInput;
}

/// The closed set of signal origins the cluster accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalSource {
    /// Sensory stream: `change` drives novelty, `intensity` drives relevance.
    Sensory { intensity: f64, change: f64 },
    /// Goal progress: relevance to the active goal and deadline pressure.
    Goal { relevance: f64, deadline_pressure: f64 },
    /// Alarm condition. Alerts are novel and urgent in proportion to severity.
    Alert { severity: f64 },
    /// Operator-built input, passed through unchanged.
    Manual(SalienceInput),
}

impl SalienceProvider for SignalSource {
    fn name(&self) -> &str {
        match self {
            SignalSource::Sensory { .. } => "sensory",
            SignalSource::Goal { .. } => "goal",
            SignalSource::Alert { .. } => "alert",
            SignalSource::Manual(input) => &input.source,
        }
    }

    fn compute_salience(&self) -> SalienceInput {
        let input = match self {
            SignalSource::Sensory { intensity, change } => {
                let (intensity, change) = (unit(*intensity), unit(*change));
                SalienceInput::new(change, intensity, intensity * change).with_confidence(0.9)
            }
            SignalSource::Goal {
                relevance,
                deadline_pressure,
            } => SalienceInput::new(0.3, unit(*relevance), unit(*deadline_pressure)),
            SignalSource::Alert { severity } => {
                let severity = unit(*severity);
                SalienceInput::new(0.8, severity, severity)
            }
            SignalSource::Manual(input) => return input.clone(),
        };
        input.with_source(self.name())
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_produce_bounded_inputs() {
        let sources = [
            SignalSource::Sensory {
                intensity: 1.4,
                change: 0.5,
            },
            SignalSource::Goal {
                relevance: 0.9,
                deadline_pressure: f64::NAN,
            },
            SignalSource::Alert { severity: 0.95 },
        ];
        for source in &sources {
            let input = source.compute_salience();
            assert_eq!(input.source, source.name());
            for v in [input.novelty, input.relevance, input.urgency, input.confidence] {
                assert!((0.0..=1.0).contains(&v), "{} out of range for {}", v, source.name());
            }
        }
    }

    #[test]
    fn test_manual_passes_through() {
        let input = SalienceInput::new(0.9, 0.8, 0.7).with_source("operator");
        let source = SignalSource::Manual(input.clone());
        assert_eq!(source.name(), "operator");
        assert_eq!(source.compute_salience(), input);
    }

    #[test]
    fn test_alert_is_urgent() {
        let input = SignalSource::Alert { severity: 0.9 }.compute_salience();
        assert_eq!(input.urgency, 0.9);
        assert_eq!(input.novelty, 0.8);
    }
}
