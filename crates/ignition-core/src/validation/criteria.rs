use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Thresholds for [`score_event`](super::score_event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCriteria {
    #[serde(default = "default_min_coherence")]
    pub min_mean_coherence: f64,
    #[serde(default = "default_min_coherence")]
    pub min_peak_coherence: f64,
    /// Upper bound (exclusive) on wall-clock time to first ignition (ms).
    #[serde(default = "default_max_time_to_ignition_ms")]
    pub max_time_to_ignition_ms: f64,
    /// Participating fraction of eligible nodes.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    /// Inclusive sustain window (ms).
    #[serde(default = "default_sustain_range_ms")]
    pub sustain_range_ms: (f64, f64),
    /// Upper bound (exclusive) on the coefficient of variation of r.
    #[serde(default = "default_max_cv")]
    pub max_coefficient_of_variation: f64,
}

fn default_min_coherence() -> f64 {
    0.70
}

fn default_max_time_to_ignition_ms() -> f64 {
    15.0
}

fn default_min_coverage() -> f64 {
    0.60
}

fn default_sustain_range_ms() -> (f64, f64) {
    (100.0, 300.0)
}

fn default_max_cv() -> f64 {
    0.20
}

impl Default for EventCriteria {
    fn default() -> Self {
        Self {
            min_mean_coherence: default_min_coherence(),
            min_peak_coherence: default_min_coherence(),
            max_time_to_ignition_ms: default_max_time_to_ignition_ms(),
            min_coverage: default_min_coverage(),
            sustain_range_ms: default_sustain_range_ms(),
            max_coefficient_of_variation: default_max_cv(),
        }
    }
}

impl EventCriteria {
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [
            ("min_mean_coherence", self.min_mean_coherence),
            ("min_peak_coherence", self.min_peak_coherence),
            ("min_coverage", self.min_coverage),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(CoreError::ConfigError(format!(
                    "validation.event.{} must be in [0, 1], got {}",
                    field, value
                )));
            }
        }
        if !self.max_time_to_ignition_ms.is_finite() || self.max_time_to_ignition_ms <= 0.0 {
            return Err(CoreError::ConfigError(
                "validation.event.max_time_to_ignition_ms must be > 0".into(),
            ));
        }
        let (lo, hi) = self.sustain_range_ms;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
            return Err(CoreError::ConfigError(format!(
                "validation.event.sustain_range_ms must be an ordered non-negative range, got ({}, {})",
                lo, hi
            )));
        }
        if !self.max_coefficient_of_variation.is_finite() || self.max_coefficient_of_variation <= 0.0
        {
            return Err(CoreError::ConfigError(
                "validation.event.max_coefficient_of_variation must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Thresholds for [`score_topology`](super::score_topology).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyCriteria {
    #[serde(default = "default_min_clustering")]
    pub min_clustering: f64,
    /// Average path length must not exceed this multiple of ln(N).
    #[serde(default = "default_max_path_length_factor")]
    pub max_path_length_factor: f64,
    #[serde(default = "default_min_algebraic_connectivity")]
    pub min_algebraic_connectivity: f64,
}

fn default_min_clustering() -> f64 {
    0.75
}

fn default_max_path_length_factor() -> f64 {
    1.0
}

fn default_min_algebraic_connectivity() -> f64 {
    0.3
}

impl Default for TopologyCriteria {
    fn default() -> Self {
        Self {
            min_clustering: default_min_clustering(),
            max_path_length_factor: default_max_path_length_factor(),
            min_algebraic_connectivity: default_min_algebraic_connectivity(),
        }
    }
}

impl TopologyCriteria {
    pub fn validate(&self) -> CoreResult<()> {
        if !self.min_clustering.is_finite() || !(0.0..=1.0).contains(&self.min_clustering) {
            return Err(CoreError::ConfigError(format!(
                "validation.topology.min_clustering must be in [0, 1], got {}",
                self.min_clustering
            )));
        }
        if !self.max_path_length_factor.is_finite() || self.max_path_length_factor <= 0.0 {
            return Err(CoreError::ConfigError(
                "validation.topology.max_path_length_factor must be > 0".into(),
            ));
        }
        if !self.min_algebraic_connectivity.is_finite() || self.min_algebraic_connectivity < 0.0 {
            return Err(CoreError::ConfigError(
                "validation.topology.min_algebraic_connectivity must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EventCriteria::default().validate().is_ok());
        assert!(TopologyCriteria::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_sustain_range_rejected() {
        let criteria = EventCriteria {
            sustain_range_ms: (300.0, 100.0),
            ..Default::default()
        };
        assert!(matches!(
            criteria.validate(),
            Err(CoreError::ConfigError(_))
        ));
    }
}
