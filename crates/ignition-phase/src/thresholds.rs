//! Coherence thresholds and classification of the order parameter.
//!
//! The order parameter r ∈ [0, 1] is mapped onto four coherence levels:
//!
//! | Level        | Range                      |
//! |--------------|----------------------------|
//! | Unconscious  | r < preconscious (0.30)    |
//! | Preconscious | preconscious ≤ r < conscious (0.70) |
//! | Conscious    | conscious ≤ r ≤ deep (0.90) |
//! | Deep         | r > deep                   |
//!
//! The boundaries are configuration, not physics: they are validated for
//! monotonicity but otherwise free.
//!
//! # Invariants
//!
//! For valid thresholds: 0 < preconscious < conscious < deep < 1

use serde::{Deserialize, Serialize};

use crate::error::{PhaseError, PhaseResult};

/// Coherence level derived from the order parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceLevel {
    /// Phases effectively independent.
    Unconscious,
    /// Partial alignment, not yet sufficient for broadcast.
    Preconscious,
    /// Alignment sufficient for ignition.
    Conscious,
    /// Near-complete alignment.
    Deep,
}

impl CoherenceLevel {
    /// Whether this level permits a broadcast.
    #[inline]
    pub fn is_ignited(self) -> bool {
        matches!(self, CoherenceLevel::Conscious | CoherenceLevel::Deep)
    }
}

impl std::fmt::Display for CoherenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoherenceLevel::Unconscious => "unconscious",
            CoherenceLevel::Preconscious => "preconscious",
            CoherenceLevel::Conscious => "conscious",
            CoherenceLevel::Deep => "deep",
        };
        f.write_str(name)
    }
}

/// Boundaries between coherence levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoherenceThresholds {
    /// r at or above which the network is preconscious.
    #[serde(default = "default_preconscious")]
    pub preconscious: f64,
    /// r at or above which the network is conscious (ignition gate).
    #[serde(default = "default_conscious")]
    pub conscious: f64,
    /// r strictly above which coherence is deep.
    #[serde(default = "default_deep")]
    pub deep: f64,
}

fn default_preconscious() -> f64 {
    0.30
}

fn default_conscious() -> f64 {
    0.70
}

fn default_deep() -> f64 {
    0.90
}

impl Default for CoherenceThresholds {
    fn default() -> Self {
        Self {
            preconscious: default_preconscious(),
            conscious: default_conscious(),
            deep: default_deep(),
        }
    }
}

impl CoherenceThresholds {
    /// Build thresholds, rejecting non-monotonic or out-of-range values.
    pub fn new(preconscious: f64, conscious: f64, deep: f64) -> PhaseResult<Self> {
        let thresholds = Self {
            preconscious,
            conscious,
            deep,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Validate range and monotonicity.
    pub fn validate(&self) -> PhaseResult<()> {
        for (field, value) in [
            ("thresholds.preconscious", self.preconscious),
            ("thresholds.conscious", self.conscious),
            ("thresholds.deep", self.deep),
        ] {
            if !value.is_finite() {
                return Err(PhaseError::NonFinite { field, value });
            }
            if !(0.0..1.0).contains(&value) || value == 0.0 {
                return Err(PhaseError::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    field, value
                )));
            }
        }
        if self.preconscious >= self.conscious || self.conscious >= self.deep {
            return Err(PhaseError::InvalidConfig(format!(
                "thresholds must satisfy preconscious < conscious < deep, got {} / {} / {}",
                self.preconscious, self.conscious, self.deep
            )));
        }
        Ok(())
    }

    /// Classify an order parameter value.
    pub fn classify(&self, r: f64) -> CoherenceLevel {
        if r > self.deep {
            CoherenceLevel::Deep
        } else if r >= self.conscious {
            CoherenceLevel::Conscious
        } else if r >= self.preconscious {
            CoherenceLevel::Preconscious
        } else {
            CoherenceLevel::Unconscious
        }
    }

    /// Check if r is high enough to ignite.
    #[inline]
    pub fn is_ignition(&self, r: f64) -> bool {
        r >= self.conscious
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_boundaries() {
        let t = CoherenceThresholds::default();
        assert_eq!(t.classify(0.10), CoherenceLevel::Unconscious);
        assert_eq!(t.classify(0.30), CoherenceLevel::Preconscious);
        assert_eq!(t.classify(0.69), CoherenceLevel::Preconscious);
        assert_eq!(t.classify(0.70), CoherenceLevel::Conscious);
        assert_eq!(t.classify(0.90), CoherenceLevel::Conscious);
        assert_eq!(t.classify(0.91), CoherenceLevel::Deep);
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(CoherenceLevel::Unconscious < CoherenceLevel::Preconscious);
        assert!(CoherenceLevel::Preconscious < CoherenceLevel::Conscious);
        assert!(CoherenceLevel::Conscious < CoherenceLevel::Deep);
        assert!(CoherenceLevel::Deep.is_ignited());
        assert!(!CoherenceLevel::Preconscious.is_ignited());
    }

    #[test]
    fn test_rejects_non_monotonic() {
        assert!(CoherenceThresholds::new(0.5, 0.4, 0.9).is_err());
        assert!(CoherenceThresholds::new(0.3, 0.9, 0.9).is_err());
        assert!(CoherenceThresholds::new(0.0, 0.7, 0.9).is_err());
        assert!(CoherenceThresholds::new(0.3, 0.7, 1.0).is_err());
        assert!(CoherenceThresholds::new(f64::NAN, 0.7, 0.9).is_err());
    }

    #[test]
    fn test_custom_thresholds_shift_classification() {
        let t = CoherenceThresholds::new(0.2, 0.5, 0.8).unwrap();
        assert_eq!(t.classify(0.55), CoherenceLevel::Conscious);
        assert!(t.is_ignition(0.5));
        assert!(!t.is_ignition(0.49));
    }
}
