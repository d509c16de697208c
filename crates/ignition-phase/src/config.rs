//! Phase engine configuration.
//!
//! Controls the coupled-oscillator dynamics: coupling strength, the band of
//! natural frequencies, integration step, integrator choice and noise.

use serde::{Deserialize, Serialize};

use crate::error::{PhaseError, PhaseResult};
use crate::thresholds::CoherenceThresholds;

/// Upper bound accepted for the coupling strength K (rad/s).
pub const MAX_COUPLING_STRENGTH: f64 = 1_000.0;

/// Numerical integration scheme for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    /// Classic fourth-order Runge–Kutta.
    #[default]
    RungeKutta4,
    /// Forward Euler. Cheaper, lower fidelity.
    Euler,
}

/// Which oscillators a node couples to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingMode {
    /// Only fabric neighbors, normalized by node degree.
    #[default]
    Neighbors,
    /// Every other oscillator, normalized by N.
    Global,
}

/// Kuramoto engine settings.
///
/// # Example
///
/// ```
/// use ignition_phase::PhaseConfig;
///
/// let config = PhaseConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.coupling_strength, 20.0);
/// assert!((config.dt() - 0.010).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Coupling strength K in rad/s.
    #[serde(default = "default_coupling_strength")]
    pub coupling_strength: f64,

    /// Center of the natural-frequency band (Hz). Gamma band by default.
    #[serde(default = "default_natural_frequency_hz")]
    pub natural_frequency_hz: f64,

    /// Half-width of the uniform natural-frequency band (Hz).
    #[serde(default = "default_frequency_spread_hz")]
    pub frequency_spread_hz: f64,

    /// Standard deviation of the additive phase noise (rad / √s).
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f64,

    /// Phase diffusion of an uncoupled node between ignitions (rad²/s).
    ///
    /// A group released from perfect alignment decays as r ≈ e^(−D·t), so the
    /// default loses ignition-level coherence within a few hundred ms.
    #[serde(default = "default_free_run_diffusion")]
    pub free_run_diffusion: f64,

    /// Integration step per tick in milliseconds.
    ///
    /// 10 ms (100 Hz) keeps the step well inside RK4's stability region for
    /// K up to a few hundred rad/s.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default)]
    pub integrator: Integrator,

    #[serde(default)]
    pub coupling_mode: CouplingMode,

    #[serde(default)]
    pub thresholds: CoherenceThresholds,

    /// Seed for initial phases, frequencies and noise. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_coupling_strength() -> f64 {
    20.0
}

fn default_natural_frequency_hz() -> f64 {
    40.0
}

fn default_frequency_spread_hz() -> f64 {
    0.25
}

fn default_noise_amplitude() -> f64 {
    0.001
}

fn default_free_run_diffusion() -> f64 {
    4.0
}

fn default_tick_ms() -> u64 {
    10
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            coupling_strength: default_coupling_strength(),
            natural_frequency_hz: default_natural_frequency_hz(),
            frequency_spread_hz: default_frequency_spread_hz(),
            noise_amplitude: default_noise_amplitude(),
            free_run_diffusion: default_free_run_diffusion(),
            tick_ms: default_tick_ms(),
            integrator: Integrator::default(),
            coupling_mode: CouplingMode::default(),
            thresholds: CoherenceThresholds::default(),
            seed: None,
        }
    }
}

impl PhaseConfig {
    /// Integration step in seconds.
    #[inline]
    pub fn dt(&self) -> f64 {
        self.tick_ms as f64 / 1000.0
    }

    /// Noise amplitude (rad / √s) that reproduces the free-running diffusion
    /// inside [`KuramotoNetwork::step`](crate::KuramotoNetwork::step).
    #[inline]
    pub fn free_run_noise_amplitude(&self) -> f64 {
        (2.0 * self.free_run_diffusion).sqrt()
    }

    /// Copy of this config with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the phase configuration.
    pub fn validate(&self) -> PhaseResult<()> {
        for (field, value) in [
            ("coupling_strength", self.coupling_strength),
            ("natural_frequency_hz", self.natural_frequency_hz),
            ("frequency_spread_hz", self.frequency_spread_hz),
            ("noise_amplitude", self.noise_amplitude),
            ("free_run_diffusion", self.free_run_diffusion),
        ] {
            if !value.is_finite() {
                return Err(PhaseError::NonFinite { field, value });
            }
        }
        if !(0.0..=MAX_COUPLING_STRENGTH).contains(&self.coupling_strength) {
            return Err(PhaseError::InvalidConfig(format!(
                "coupling_strength must be in [0, {}], got {}",
                MAX_COUPLING_STRENGTH, self.coupling_strength
            )));
        }
        if self.natural_frequency_hz <= 0.0 {
            return Err(PhaseError::InvalidConfig(format!(
                "natural_frequency_hz must be > 0, got {}",
                self.natural_frequency_hz
            )));
        }
        if self.frequency_spread_hz < 0.0 || self.frequency_spread_hz >= self.natural_frequency_hz {
            return Err(PhaseError::InvalidConfig(format!(
                "frequency_spread_hz must be in [0, natural_frequency_hz), got {}",
                self.frequency_spread_hz
            )));
        }
        if self.noise_amplitude < 0.0 {
            return Err(PhaseError::InvalidConfig(format!(
                "noise_amplitude must be >= 0, got {}",
                self.noise_amplitude
            )));
        }
        if self.free_run_diffusion < 0.0 {
            return Err(PhaseError::InvalidConfig(format!(
                "free_run_diffusion must be >= 0, got {}",
                self.free_run_diffusion
            )));
        }
        if self.tick_ms == 0 {
            return Err(PhaseError::InvalidConfig(
                "tick_ms must be greater than 0".into(),
            ));
        }
        self.thresholds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PhaseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.integrator, Integrator::RungeKutta4);
        assert_eq!(config.coupling_mode, CouplingMode::Neighbors);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = PhaseConfig::default();
        config.coupling_strength = -1.0;
        assert!(config.validate().is_err());

        let mut config = PhaseConfig::default();
        config.tick_ms = 0;
        assert!(config.validate().is_err());

        let mut config = PhaseConfig::default();
        config.frequency_spread_hz = 50.0;
        assert!(config.validate().is_err());

        let mut config = PhaseConfig::default();
        config.free_run_diffusion = -0.5;
        assert!(config.validate().is_err());

        let mut config = PhaseConfig::default();
        config.noise_amplitude = f64::INFINITY;
        assert!(matches!(
            config.validate(),
            Err(PhaseError::NonFinite { field: "noise_amplitude", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PhaseConfig =
            serde_json::from_str(r#"{"coupling_strength": 8.0, "integrator": "euler"}"#).unwrap();
        assert_eq!(config.coupling_strength, 8.0);
        assert_eq!(config.integrator, Integrator::Euler);
        assert_eq!(config.tick_ms, 10);
        assert_eq!(config.thresholds, CoherenceThresholds::default());
    }
}
