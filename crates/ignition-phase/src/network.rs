//! Kuramoto oscillator network.
//!
//! Implements the Kuramoto model for coupled phase oscillators:
//!
//! ```text
//! dθᵢ/dt = ωᵢ + (K/Nᵢ) Σⱼ sin(θⱼ - θᵢ) + ξᵢ(t)
//! ```
//!
//! Where:
//! - θᵢ = phase of oscillator i ∈ [0, 2π)
//! - ωᵢ = natural frequency of oscillator i (rad/s)
//! - K = coupling strength (rad/s)
//! - Nᵢ = number of coupled terms: N for global coupling, deg(i) for
//!   neighbor coupling
//! - ξᵢ = Gaussian phase noise
//!
//! The order parameter measures synchronization:
//!
//! ```text
//! r · e^(iψ) = (1/N) Σⱼ e^(iθⱼ)
//! ```
//!
//! # Tick barrier
//!
//! [`KuramotoNetwork::step`] evaluates every derivative against a frozen copy
//! of the previous tick's phases and commits the new phase vector in one
//! assignment. No oscillator ever observes a neighbor mid-update.
//!
//! There is deliberately no damping term toward a reference phase: the
//! network converges to a common but arbitrary phase ψ.

use std::f64::consts::TAU;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CouplingMode, Integrator, PhaseConfig, MAX_COUPLING_STRENGTH};
use crate::error::{PhaseError, PhaseResult};

/// Upper bound on the trace buffer reserved up front by `run_until`.
const TRACE_PREALLOC: u64 = 4096;

/// Kuramoto order parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderParameter {
    /// Coherence magnitude in [0, 1].
    pub r: f64,
    /// Mean phase in [0, 2π).
    pub psi: f64,
}

/// Result of [`KuramotoNetwork::run_until`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Whether the threshold was crossed before the tick budget ran out.
    pub reached: bool,
    /// Ticks executed.
    pub ticks: u64,
    /// r after the last tick.
    pub final_r: f64,
    /// Highest r observed.
    pub peak_r: f64,
    /// r after every tick.
    pub trace: Vec<f64>,
}

#[derive(Debug, Clone)]
enum Coupling {
    Global,
    Neighbors(Vec<Vec<usize>>),
}

/// Network of coupled phase oscillators.
///
/// # Example
///
/// ```
/// use ignition_phase::{KuramotoNetwork, PhaseConfig, CouplingMode};
///
/// let mut config = PhaseConfig::default().with_seed(11);
/// config.coupling_mode = CouplingMode::Global;
/// let mut network = KuramotoNetwork::new(16, &config).unwrap();
///
/// let run = network.run_until(0.70, 200, config.dt());
/// assert!(run.ticks <= 200);
/// assert!((0.0..=1.0).contains(&network.order_parameter().r));
/// ```
#[derive(Debug, Clone)]
pub struct KuramotoNetwork {
    /// Phase angles θᵢ in [0, 2π).
    phases: Vec<f64>,

    /// Natural frequencies ωᵢ (rad/s).
    natural_frequencies: Vec<f64>,

    /// Coupling strength K.
    coupling_strength: f64,

    coupling: Coupling,

    integrator: Integrator,

    /// Noise standard deviation (rad / √s).
    noise_amplitude: f64,

    /// Phase diffusion D (rad²/s) applied by [`free_run`](Self::free_run).
    free_run_diffusion: f64,

    rng: ChaCha8Rng,

    /// Simulated seconds since creation or reset.
    elapsed: f64,

    ticks: u64,
}

impl KuramotoNetwork {
    /// Create an all-to-all network of `n` oscillators.
    ///
    /// Initial phases are uniform on [0, 2π) and natural frequencies uniform on
    /// `natural_frequency_hz ± frequency_spread_hz`, both drawn from the
    /// configured seed. Use [`from_parts`](Self::from_parts) to couple along
    /// an explicit adjacency.
    pub fn new(n: usize, config: &PhaseConfig) -> PhaseResult<Self> {
        config.validate()?;
        if n == 0 {
            return Err(PhaseError::EmptyNetwork);
        }

        let mut rng = seeded_rng(config.seed);
        let phases = (0..n).map(|_| rng.gen_range(0.0..TAU)).collect();
        let natural_frequencies = (0..n)
            .map(|_| sample_frequency_hz(&mut rng, config) * TAU)
            .collect();

        Ok(Self {
            phases,
            natural_frequencies,
            coupling_strength: config.coupling_strength,
            coupling: Coupling::Global,
            integrator: config.integrator,
            noise_amplitude: config.noise_amplitude,
            free_run_diffusion: config.free_run_diffusion,
            rng,
            elapsed: 0.0,
            ticks: 0,
        })
    }

    /// Build a network from explicit phases, natural frequencies (Hz) and an
    /// optional adjacency list.
    ///
    /// With [`CouplingMode::Neighbors`] the adjacency is required; with
    /// [`CouplingMode::Global`] it is ignored.
    ///
    /// # Errors
    ///
    /// - `EmptyNetwork` when `phases` is empty
    /// - `DimensionMismatch` when vectors disagree in length
    /// - `NonFinite` for NaN/∞ phases or frequencies
    /// - `InvalidAdjacency` for out-of-range neighbors or self loops
    /// - `MissingAdjacency` for neighbor coupling without adjacency
    pub fn from_parts(
        phases: Vec<f64>,
        frequencies_hz: Vec<f64>,
        adjacency: Option<Vec<Vec<usize>>>,
        config: &PhaseConfig,
    ) -> PhaseResult<Self> {
        config.validate()?;
        let n = phases.len();
        if n == 0 {
            return Err(PhaseError::EmptyNetwork);
        }
        if frequencies_hz.len() != n {
            return Err(PhaseError::DimensionMismatch {
                field: "frequencies_hz",
                expected: n,
                actual: frequencies_hz.len(),
            });
        }
        if let Some(&value) = phases.iter().find(|p| !p.is_finite()) {
            return Err(PhaseError::NonFinite {
                field: "phases",
                value,
            });
        }
        if let Some(&value) = frequencies_hz.iter().find(|f| !f.is_finite()) {
            return Err(PhaseError::NonFinite {
                field: "frequencies_hz",
                value,
            });
        }

        let coupling = match (config.coupling_mode, adjacency) {
            (CouplingMode::Global, _) => Coupling::Global,
            (CouplingMode::Neighbors, Some(adjacency)) => {
                validate_adjacency(&adjacency, n)?;
                Coupling::Neighbors(adjacency)
            }
            (CouplingMode::Neighbors, None) => return Err(PhaseError::MissingAdjacency),
        };

        Ok(Self {
            phases: phases.into_iter().map(wrap_phase).collect(),
            natural_frequencies: frequencies_hz.into_iter().map(|f| f * TAU).collect(),
            coupling_strength: config.coupling_strength,
            coupling,
            integrator: config.integrator,
            noise_amplitude: config.noise_amplitude,
            free_run_diffusion: config.free_run_diffusion,
            rng: seeded_rng(config.seed),
            elapsed: 0.0,
            ticks: 0,
        })
    }

    /// Number of oscillators.
    #[inline]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always false; a network has at least one oscillator.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Advance every oscillator by `dt` seconds.
    ///
    /// All derivatives are computed from the frozen phase vector of the
    /// previous tick; the new vector replaces it atomically.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }

        let snapshot = self.phases.clone();
        let mut next = match self.integrator {
            Integrator::RungeKutta4 => self.rk4(&snapshot, dt),
            Integrator::Euler => self.euler(&snapshot, dt),
        };

        if self.noise_amplitude > 0.0 {
            let scale = self.noise_amplitude * dt.sqrt();
            for phase in next.iter_mut() {
                let xi: f64 = self.rng.sample(StandardNormal);
                *phase += scale * xi;
            }
        }

        for phase in next.iter_mut() {
            *phase = wrap_phase(*phase);
        }

        self.phases = next;
        self.elapsed += dt;
        self.ticks += 1;
    }

    /// Let each oscillator drift uncoupled for its own span of seconds.
    ///
    /// Oscillator i advances by ωᵢ·tᵢ plus Gaussian diffusion with variance
    /// 2·D·tᵢ. Coupling is not applied and the tick counter and elapsed time
    /// are untouched. Negative spans count as zero.
    ///
    /// # Errors
    ///
    /// - `DimensionMismatch` when `elapsed_secs` does not have one entry per oscillator
    /// - `NonFinite` for NaN/∞ spans
    pub fn free_run(&mut self, elapsed_secs: &[f64]) -> PhaseResult<()> {
        if elapsed_secs.len() != self.phases.len() {
            return Err(PhaseError::DimensionMismatch {
                field: "elapsed_secs",
                expected: self.phases.len(),
                actual: elapsed_secs.len(),
            });
        }
        if let Some(&value) = elapsed_secs.iter().find(|t| !t.is_finite()) {
            return Err(PhaseError::NonFinite {
                field: "elapsed_secs",
                value,
            });
        }

        for (i, &t) in elapsed_secs.iter().enumerate() {
            let t = t.max(0.0);
            let mut phase = self.phases[i] + self.natural_frequencies[i] * t;
            if self.free_run_diffusion > 0.0 && t > 0.0 {
                let xi: f64 = self.rng.sample(StandardNormal);
                phase += (2.0 * self.free_run_diffusion * t).sqrt() * xi;
            }
            self.phases[i] = wrap_phase(phase);
        }
        Ok(())
    }

    /// Step until r ≥ `threshold` or `max_ticks` ticks have run.
    pub fn run_until(&mut self, threshold: f64, max_ticks: u64, dt: f64) -> SyncRun {
        let mut trace = Vec::with_capacity(max_ticks.min(TRACE_PREALLOC) as usize);
        let mut peak_r = self.order_parameter().r;
        let mut ticks = 0;
        let mut reached = peak_r >= threshold;

        while !reached && ticks < max_ticks {
            self.step(dt);
            ticks += 1;
            let r = self.order_parameter().r;
            trace.push(r);
            peak_r = peak_r.max(r);
            reached = r >= threshold;
        }

        let final_r = self.order_parameter().r;
        debug!(
            reached,
            ticks,
            final_r,
            peak_r,
            threshold,
            "Phase network run finished"
        );

        SyncRun {
            reached,
            ticks,
            final_r,
            peak_r,
            trace,
        }
    }

    /// Compute the Kuramoto order parameter (r, ψ).
    pub fn order_parameter(&self) -> OrderParameter {
        order_parameter(&self.phases)
    }

    /// All phases.
    #[inline]
    pub fn phases(&self) -> &[f64] {
        &self.phases
    }

    /// Phase of one oscillator.
    pub fn phase(&self, index: usize) -> Option<f64> {
        self.phases.get(index).copied()
    }

    /// Set the phase of one oscillator (wrapped to [0, 2π)).
    pub fn set_phase(&mut self, index: usize, phase: f64) -> PhaseResult<()> {
        self.check_index(index)?;
        if !phase.is_finite() {
            return Err(PhaseError::NonFinite {
                field: "phase",
                value: phase,
            });
        }
        self.phases[index] = wrap_phase(phase);
        Ok(())
    }

    /// Add `delta` radians to one oscillator's phase.
    pub fn perturb(&mut self, index: usize, delta: f64) -> PhaseResult<()> {
        self.check_index(index)?;
        let current = self.phases[index];
        self.set_phase(index, current + delta)
    }

    /// Redraw every phase uniformly on [0, 2π).
    pub fn randomize_phases(&mut self) {
        for phase in self.phases.iter_mut() {
            *phase = self.rng.gen_range(0.0..TAU);
        }
        self.elapsed = 0.0;
        self.ticks = 0;
    }

    /// Smallest angular distance between two oscillators, in [0, π].
    pub fn phase_difference(&self, i: usize, j: usize) -> Option<f64> {
        let a = *self.phases.get(i)?;
        let b = *self.phases.get(j)?;
        let diff = (a - b).rem_euclid(TAU);
        Some(if diff > std::f64::consts::PI {
            TAU - diff
        } else {
            diff
        })
    }

    /// Natural frequency of one oscillator in Hz.
    pub fn natural_frequency_hz(&self, index: usize) -> Option<f64> {
        self.natural_frequencies.get(index).map(|w| w / TAU)
    }

    #[inline]
    pub fn coupling_strength(&self) -> f64 {
        self.coupling_strength
    }

    /// Set K, clamped to [0, MAX_COUPLING_STRENGTH].
    pub fn set_coupling_strength(&mut self, k: f64) {
        if k.is_finite() {
            self.coupling_strength = k.clamp(0.0, MAX_COUPLING_STRENGTH);
        }
    }

    /// Noise standard deviation (rad / √s) applied per step.
    #[inline]
    pub fn noise_amplitude(&self) -> f64 {
        self.noise_amplitude
    }

    /// Set the per-step noise amplitude. Negative or non-finite values are ignored.
    pub fn set_noise_amplitude(&mut self, amplitude: f64) {
        if amplitude.is_finite() && amplitude >= 0.0 {
            self.noise_amplitude = amplitude;
        }
    }

    /// Whether coupling follows an explicit adjacency.
    pub fn is_neighbor_coupled(&self) -> bool {
        matches!(self.coupling, Coupling::Neighbors(_))
    }

    /// Simulated seconds elapsed.
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }

    /// Ticks executed.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    fn check_index(&self, index: usize) -> PhaseResult<()> {
        if index >= self.phases.len() {
            return Err(PhaseError::IndexOutOfRange {
                index,
                len: self.phases.len(),
            });
        }
        Ok(())
    }

    /// dθ/dt for every oscillator given a phase vector.
    fn derivatives(&self, phases: &[f64], out: &mut [f64]) {
        let k = self.coupling_strength;
        match &self.coupling {
            Coupling::Global => {
                // Σⱼ sin(θⱼ - θᵢ) = S·cos θᵢ - C·sin θᵢ with S = Σ sin θⱼ, C = Σ cos θⱼ
                let n = phases.len() as f64;
                let (sum_sin, sum_cos) = phases
                    .iter()
                    .fold((0.0, 0.0), |(s, c), &p| (s + p.sin(), c + p.cos()));
                for (i, d) in out.iter_mut().enumerate() {
                    let theta = phases[i];
                    let coupling = sum_sin * theta.cos() - sum_cos * theta.sin();
                    *d = self.natural_frequencies[i] + (k / n) * coupling;
                }
            }
            Coupling::Neighbors(adjacency) => {
                for (i, d) in out.iter_mut().enumerate() {
                    let neighbors = &adjacency[i];
                    let mut term = 0.0;
                    if !neighbors.is_empty() {
                        let theta = phases[i];
                        let sum: f64 = neighbors.iter().map(|&j| (phases[j] - theta).sin()).sum();
                        term = (k / neighbors.len() as f64) * sum;
                    }
                    *d = self.natural_frequencies[i] + term;
                }
            }
        }
    }

    fn euler(&self, state: &[f64], dt: f64) -> Vec<f64> {
        let mut k1 = vec![0.0; state.len()];
        self.derivatives(state, &mut k1);
        state.iter().zip(&k1).map(|(t, d)| t + dt * d).collect()
    }

    fn rk4(&self, state: &[f64], dt: f64) -> Vec<f64> {
        let n = state.len();
        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];
        let mut probe = vec![0.0; n];

        self.derivatives(state, &mut k1);
        for i in 0..n {
            probe[i] = state[i] + 0.5 * dt * k1[i];
        }
        self.derivatives(&probe, &mut k2);
        for i in 0..n {
            probe[i] = state[i] + 0.5 * dt * k2[i];
        }
        self.derivatives(&probe, &mut k3);
        for i in 0..n {
            probe[i] = state[i] + dt * k3[i];
        }
        self.derivatives(&probe, &mut k4);

        (0..n)
            .map(|i| state[i] + dt / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]))
            .collect()
    }
}

/// Order parameter of an arbitrary phase vector. Empty input yields r = 0.
pub fn order_parameter(phases: &[f64]) -> OrderParameter {
    if phases.is_empty() {
        return OrderParameter { r: 0.0, psi: 0.0 };
    }
    let n = phases.len() as f64;
    let (sum_cos, sum_sin) = phases
        .iter()
        .fold((0.0, 0.0), |(c, s), &p| (c + p.cos(), s + p.sin()));
    let avg_cos = sum_cos / n;
    let avg_sin = sum_sin / n;
    OrderParameter {
        r: (avg_cos * avg_cos + avg_sin * avg_sin).sqrt().min(1.0),
        psi: avg_sin.atan2(avg_cos).rem_euclid(TAU),
    }
}

/// Wrap a phase to [0, 2π).
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid can return TAU itself for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn sample_frequency_hz(rng: &mut ChaCha8Rng, config: &PhaseConfig) -> f64 {
    if config.frequency_spread_hz == 0.0 {
        return config.natural_frequency_hz;
    }
    rng.gen_range(
        (config.natural_frequency_hz - config.frequency_spread_hz)
            ..=(config.natural_frequency_hz + config.frequency_spread_hz),
    )
}

fn validate_adjacency(adjacency: &[Vec<usize>], n: usize) -> PhaseResult<()> {
    if adjacency.len() != n {
        return Err(PhaseError::DimensionMismatch {
            field: "adjacency",
            expected: n,
            actual: adjacency.len(),
        });
    }
    for (node, neighbors) in adjacency.iter().enumerate() {
        for &neighbor in neighbors {
            if neighbor >= n {
                return Err(PhaseError::InvalidAdjacency {
                    node,
                    neighbor,
                    reason: "neighbor out of range",
                });
            }
            if neighbor == node {
                return Err(PhaseError::InvalidAdjacency {
                    node,
                    neighbor,
                    reason: "self loop",
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn global_config(seed: u64) -> PhaseConfig {
        let mut config = PhaseConfig::default().with_seed(seed);
        config.coupling_mode = CouplingMode::Global;
        config
    }

    fn evenly_spread(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / n as f64 * TAU).collect()
    }

    #[test]
    fn test_aligned_phases_have_r_near_one() {
        let config = global_config(1);
        let network = KuramotoNetwork::from_parts(vec![1.0; 8], vec![40.0; 8], None, &config).unwrap();
        let op = network.order_parameter();
        assert!(op.r > 0.999, "aligned network should have r ≈ 1, got {}", op.r);
        assert!((op.psi - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_evenly_spread_phases_have_r_near_zero() {
        let config = global_config(1);
        let network =
            KuramotoNetwork::from_parts(evenly_spread(13), vec![40.0; 13], None, &config).unwrap();
        assert!(network.order_parameter().r < 1e-9);
    }

    #[test]
    fn test_step_updates_and_wraps_phases() {
        let mut network = KuramotoNetwork::new(8, &global_config(3)).unwrap();
        let before = network.phases().to_vec();
        network.step(0.01);
        assert_ne!(network.phases(), before.as_slice());
        assert!(network.phases().iter().all(|p| (0.0..TAU).contains(p)));
        assert_eq!(network.ticks(), 1);
        assert!((network.elapsed_secs() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_update_reads_frozen_snapshot() {
        // Two oscillators, ω = 0, K/N = 1, Euler, no noise.
        // From the previous tick: dθ0 = sin(π/2) = 1, dθ1 = sin(-π/2) = -1.
        // An in-place update would feed θ0' into θ1's derivative.
        let mut config = global_config(5);
        config.coupling_strength = 2.0;
        config.integrator = Integrator::Euler;
        config.noise_amplitude = 0.0;
        let mut network =
            KuramotoNetwork::from_parts(vec![0.0, PI / 2.0], vec![0.0, 0.0], None, &config).unwrap();

        network.step(0.1);

        assert!((network.phase(0).unwrap() - 0.1).abs() < 1e-12);
        assert!((network.phase(1).unwrap() - (PI / 2.0 - 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_rk4_matches_euler_for_uncoupled_rotation() {
        let mut config = global_config(2);
        config.coupling_strength = 0.0;
        config.noise_amplitude = 0.0;
        let mut rk4 = KuramotoNetwork::from_parts(vec![0.5], vec![2.0], None, &config).unwrap();
        config.integrator = Integrator::Euler;
        let mut euler = KuramotoNetwork::from_parts(vec![0.5], vec![2.0], None, &config).unwrap();

        rk4.step(0.01);
        euler.step(0.01);

        let expected = wrap_phase(0.5 + 2.0 * TAU * 0.01);
        assert!((rk4.phase(0).unwrap() - expected).abs() < 1e-12);
        assert!((euler.phase(0).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_k20_n16_gamma_band_ignites_within_50_ticks() {
        let config = global_config(42);
        let mut network = KuramotoNetwork::new(16, &config).unwrap();
        for i in 0..16 {
            let f = network.natural_frequency_hz(i).unwrap();
            assert!((39.75..=40.25).contains(&f));
        }

        let run = network.run_until(0.70, 50, config.dt());
        assert!(
            run.reached,
            "r should exceed 0.70 within 50 ticks, final r = {:.3}",
            run.final_r
        );
    }

    #[test]
    fn test_unbounded_tick_budget_runs_to_threshold() {
        let config = global_config(42);
        let mut network = KuramotoNetwork::new(16, &config).unwrap();

        let run = network.run_until(0.70, u64::MAX, config.dt());

        assert!(run.reached);
        assert_eq!(run.trace.len() as u64, run.ticks);
    }

    #[test]
    fn test_free_run_dephases_aligned_group() {
        let n = 64;
        let config = global_config(17);
        let freqs: Vec<f64> = (0..n).map(|i| 39.75 + i as f64 * (0.5 / n as f64)).collect();
        let mut network = KuramotoNetwork::from_parts(vec![0.3; n], freqs, None, &config).unwrap();
        assert!(network.order_parameter().r > 0.999);

        network.free_run(&vec![2.0; n]).unwrap();

        let r = network.order_parameter().r;
        println!("=== TEST: free-running aligned group ===");
        println!("EVIDENCE: r after 2 s uncoupled = {:.4}", r);
        assert!(r < 0.4, "aligned group should lose coherence, got r = {:.4}", r);
        assert_eq!(network.ticks(), 0);
        assert_eq!(network.elapsed_secs(), 0.0);
    }

    #[test]
    fn test_free_run_without_spread_or_diffusion_is_rigid_rotation() {
        let n = 8;
        let mut config = global_config(3);
        config.free_run_diffusion = 0.0;
        let mut network = KuramotoNetwork::from_parts(vec![1.0; n], vec![40.0; n], None, &config).unwrap();

        network.free_run(&vec![0.123; n]).unwrap();

        assert!(network.order_parameter().r > 0.999_999);
        let expected = wrap_phase(1.0 + 40.0 * TAU * 0.123);
        assert!((network.phase(0).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_free_run_checks_spans() {
        let config = global_config(3);
        let mut network = KuramotoNetwork::new(4, &config).unwrap();
        let before = network.phases().to_vec();

        assert!(matches!(
            network.free_run(&[0.1; 3]),
            Err(PhaseError::DimensionMismatch { field: "elapsed_secs", expected: 4, actual: 3 })
        ));
        assert!(matches!(
            network.free_run(&[0.1, f64::NAN, 0.1, 0.1]),
            Err(PhaseError::NonFinite { field: "elapsed_secs", .. })
        ));
        assert_eq!(network.phases(), before.as_slice());

        // Negative spans leave the oscillator where it is.
        network.free_run(&[-1.0; 4]).unwrap();
        assert_eq!(network.phases(), before.as_slice());
    }

    #[test]
    fn test_noise_amplitude_setter_rejects_invalid() {
        let mut network = KuramotoNetwork::new(4, &global_config(3)).unwrap();
        network.set_noise_amplitude(2.5);
        assert_eq!(network.noise_amplitude(), 2.5);
        network.set_noise_amplitude(-1.0);
        network.set_noise_amplitude(f64::NAN);
        assert_eq!(network.noise_amplitude(), 2.5);
    }

    #[test]
    fn test_coherence_rises_on_average_across_trials() {
        let trials = 10;
        let mut start_sum = 0.0;
        let mut mid_sum = 0.0;
        let mut end_sum = 0.0;

        for seed in 0..trials {
            let config = global_config(100 + seed);
            let mut network = KuramotoNetwork::new(32, &config).unwrap();
            start_sum += network.order_parameter().r;
            for _ in 0..25 {
                network.step(config.dt());
            }
            mid_sum += network.order_parameter().r;
            for _ in 0..75 {
                network.step(config.dt());
            }
            end_sum += network.order_parameter().r;
        }

        let n = trials as f64;
        let (start, mid, end) = (start_sum / n, mid_sum / n, end_sum / n);
        assert!(mid > start, "mean r should rise: {:.3} -> {:.3}", start, mid);
        assert!(end >= mid - 0.02, "mean r should not fall back: {:.3} -> {:.3}", mid, end);
        assert!(end >= 0.70, "mean final r = {:.3}", end);
    }

    #[test]
    fn test_zero_coupling_stays_incoherent() {
        let mut config = global_config(9);
        config.coupling_strength = 0.0;
        let freqs: Vec<f64> = (0..64).map(|i| 39.0 + i as f64 * (2.0 / 64.0)).collect();
        let mut network = KuramotoNetwork::from_parts(evenly_spread(64), freqs, None, &config).unwrap();

        for _ in 0..1000 {
            network.step(0.001);
        }

        let r = network.order_parameter().r;
        assert!(r < 0.8, "uncoupled network should not synchronize, got r = {}", r);
    }

    #[test]
    fn test_neighbor_coupling_on_ring_synchronizes() {
        let n = 12;
        let adjacency: Vec<Vec<usize>> = (0..n)
            .map(|i| vec![(i + n - 1) % n, (i + 1) % n, (i + 2) % n, (i + n - 2) % n])
            .collect();
        let mut config = PhaseConfig::default().with_seed(4);
        config.coupling_mode = CouplingMode::Neighbors;
        // Start inside the in-phase basin; ring lattices also admit twisted states.
        let phases: Vec<f64> = (0..n).map(|i| 0.2 * i as f64).collect();
        let mut network =
            KuramotoNetwork::from_parts(phases, vec![40.0; n], Some(adjacency), &config).unwrap();
        assert!(network.is_neighbor_coupled());

        let run = network.run_until(0.95, 300, config.dt());
        assert!(run.reached, "ring should lock, final r = {:.3}", run.final_r);
    }

    #[test]
    fn test_neighbor_mode_requires_adjacency() {
        let config = PhaseConfig::default();
        let err = KuramotoNetwork::from_parts(vec![0.0; 3], vec![40.0; 3], None, &config).unwrap_err();
        assert_eq!(err, PhaseError::MissingAdjacency);
    }

    #[test]
    fn test_adjacency_validation() {
        let config = PhaseConfig::default();
        let self_loop = vec![vec![0], vec![0]];
        assert!(matches!(
            KuramotoNetwork::from_parts(vec![0.0; 2], vec![40.0; 2], Some(self_loop), &config),
            Err(PhaseError::InvalidAdjacency { node: 0, neighbor: 0, .. })
        ));
        let out_of_range = vec![vec![1], vec![7]];
        assert!(matches!(
            KuramotoNetwork::from_parts(vec![0.0; 2], vec![40.0; 2], Some(out_of_range), &config),
            Err(PhaseError::InvalidAdjacency { node: 1, neighbor: 7, .. })
        ));
    }

    #[test]
    fn test_dimension_and_empty_checks() {
        let config = global_config(1);
        assert_eq!(
            KuramotoNetwork::new(0, &config).unwrap_err(),
            PhaseError::EmptyNetwork
        );
        assert!(matches!(
            KuramotoNetwork::from_parts(vec![0.0; 3], vec![40.0; 2], None, &config),
            Err(PhaseError::DimensionMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_phase_wrapping() {
        let mut network = KuramotoNetwork::new(4, &global_config(1)).unwrap();
        network.set_phase(0, 3.0 * PI).unwrap();
        assert!((network.phase(0).unwrap() - PI).abs() < 1e-12);
        network.set_phase(1, -0.5).unwrap();
        assert!((network.phase(1).unwrap() - (TAU - 0.5)).abs() < 1e-12);
        assert!(network.set_phase(9, 0.0).is_err());
        assert!(network.set_phase(0, f64::NAN).is_err());
    }

    #[test]
    fn test_perturb_reduces_coherence() {
        let config = global_config(1);
        let mut network = KuramotoNetwork::from_parts(vec![0.0; 6], vec![40.0; 6], None, &config).unwrap();
        let before = network.order_parameter().r;
        network.perturb(2, PI / 2.0).unwrap();
        assert!(network.order_parameter().r < before);
        assert!((network.phase_difference(2, 0).unwrap() - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_coupling_strength_is_clamped() {
        let mut network = KuramotoNetwork::new(2, &global_config(1)).unwrap();
        network.set_coupling_strength(-3.0);
        assert_eq!(network.coupling_strength(), 0.0);
        network.set_coupling_strength(1e9);
        assert_eq!(network.coupling_strength(), MAX_COUPLING_STRENGTH);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let config = global_config(77);
        let mut a = KuramotoNetwork::new(10, &config).unwrap();
        let mut b = KuramotoNetwork::new(10, &config).unwrap();
        for _ in 0..20 {
            a.step(config.dt());
            b.step(config.dt());
        }
        assert_eq!(a.phases(), b.phases());
    }

    #[test]
    fn test_order_parameter_of_empty_slice() {
        assert_eq!(order_parameter(&[]).r, 0.0);
    }
}
