//! Sub-configuration structures for the ignition fabric components.
//!
//! This module contains the individual configuration structs that make up
//! the main `Config` structure. Each one validates itself; `Config::validate`
//! only adds cross-section checks.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::{EventCriteria, TopologyCriteria};

fn check_unit(field: &str, value: f64) -> CoreResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(CoreError::ConfigError(format!(
            "{} must be in [0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

fn check_positive(field: &str, value: f64) -> CoreResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoreError::ConfigError(format!(
            "{} must be > 0, got {}",
            field, value
        )));
    }
    Ok(())
}

// ============================================================================
// FABRIC
// ============================================================================

/// Topology, health and circuit-breaker settings for the node fabric.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FabricConfig {
    /// Number of nodes in the fabric.
    #[serde(default = "default_node_count")]
    pub node_count: usize,

    /// Target edge density |E| / (N(N-1)/2).
    #[serde(default = "default_target_density")]
    pub target_density: f64,

    /// Accepted absolute deviation from `target_density`.
    #[serde(default = "default_density_tolerance")]
    pub density_tolerance: f64,

    /// Minimum average clustering coefficient.
    #[serde(default = "default_min_clustering")]
    pub min_clustering: f64,

    /// Minimum node degree.
    #[serde(default = "default_min_degree")]
    pub min_degree: usize,

    /// Probability that a bridge endpoint is picked uniformly instead of by
    /// preferential attachment.
    #[serde(default = "default_rewiring_probability")]
    pub rewiring_probability: f64,

    /// Construction attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Edge mutations allowed per attempt.
    #[serde(default = "default_max_rewiring_iterations")]
    pub max_rewiring_iterations: usize,

    /// Seed for topology, initial phases and link properties.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Center of the band node natural frequencies are drawn from (Hz).
    #[serde(default = "default_natural_frequency_hz")]
    pub natural_frequency_hz: f64,

    /// Half-width of that band (Hz).
    #[serde(default = "default_frequency_spread_hz")]
    pub frequency_spread_hz: f64,

    /// Link bandwidth assigned at construction (Mbps).
    #[serde(default = "default_bandwidth_mbps")]
    pub bandwidth_mbps: f64,

    /// Minimum initial link latency (ms).
    #[serde(default = "default_base_latency_ms")]
    pub base_latency_ms: f64,

    /// Random latency added on top of `base_latency_ms` (ms).
    #[serde(default = "default_latency_jitter_ms")]
    pub latency_jitter_ms: f64,

    /// Consecutive failures that open a node's breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an open breaker waits before admitting a probe (ms).
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,

    /// Consecutive failures after which a node is isolated.
    #[serde(default = "default_isolation_threshold")]
    pub isolation_threshold: u32,

    /// Health probe cadence (ms).
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Per-probe timeout (ms).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_node_count() -> usize {
    32
}

fn default_target_density() -> f64 {
    0.20
}

fn default_density_tolerance() -> f64 {
    0.02
}

fn default_min_clustering() -> f64 {
    0.75
}

fn default_min_degree() -> usize {
    3
}

fn default_rewiring_probability() -> f64 {
    0.10
}

fn default_max_attempts() -> u32 {
    16
}

fn default_max_rewiring_iterations() -> usize {
    10_000
}

fn default_natural_frequency_hz() -> f64 {
    40.0
}

fn default_frequency_spread_hz() -> f64 {
    0.25
}

fn default_bandwidth_mbps() -> f64 {
    10_000.0
}

fn default_base_latency_ms() -> f64 {
    0.5
}

fn default_latency_jitter_ms() -> f64 {
    0.5
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_timeout_ms() -> u64 {
    30_000
}

fn default_isolation_threshold() -> u32 {
    5
}

fn default_health_check_interval_ms() -> u64 {
    1_000
}

fn default_probe_timeout_ms() -> u64 {
    250
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            target_density: default_target_density(),
            density_tolerance: default_density_tolerance(),
            min_clustering: default_min_clustering(),
            min_degree: default_min_degree(),
            rewiring_probability: default_rewiring_probability(),
            max_attempts: default_max_attempts(),
            max_rewiring_iterations: default_max_rewiring_iterations(),
            seed: None,
            natural_frequency_hz: default_natural_frequency_hz(),
            frequency_spread_hz: default_frequency_spread_hz(),
            bandwidth_mbps: default_bandwidth_mbps(),
            base_latency_ms: default_base_latency_ms(),
            latency_jitter_ms: default_latency_jitter_ms(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
            isolation_threshold: default_isolation_threshold(),
            health_check_interval_ms: default_health_check_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl FabricConfig {
    /// Bounds-check every parameter. Topology construction runs this before
    /// its first attempt.
    pub fn validate(&self) -> CoreResult<()> {
        if self.node_count < 2 {
            return Err(CoreError::ConfigError(format!(
                "fabric.node_count must be >= 2, got {}",
                self.node_count
            )));
        }
        if !self.target_density.is_finite()
            || self.target_density <= 0.0
            || self.target_density > 1.0
        {
            return Err(CoreError::ConfigError(format!(
                "fabric.target_density must be in (0, 1], got {}",
                self.target_density
            )));
        }
        check_unit("fabric.density_tolerance", self.density_tolerance)?;
        check_unit("fabric.min_clustering", self.min_clustering)?;
        check_unit("fabric.rewiring_probability", self.rewiring_probability)?;
        if self.min_degree >= self.node_count {
            return Err(CoreError::ConfigError(format!(
                "fabric.min_degree ({}) must be below node_count ({})",
                self.min_degree, self.node_count
            )));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::ConfigError(
                "fabric.max_attempts must be greater than 0".into(),
            ));
        }
        if self.max_rewiring_iterations == 0 {
            return Err(CoreError::ConfigError(
                "fabric.max_rewiring_iterations must be greater than 0".into(),
            ));
        }
        check_positive("fabric.natural_frequency_hz", self.natural_frequency_hz)?;
        if !self.frequency_spread_hz.is_finite()
            || self.frequency_spread_hz < 0.0
            || self.frequency_spread_hz >= self.natural_frequency_hz
        {
            return Err(CoreError::ConfigError(format!(
                "fabric.frequency_spread_hz must be in [0, natural_frequency_hz), got {}",
                self.frequency_spread_hz
            )));
        }
        check_positive("fabric.bandwidth_mbps", self.bandwidth_mbps)?;
        if !self.base_latency_ms.is_finite() || self.base_latency_ms < 0.0 {
            return Err(CoreError::ConfigError(
                "fabric.base_latency_ms must be >= 0".into(),
            ));
        }
        if !self.latency_jitter_ms.is_finite() || self.latency_jitter_ms < 0.0 {
            return Err(CoreError::ConfigError(
                "fabric.latency_jitter_ms must be >= 0".into(),
            ));
        }
        if self.failure_threshold == 0 || self.isolation_threshold == 0 {
            return Err(CoreError::ConfigError(
                "fabric.failure_threshold and fabric.isolation_threshold must be > 0".into(),
            ));
        }
        if self.health_check_interval_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(CoreError::ConfigError(
                "fabric.health_check_interval_ms and fabric.probe_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Number of undirected edges the target density asks for.
    pub fn target_edges(&self) -> usize {
        let pairs = self.node_count * (self.node_count.saturating_sub(1)) / 2;
        (self.target_density * pairs as f64).round() as usize
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// PTP-style clock hierarchy settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClockConfig {
    /// Background synchronization cadence (ms).
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Largest |offset| still acceptable for ignition (ns).
    #[serde(default = "default_max_offset_ns")]
    pub max_offset_ns: f64,

    /// Quality floor for ignition readiness.
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,

    /// Jitter at which quality drops to 0.5 (ns).
    #[serde(default = "default_jitter_scale_ns")]
    pub jitter_scale_ns: f64,

    /// Path delay above which quality is scaled down (ns).
    #[serde(default = "default_max_path_delay_ns")]
    pub max_path_delay_ns: f64,

    /// EWMA weight of the newest jitter observation.
    #[serde(default = "default_jitter_smoothing")]
    pub jitter_smoothing: f64,

    /// Proportional gain of the clock servo.
    #[serde(default = "default_servo_kp")]
    pub servo_kp: f64,

    /// Integral gain of the clock servo.
    #[serde(default = "default_servo_ki")]
    pub servo_ki: f64,

    /// Number of master clocks below the grand master.
    #[serde(default = "default_master_count")]
    pub master_count: usize,

    /// Timeout for one exchange (ms).
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,
}

fn default_sync_interval_ms() -> u64 {
    100
}

fn default_max_offset_ns() -> f64 {
    1_000.0
}

fn default_min_quality() -> f64 {
    0.20
}

fn default_jitter_scale_ns() -> f64 {
    100.0
}

fn default_max_path_delay_ns() -> f64 {
    50_000.0
}

fn default_jitter_smoothing() -> f64 {
    0.25
}

fn default_servo_kp() -> f64 {
    0.7
}

fn default_servo_ki() -> f64 {
    0.3
}

fn default_master_count() -> usize {
    2
}

fn default_exchange_timeout_ms() -> u64 {
    50
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
            max_offset_ns: default_max_offset_ns(),
            min_quality: default_min_quality(),
            jitter_scale_ns: default_jitter_scale_ns(),
            max_path_delay_ns: default_max_path_delay_ns(),
            jitter_smoothing: default_jitter_smoothing(),
            servo_kp: default_servo_kp(),
            servo_ki: default_servo_ki(),
            master_count: default_master_count(),
            exchange_timeout_ms: default_exchange_timeout_ms(),
        }
    }
}

impl ClockConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.sync_interval_ms == 0 || self.exchange_timeout_ms == 0 {
            return Err(CoreError::ConfigError(
                "clock.sync_interval_ms and clock.exchange_timeout_ms must be > 0".into(),
            ));
        }
        check_positive("clock.max_offset_ns", self.max_offset_ns)?;
        check_unit("clock.min_quality", self.min_quality)?;
        check_positive("clock.jitter_scale_ns", self.jitter_scale_ns)?;
        check_positive("clock.max_path_delay_ns", self.max_path_delay_ns)?;
        check_positive("clock.jitter_smoothing", self.jitter_smoothing)?;
        check_unit("clock.jitter_smoothing", self.jitter_smoothing)?;
        // kp in (0, 1] keeps the servo loop stable; the sum cap bounds overshoot.
        check_positive("clock.servo_kp", self.servo_kp)?;
        check_unit("clock.servo_kp", self.servo_kp)?;
        check_unit("clock.servo_ki", self.servo_ki)?;
        if self.servo_kp + self.servo_ki > 1.0 + 1e-9 {
            return Err(CoreError::ConfigError(format!(
                "clock.servo_kp + clock.servo_ki must be <= 1, got {}",
                self.servo_kp + self.servo_ki
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SALIENCE
// ============================================================================

/// Weights of the four salience components.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SalienceWeights {
    #[serde(default = "default_weight")]
    pub novelty: f64,
    #[serde(default = "default_weight")]
    pub relevance: f64,
    #[serde(default = "default_weight")]
    pub urgency: f64,
    #[serde(default = "default_weight")]
    pub confidence: f64,
}

fn default_weight() -> f64 {
    0.25
}

impl Default for SalienceWeights {
    fn default() -> Self {
        Self {
            novelty: default_weight(),
            relevance: default_weight(),
            urgency: default_weight(),
            confidence: default_weight(),
        }
    }
}

impl SalienceWeights {
    /// Weights must be non-negative and sum to 1.0.
    pub fn validate(&self) -> CoreResult<()> {
        let weights = [self.novelty, self.relevance, self.urgency, self.confidence];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoreError::ConfigError(
                "salience.weights must be finite and >= 0".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(CoreError::ConfigError(format!(
                "salience.weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Salience gate settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SalienceConfig {
    #[serde(default)]
    pub weights: SalienceWeights,

    /// Base admission threshold at neutral arousal.
    #[serde(default = "default_min_salience")]
    pub min_salience: f64,

    /// How strongly arousal moves the threshold away from `min_salience`.
    #[serde(default = "default_arousal_sensitivity")]
    pub arousal_sensitivity: f64,

    /// Mean fabric link latency ceiling (ms).
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,

    /// Healthy nodes required for admission.
    #[serde(default = "default_min_healthy_nodes")]
    pub min_healthy_nodes: usize,

    /// Available fabric capacity floor in [0, 1].
    #[serde(default = "default_min_available_capacity")]
    pub min_available_capacity: f64,
}

fn default_min_salience() -> f64 {
    0.60
}

fn default_arousal_sensitivity() -> f64 {
    0.5
}

fn default_max_latency_ms() -> f64 {
    5.0
}

fn default_min_healthy_nodes() -> usize {
    8
}

fn default_min_available_capacity() -> f64 {
    0.40
}

impl Default for SalienceConfig {
    fn default() -> Self {
        Self {
            weights: SalienceWeights::default(),
            min_salience: default_min_salience(),
            arousal_sensitivity: default_arousal_sensitivity(),
            max_latency_ms: default_max_latency_ms(),
            min_healthy_nodes: default_min_healthy_nodes(),
            min_available_capacity: default_min_available_capacity(),
        }
    }
}

impl SalienceConfig {
    pub fn validate(&self) -> CoreResult<()> {
        self.weights.validate()?;
        check_unit("salience.min_salience", self.min_salience)?;
        if !self.arousal_sensitivity.is_finite() || !(0.0..=2.0).contains(&self.arousal_sensitivity)
        {
            return Err(CoreError::ConfigError(format!(
                "salience.arousal_sensitivity must be in [0, 2], got {}",
                self.arousal_sensitivity
            )));
        }
        check_positive("salience.max_latency_ms", self.max_latency_ms)?;
        check_unit(
            "salience.min_available_capacity",
            self.min_available_capacity,
        )?;
        Ok(())
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Ignition coordinator settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Eligible nodes required to start and to keep synchronizing.
    #[serde(default = "default_min_nodes")]
    pub min_nodes: usize,

    /// Token-bucket capacity and refill rate (events per second).
    #[serde(default = "default_max_events_per_second")]
    pub max_events_per_second: u32,

    /// Synchronization budget in oscillator time (ms).
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,

    /// Ticks between clock-readiness and participant re-checks.
    #[serde(default = "default_health_check_ticks")]
    pub health_check_ticks: u64,

    /// How long a broadcast is held (ms).
    #[serde(default = "default_sustain_ms")]
    pub sustain_ms: u64,

    /// How long coherence is left to decay after sustain (ms).
    #[serde(default = "default_dissolve_ms")]
    pub dissolve_ms: u64,

    /// Fraction of the coupling strength kept while dissolving.
    #[serde(default = "default_dissolve_coupling_factor")]
    pub dissolve_coupling_factor: f64,

    /// Absolute refractory period after an event ends (ms).
    #[serde(default = "default_absolute_refractory_ms")]
    pub absolute_refractory_ms: u64,

    /// Relative refractory window following the absolute period (ms).
    #[serde(default = "default_relative_refractory_ms")]
    pub relative_refractory_ms: u64,

    /// Threshold boost at the start of the relative window.
    #[serde(default = "default_refractory_boost")]
    pub refractory_boost: f64,

    /// Arousal level before any source reports one.
    #[serde(default = "default_initial_arousal")]
    pub initial_arousal: f64,

    /// Finalized events retained for audit.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Coherence samples retained.
    #[serde(default = "default_coherence_capacity")]
    pub coherence_capacity: usize,

    /// Buffer of the event broadcast channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_min_nodes() -> usize {
    8
}

fn default_max_events_per_second() -> u32 {
    10
}

fn default_sync_timeout_ms() -> u64 {
    2_000
}

fn default_health_check_ticks() -> u64 {
    10
}

fn default_sustain_ms() -> u64 {
    200
}

fn default_dissolve_ms() -> u64 {
    100
}

fn default_dissolve_coupling_factor() -> f64 {
    0.1
}

fn default_absolute_refractory_ms() -> u64 {
    200
}

fn default_relative_refractory_ms() -> u64 {
    500
}

fn default_refractory_boost() -> f64 {
    0.15
}

fn default_initial_arousal() -> f64 {
    0.5
}

fn default_history_capacity() -> usize {
    1_000
}

fn default_coherence_capacity() -> usize {
    500
}

fn default_event_channel_capacity() -> usize {
    64
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_nodes: default_min_nodes(),
            max_events_per_second: default_max_events_per_second(),
            sync_timeout_ms: default_sync_timeout_ms(),
            health_check_ticks: default_health_check_ticks(),
            sustain_ms: default_sustain_ms(),
            dissolve_ms: default_dissolve_ms(),
            dissolve_coupling_factor: default_dissolve_coupling_factor(),
            absolute_refractory_ms: default_absolute_refractory_ms(),
            relative_refractory_ms: default_relative_refractory_ms(),
            refractory_boost: default_refractory_boost(),
            initial_arousal: default_initial_arousal(),
            history_capacity: default_history_capacity(),
            coherence_capacity: default_coherence_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.min_nodes < 2 {
            return Err(CoreError::ConfigError(format!(
                "coordinator.min_nodes must be >= 2, got {}",
                self.min_nodes
            )));
        }
        if self.max_events_per_second == 0 {
            return Err(CoreError::ConfigError(
                "coordinator.max_events_per_second must be greater than 0".into(),
            ));
        }
        if self.sync_timeout_ms == 0 || self.health_check_ticks == 0 {
            return Err(CoreError::ConfigError(
                "coordinator.sync_timeout_ms and coordinator.health_check_ticks must be > 0"
                    .into(),
            ));
        }
        check_unit(
            "coordinator.dissolve_coupling_factor",
            self.dissolve_coupling_factor,
        )?;
        check_unit("coordinator.refractory_boost", self.refractory_boost)?;
        check_unit("coordinator.initial_arousal", self.initial_arousal)?;
        if self.history_capacity == 0
            || self.coherence_capacity == 0
            || self.event_channel_capacity == 0
        {
            return Err(CoreError::ConfigError(
                "coordinator buffer capacities must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// VALIDATION, RUNTIME, LOGGING
// ============================================================================

/// Compliance criteria used by the post-hoc validators.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub event: EventCriteria,
    #[serde(default)]
    pub topology: TopologyCriteria,
}

impl ValidationConfig {
    pub fn validate(&self) -> CoreResult<()> {
        self.event.validate()?;
        self.topology.validate()
    }
}

/// Control loop and background task settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Control loop sampling interval (ms). 10 ms is 100 Hz.
    #[serde(default = "default_control_interval_ms")]
    pub control_interval_ms: u64,

    /// Bounded submission queue in front of the coordinator.
    #[serde(default = "default_submission_queue")]
    pub submission_queue: usize,

    /// Join timeout for background tasks on shutdown (ms).
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_control_interval_ms() -> u64 {
    10
}

fn default_submission_queue() -> usize {
    64
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_interval_ms: default_control_interval_ms(),
            submission_queue: default_submission_queue(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.control_interval_ms == 0
            || self.submission_queue == 0
            || self.shutdown_timeout_ms == 0
        {
            return Err(CoreError::ConfigError(
                "runtime intervals and capacities must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when no verbosity flag is given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "compact".
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub include_location: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> CoreResult<()> {
        match self.format.as_str() {
            "pretty" | "compact" => Ok(()),
            other => Err(CoreError::ConfigError(format!(
                "logging.format must be \"pretty\" or \"compact\", got {:?}",
                other
            ))),
        }
    }
}
