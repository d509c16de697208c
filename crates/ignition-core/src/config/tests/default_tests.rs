//! Default value tests for configuration.

use crate::config::Config;

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    config.validate().expect("default config must validate");
}

#[test]
fn test_fabric_defaults() {
    let config = Config::default();
    assert_eq!(config.fabric.node_count, 32);
    assert_eq!(config.fabric.target_density, 0.20);
    assert_eq!(config.fabric.density_tolerance, 0.02);
    assert_eq!(config.fabric.min_clustering, 0.75);
    assert_eq!(config.fabric.failure_threshold, 3);
    assert_eq!(config.fabric.recovery_timeout_ms, 30_000);
    assert_eq!(config.fabric.target_edges(), 99);
}

#[test]
fn test_gate_and_coordinator_defaults() {
    let config = Config::default();
    assert_eq!(config.salience.min_salience, 0.60);
    assert_eq!(config.salience.max_latency_ms, 5.0);
    assert_eq!(config.salience.min_healthy_nodes, 8);
    assert_eq!(config.salience.min_available_capacity, 0.40);
    assert_eq!(config.coordinator.sustain_ms, 200);
    assert_eq!(config.coordinator.absolute_refractory_ms, 200);
    assert_eq!(config.coordinator.history_capacity, 1_000);
    assert_eq!(config.coordinator.coherence_capacity, 500);
    assert_eq!(config.clock.max_offset_ns, 1_000.0);
    assert_eq!(config.clock.min_quality, 0.20);
}

#[test]
fn test_validation_defaults() {
    let config = Config::default();
    assert_eq!(config.validation.event.min_mean_coherence, 0.70);
    assert_eq!(config.validation.event.max_time_to_ignition_ms, 15.0);
    assert_eq!(config.validation.event.sustain_range_ms, (100.0, 300.0));
    assert_eq!(config.validation.topology.min_clustering, 0.75);
    assert_eq!(config.validation.topology.min_algebraic_connectivity, 0.3);
}
