//! Validation tests for configuration.

use crate::config::{Config, SalienceWeights};

#[test]
fn test_weights_must_sum_to_one() {
    let mut config = Config::default();
    config.salience.weights = SalienceWeights {
        novelty: 0.5,
        relevance: 0.5,
        urgency: 0.5,
        confidence: 0.0,
    };
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("sum to 1.0"));
}

#[test]
fn test_fabric_bounds_checked() {
    let mut config = Config::default();
    config.fabric.node_count = 1;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.fabric.target_density = 0.0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.fabric.min_degree = 32;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.fabric.max_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_cross_section_constraints() {
    let mut config = Config::default();
    config.fabric.node_count = 6;
    config.fabric.min_degree = 2;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("min_nodes"));
}

#[test]
fn test_phase_section_is_validated() {
    let mut config = Config::default();
    config.phase.tick_ms = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("phase"));
}

#[test]
fn test_servo_gains_bounded() {
    let mut config = Config::default();
    config.clock.servo_kp = 0.9;
    config.clock.servo_ki = 0.5;
    assert!(config.validate().is_err());
}
