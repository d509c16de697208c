//! Serialization and file-loading tests for configuration.

use std::io::Write;

use ignition_phase::{CouplingMode, Integrator};

use crate::config::Config;
use crate::error::CoreError;

#[test]
fn test_config_serialization_round_trip() {
    let config = Config::default();

    let toml_str = toml::to_string(&config).expect("Config must serialize to TOML");
    let deserialized: Config =
        toml::from_str(&toml_str).expect("Config must deserialize from TOML");

    assert_eq!(deserialized, config);
}

#[test]
fn test_config_serialization_json_round_trip() {
    let config = Config::default();

    let json_str = serde_json::to_string(&config).expect("Config must serialize to JSON");
    let deserialized: Config =
        serde_json::from_str(&json_str).expect("Config must deserialize from JSON");

    assert_eq!(deserialized, config);
}

#[test]
fn test_partial_toml_fills_defaults() {
    let toml_str = r#"
        [fabric]
        node_count = 64
        seed = 7

        [phase]
        coupling_mode = "global"
        integrator = "euler"
    "#;

    let config: Config = toml::from_str(toml_str).expect("partial TOML must parse");

    assert_eq!(config.fabric.node_count, 64);
    assert_eq!(config.fabric.seed, Some(7));
    assert_eq!(config.fabric.target_density, 0.20);
    assert_eq!(config.phase.coupling_mode, CouplingMode::Global);
    assert_eq!(config.phase.integrator, Integrator::Euler);
    assert_eq!(config.coordinator.min_nodes, 8);
}

#[test]
fn test_from_file_reads_and_validates() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "[coordinator]\nsustain_ms = 150\n\n[salience]\nmin_salience = 0.5"
    )
    .expect("write config");

    let config = Config::from_file(file.path()).expect("config file must load");
    assert_eq!(config.coordinator.sustain_ms, 150);
    assert_eq!(config.salience.min_salience, 0.5);
}

#[test]
fn test_from_file_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[fabric]\ntarget_density = 1.5").expect("write config");

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigError(_)));
    assert!(err.to_string().contains("target_density"));
}

#[test]
fn test_from_file_missing_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
