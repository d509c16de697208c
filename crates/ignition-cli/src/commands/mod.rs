//! CLI command handlers
//!
//! # Modules
//!
//! - `topology`: Fabric generation and structural scoring
//! - `simulate`: Standalone phase engine runs
//! - `trigger`: One manual ignition on a simulated cluster
//! - `run`: Generated signal stream through the control loop

pub mod run;
pub mod simulate;
pub mod topology;
pub mod trigger;

use std::path::Path;

use ignition_core::{Config, CoreResult};
use serde::Serialize;
use tracing::error;

use crate::error::CliExitCode;

/// `--config <file>` when given, otherwise the layered defaults.
pub fn load_config(path: Option<&Path>) -> CoreResult<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> CliExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            CliExitCode::Success
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            CliExitCode::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fabric]\nnode_count = 24\nseed = 5").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.fabric.node_count, 24);
        assert_eq!(config.fabric.seed, Some(5));
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[salience]\nmin_salience = 4.0").unwrap();

        assert!(load_config(Some(file.path())).is_err());
    }
}
