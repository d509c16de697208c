//! Kuramoto phase-coupling engine for the ignition fabric.
//!
//! Each fabric node carries one phase oscillator in the gamma band. Coupling
//! pulls the oscillators toward a common phase; the Kuramoto order parameter
//! `r` measures how far that has progressed and is classified into
//! coherence levels.
//!
//! # Modules
//!
//! - [`config`]: engine settings (coupling, frequency band, integrator, noise)
//! - [`network`]: the oscillator network and order parameter
//! - [`thresholds`]: coherence levels and their boundaries
//! - [`error`]: error types and result alias
//!
//! # Example
//!
//! ```
//! use ignition_phase::{CoherenceLevel, CouplingMode, KuramotoNetwork, PhaseConfig};
//!
//! let mut config = PhaseConfig::default().with_seed(7);
//! config.coupling_mode = CouplingMode::Global;
//!
//! let network = KuramotoNetwork::new(8, &config).unwrap();
//! let op = network.order_parameter();
//! let level = config.thresholds.classify(op.r);
//! assert!(level <= CoherenceLevel::Deep);
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod thresholds;

pub use config::{CouplingMode, Integrator, PhaseConfig, MAX_COUPLING_STRENGTH};
pub use error::{PhaseError, PhaseResult};
pub use network::{order_parameter, wrap_phase, KuramotoNetwork, OrderParameter, SyncRun};
pub use thresholds::{CoherenceLevel, CoherenceThresholds};
