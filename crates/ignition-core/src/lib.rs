//! Ignition Fabric Core Library
//!
//! Coordinates a cluster of processing nodes so that, on demand, they
//! briefly phase-lock, broadcast one piece of content and relax back to
//! independent operation.
//!
//! # Architecture
//!
//! Leaf first:
//! - [`fabric`]: node/link topology, health, circuit breakers, structural metrics
//! - [`clock`]: PTP-style clock hierarchy and ignition readiness
//! - [`sync`]: the Kuramoto engine bound to fabric node ids
//! - [`salience`]: trigger scoring and admission
//! - [`coordinator`]: the ignition state machine, limiter, refractory timer,
//!   shared context and control loop
//! - [`validation`]: post-hoc event and topology compliance
//! - [`cluster`]: lifecycle owner wiring all of the above together
//!
//! # Example
//!
//! ```
//! use ignition_core::salience::{SalienceGate, SalienceLevel};
//! use ignition_core::{Config, SalienceInput};
//!
//! let gate = SalienceGate::new(Config::default().salience);
//! let score = gate.evaluate(&SalienceInput::new(0.6, 0.6, 0.6)).unwrap();
//! assert_eq!(score.level, SalienceLevel::Medium);
//! ```

pub mod clock;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fabric;
pub mod salience;
pub mod sync;
pub mod validation;

// Re-exports for convenience
pub use cluster::{ClusterCollaborators, ClusterMetrics, ClusterStatus, IgnitionCluster};
pub use config::Config;
pub use coordinator::{
    FailureReason, IgnitionCoordinator, IgnitionEvent, IgnitionPhase, TriggerOutcome,
};
pub use error::{CoreError, CoreResult};
pub use fabric::{NodeId, TopologyFabric};
pub use ignition_phase::PhaseConfig;
pub use salience::{RejectionReason, SalienceInput, SalienceScore};
