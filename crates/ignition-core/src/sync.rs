//! Phase engine bound to fabric nodes.
//!
//! [`PhaseSyncEngine`] maps an ordered participant list onto a
//! [`KuramotoNetwork`]: oscillator `i` is `nodes[i]`, seeded with that node's
//! committed phase and natural frequency and coupled along the fabric's
//! induced adjacency. The fabric stays the owner of node state; the engine
//! only hands phases back through [`PhaseSyncEngine::phases`].
//!
//! Between ignitions nodes run uncoupled. A committed phase is therefore
//! advanced by its natural frequency and diffused for the time since the
//! commit before a new engine starts from it.

use chrono::{DateTime, Utc};
use ignition_phase::{
    CoherenceLevel, CoherenceThresholds, CouplingMode, KuramotoNetwork, OrderParameter,
    PhaseConfig,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::IgnitionPhase;
use crate::error::CoreResult;
use crate::fabric::{NodeId, TopologyFabric};

/// One coherence measurement taken during an ignition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoherenceSample {
    pub event_id: Uuid,
    pub phase: IgnitionPhase,
    /// Engine tick at which the sample was taken.
    pub tick: u64,
    /// Simulated oscillator time since the engine was built.
    pub oscillator_time_ms: f64,
    pub r: f64,
    pub psi: f64,
    pub level: CoherenceLevel,
    pub participants: usize,
    pub recorded_at: DateTime<Utc>,
}

pub struct PhaseSyncEngine {
    nodes: Vec<NodeId>,
    network: KuramotoNetwork,
    config: PhaseConfig,
    thresholds: CoherenceThresholds,
    dt: f64,
    ticks: u64,
    elapsed_secs: f64,
}

impl std::fmt::Debug for PhaseSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSyncEngine")
            .field("nodes", &self.nodes.len())
            .field("ticks", &self.ticks)
            .field("r", &self.network.order_parameter().r)
            .finish()
    }
}

impl PhaseSyncEngine {
    /// Build an engine over `participants` from their current fabric state.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` for unknown ids, `Phase` when the oscillator network
    /// rejects its inputs (e.g. an empty participant list).
    pub fn from_fabric(
        fabric: &TopologyFabric,
        participants: &[NodeId],
        config: &PhaseConfig,
    ) -> CoreResult<Self> {
        let mut network = Self::build_network(fabric, participants, None, config)?;
        let ages: Vec<f64> = fabric
            .phase_ages(participants)?
            .iter()
            .map(|age| age.as_secs_f64())
            .collect();
        network.free_run(&ages)?;
        Ok(Self {
            nodes: participants.to_vec(),
            network,
            config: config.clone(),
            thresholds: config.thresholds,
            dt: config.dt(),
            ticks: 0,
            elapsed_secs: 0.0,
        })
    }

    fn build_network(
        fabric: &TopologyFabric,
        participants: &[NodeId],
        current: Option<&[f64]>,
        config: &PhaseConfig,
    ) -> CoreResult<KuramotoNetwork> {
        let mut phases = Vec::with_capacity(participants.len());
        let mut frequencies = Vec::with_capacity(participants.len());
        for (i, &id) in participants.iter().enumerate() {
            let node = fabric.get_node(id)?;
            phases.push(current.map_or(node.phase, |p| p[i]));
            frequencies.push(node.natural_frequency_hz);
        }
        let adjacency = match config.coupling_mode {
            CouplingMode::Neighbors => Some(fabric.adjacency(participants)?),
            CouplingMode::Global => None,
        };
        Ok(KuramotoNetwork::from_parts(
            phases,
            frequencies,
            adjacency,
            config,
        )?)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Advance one tick of `tick_ms` oscillator time.
    pub fn tick(&mut self) -> OrderParameter {
        self.network.step(self.dt);
        self.ticks += 1;
        self.elapsed_secs += self.dt;
        self.network.order_parameter()
    }

    pub fn order_parameter(&self) -> OrderParameter {
        self.network.order_parameter()
    }

    pub fn level(&self) -> CoherenceLevel {
        self.thresholds.classify(self.network.order_parameter().r)
    }

    /// r has crossed the conscious threshold.
    pub fn is_ignited(&self) -> bool {
        self.thresholds.is_ignition(self.network.order_parameter().r)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn oscillator_time_ms(&self) -> f64 {
        self.elapsed_secs * 1000.0
    }

    pub fn thresholds(&self) -> &CoherenceThresholds {
        &self.thresholds
    }

    pub fn coupling_strength(&self) -> f64 {
        self.network.coupling_strength()
    }

    pub fn set_coupling_strength(&mut self, k: f64) {
        self.network.set_coupling_strength(k);
    }

    /// Weaken coupling by `coupling_factor` and switch the noise to the
    /// free-running diffusion so the group drifts apart.
    pub fn release(&mut self, coupling_factor: f64) {
        let k = self.network.coupling_strength() * coupling_factor;
        self.network.set_coupling_strength(k);
        self.network
            .set_noise_amplitude(self.config.free_run_noise_amplitude());
    }

    /// Current phase of every participant.
    pub fn phases(&self) -> Vec<(NodeId, f64)> {
        self.nodes
            .iter()
            .copied()
            .zip(self.network.phases().iter().copied())
            .collect()
    }

    /// Drop participants the fabric no longer considers usable and rebuild
    /// the coupling over the survivors. Returns the dropped ids.
    pub fn retain_usable(&mut self, fabric: &TopologyFabric) -> CoreResult<Vec<NodeId>> {
        let (kept, dropped): (Vec<usize>, Vec<usize>) =
            (0..self.nodes.len()).partition(|&i| fabric.is_usable(self.nodes[i]));
        if dropped.is_empty() {
            return Ok(Vec::new());
        }
        let dropped_ids: Vec<NodeId> = dropped.iter().map(|&i| self.nodes[i]).collect();
        if kept.is_empty() {
            self.nodes.clear();
            return Ok(dropped_ids);
        }

        let survivors: Vec<NodeId> = kept.iter().map(|&i| self.nodes[i]).collect();
        let phases: Vec<f64> = kept.iter().map(|&i| self.network.phases()[i]).collect();
        let coupling = self.network.coupling_strength();
        let noise = self.network.noise_amplitude();
        let mut network = Self::build_network(fabric, &survivors, Some(&phases), &self.config)?;
        network.set_coupling_strength(coupling);
        network.set_noise_amplitude(noise);

        self.network = network;
        self.nodes = survivors;
        Ok(dropped_ids)
    }

    /// Snapshot the current coherence for an event.
    pub fn sample(&self, event_id: Uuid, phase: IgnitionPhase) -> CoherenceSample {
        let op = self.network.order_parameter();
        CoherenceSample {
            event_id,
            phase,
            tick: self.ticks,
            oscillator_time_ms: self.oscillator_time_ms(),
            r: op.r,
            psi: op.psi,
            level: self.thresholds.classify(op.r),
            participants: self.nodes.len(),
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::FabricConfig;
    use crate::error::CoreError;

    fn fabric(n: usize, density: f64) -> TopologyFabric {
        TopologyFabric::initialize(&FabricConfig {
            node_count: n,
            target_density: density,
            seed: Some(5),
            ..FabricConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_mirrors_fabric_nodes() {
        let fabric = fabric(12, 1.0);
        let ids = fabric.node_ids();
        let engine = PhaseSyncEngine::from_fabric(&fabric, &ids, &PhaseConfig::default()).unwrap();
        assert_eq!(engine.len(), 12);
        for (id, phase) in engine.phases() {
            let node = fabric.get_node(id).unwrap();
            assert!((node.phase - phase).abs() < 1e-12);
        }
    }

    #[test]
    fn test_neighbor_coupled_engine_ignites() {
        let fabric = fabric(32, 0.20);
        let ids = fabric.eligible_nodes();
        let config = PhaseConfig::default().with_seed(3);
        let mut engine = PhaseSyncEngine::from_fabric(&fabric, &ids, &config).unwrap();
        let mut ticks = 0;
        while !engine.is_ignited() && ticks < 400 {
            engine.tick();
            ticks += 1;
        }
        assert!(engine.is_ignited(), "r = {}", engine.order_parameter().r);
        assert!((engine.oscillator_time_ms() - ticks as f64 * 10.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_committed_phases_drift_apart_between_ignitions() {
        let fabric = fabric(12, 1.0);
        let ids = fabric.node_ids();
        let aligned: Vec<(NodeId, f64)> = ids.iter().map(|&id| (id, 0.5)).collect();
        fabric.record_phases(&aligned).unwrap();
        let config = PhaseConfig::default().with_seed(8);

        let fresh = PhaseSyncEngine::from_fabric(&fabric, &ids, &config).unwrap();
        assert!(fresh.order_parameter().r > 0.999);

        tokio::time::advance(Duration::from_millis(800)).await;
        let later = PhaseSyncEngine::from_fabric(&fabric, &ids, &config).unwrap();
        let r = later.order_parameter().r;
        println!("=== TEST: committed phases after 800 ms uncoupled ===");
        println!("EVIDENCE: r = {:.4}", r);
        assert!(!later.is_ignited(), "r = {:.4}", r);
        assert_eq!(later.ticks(), 0);
    }

    #[test]
    fn test_release_weakens_coupling_and_adds_diffusion() {
        let fabric = fabric(12, 1.0);
        let ids = fabric.node_ids();
        let config = PhaseConfig::default().with_seed(8);
        let mut engine = PhaseSyncEngine::from_fabric(&fabric, &ids, &config).unwrap();
        let k = engine.coupling_strength();

        engine.release(0.1);

        assert!((engine.coupling_strength() - k * 0.1).abs() < 1e-12);
        assert!((engine.network.noise_amplitude() - config.free_run_noise_amplitude()).abs() < 1e-12);
    }

    #[test]
    fn test_retain_drops_unusable_nodes() {
        let fabric = fabric(12, 1.0);
        let ids = fabric.node_ids();
        let mut engine = PhaseSyncEngine::from_fabric(&fabric, &ids, &PhaseConfig::default()).unwrap();
        engine.tick();
        let before: Vec<(NodeId, f64)> = engine.phases();

        for _ in 0..3 {
            fabric.report_outcome(NodeId(4), false).unwrap();
        }
        let dropped = engine.retain_usable(&fabric).unwrap();
        assert_eq!(dropped, vec![NodeId(4)]);
        assert_eq!(engine.len(), 11);
        // Survivors keep their in-flight phases.
        let after = engine.phases();
        assert_eq!(after[4].0, NodeId(5));
        assert!((after[4].1 - before[5].1).abs() < 1e-12);
        assert_eq!(engine.ticks(), 1);
    }

    #[test]
    fn test_empty_participants_rejected() {
        let fabric = fabric(12, 1.0);
        let err = PhaseSyncEngine::from_fabric(&fabric, &[], &PhaseConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::Phase(_)));
    }
}
