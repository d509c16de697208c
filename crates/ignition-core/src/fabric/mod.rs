//! Fabric topology manager.
//!
//! The [`TopologyFabric`] is the single owner of node state, link state,
//! per-node health and circuit breakers. Every other component reads through
//! its accessor API; mutation happens only through the methods below, each
//! serialized behind one `parking_lot::RwLock`.
//!
//! # Usability
//!
//! A node is usable by the phase engine and coordinator only while its
//! breaker is Closed or HalfOpen, its health is not isolated and its state is
//! not `Offline`.

mod breaker;
mod health;
pub mod metrics;
mod topology;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::TAU;
use std::time::Duration;

use chrono::Utc;
use ignition_phase::wrap_phase;
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FabricConfig;
use crate::error::{CoreError, CoreResult};

pub use breaker::{BreakerState, CircuitBreaker};
pub use health::{HealthMonitor, HealthSweep, NodeProbe, ProbeReport, SimulatedProbe};
pub use types::{
    Connection, FabricMetrics, FabricNode, NodeHealth, NodeId, NodeState, ResourceSnapshot,
    StructuralMetrics,
};

struct FabricInner {
    nodes: Vec<FabricNode>,
    health: Vec<NodeHealth>,
    breakers: Vec<CircuitBreaker>,
    /// All links, active or not.
    links: Vec<BTreeSet<usize>>,
    connections: BTreeMap<(usize, usize), Connection>,
    modules: Vec<Vec<usize>>,
    /// Invalidated whenever a link changes activity.
    structure: Option<StructuralMetrics>,
    /// When each node's phase was last written.
    phase_committed_at: Vec<Instant>,
}

impl FabricInner {
    fn check(&self, id: NodeId) -> CoreResult<usize> {
        let index = id.index();
        if index < self.nodes.len() {
            Ok(index)
        } else {
            Err(CoreError::NodeNotFound { id })
        }
    }

    fn active_adjacency(&self) -> Vec<Vec<usize>> {
        self.links
            .iter()
            .enumerate()
            .map(|(a, neighbors)| {
                neighbors
                    .iter()
                    .copied()
                    .filter(|&b| self.connections.get(&key(a, b)).map_or(false, |c| c.active))
                    .collect()
            })
            .collect()
    }

    fn usable(&self, index: usize, isolation_threshold: u32) -> bool {
        self.breakers[index].state().is_usable()
            && self.health[index].is_healthy(isolation_threshold)
            && self.nodes[index].state != NodeState::Offline
    }

    /// Derive the node state from health and breaker.
    fn sync_state(&mut self, index: usize, isolation_threshold: u32) {
        let breaker_ok = self.breakers[index].state().is_usable();
        let health = &self.health[index];
        let node = &mut self.nodes[index];
        let next = if !breaker_ok || !health.is_healthy(isolation_threshold) {
            NodeState::Offline
        } else if node.state == NodeState::IgnitionMode {
            NodeState::IgnitionMode
        } else if health.degraded {
            NodeState::Degraded
        } else {
            NodeState::Active
        };
        if next != node.state {
            debug!(node = %node.id, from = ?node.state, to = ?next, "Node state changed");
            node.state = next;
        }
    }
}

fn key(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Owner of the node/edge graph, health and circuit breakers.
pub struct TopologyFabric {
    config: FabricConfig,
    inner: RwLock<FabricInner>,
}

impl std::fmt::Debug for TopologyFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyFabric")
            .field("node_count", &self.config.node_count)
            .field("target_density", &self.config.target_density)
            .finish()
    }
}

impl TopologyFabric {
    /// Build a fabric satisfying the configured structural goals.
    ///
    /// # Errors
    ///
    /// `CoreError::TopologyConstruction` when parameters are out of bounds
    /// or no attempt met every goal.
    pub fn initialize(config: &FabricConfig) -> CoreResult<Self> {
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let plan = topology::build_topology(config, &mut rng)?;
        let n = config.node_count;

        let nodes: Vec<FabricNode> = (0..n)
            .map(|i| {
                let spread = config.frequency_spread_hz;
                let natural_frequency_hz = if spread > 0.0 {
                    rng.gen_range(
                        (config.natural_frequency_hz - spread)..=(config.natural_frequency_hz + spread),
                    )
                } else {
                    config.natural_frequency_hz
                };
                FabricNode {
                    id: NodeId::from_index(i),
                    state: NodeState::Initializing,
                    phase: rng.gen_range(0.0..TAU),
                    natural_frequency_hz,
                    resources: ResourceSnapshot {
                        attention_level: 1.0,
                        cpu_utilization: rng.gen_range(0.05..0.35),
                        memory_utilization: rng.gen_range(0.10..0.40),
                    },
                }
            })
            .collect();

        let mut connections = BTreeMap::new();
        let mut links = vec![BTreeSet::new(); n];
        for (a, neighbors) in plan.adjacency.iter().enumerate() {
            for &b in neighbors {
                links[a].insert(b);
                if a < b {
                    let latency = config.base_latency_ms + rng.gen::<f64>() * config.latency_jitter_ms;
                    connections.insert(
                        (a, b),
                        Connection::new(
                            NodeId::from_index(a),
                            NodeId::from_index(b),
                            config.bandwidth_mbps,
                            latency,
                        ),
                    );
                }
            }
        }

        let recovery = Duration::from_millis(config.recovery_timeout_ms);
        let mut inner = FabricInner {
            nodes,
            health: vec![NodeHealth::default(); n],
            breakers: (0..n)
                .map(|_| CircuitBreaker::new(config.failure_threshold, recovery))
                .collect(),
            links,
            connections,
            modules: plan.modules,
            structure: None,
            phase_committed_at: vec![Instant::now(); n],
        };
        for node in inner.nodes.iter_mut() {
            node.state = NodeState::Active;
        }

        let structure = metrics::structural_metrics(&inner.active_adjacency());
        inner.structure = Some(structure);

        info!(
            nodes = n,
            edges = structure.edge_count,
            density = structure.density,
            clustering = structure.clustering_coefficient,
            algebraic_connectivity = structure.algebraic_connectivity,
            attempts = plan.attempts,
            "Fabric initialized"
        );

        Ok(Self {
            config: config.clone(),
            inner: RwLock::new(inner),
        })
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.config.node_count
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        (0..self.config.node_count).map(NodeId::from_index).collect()
    }

    /// Modules chosen at construction; the first id of each is its gateway.
    pub fn modules(&self) -> Vec<Vec<NodeId>> {
        self.inner
            .read()
            .modules
            .iter()
            .map(|m| m.iter().copied().map(NodeId::from_index).collect())
            .collect()
    }

    /// Structural and operational metrics of the live fabric.
    pub fn metrics(&self) -> FabricMetrics {
        let now = Instant::now();
        let threshold = self.config.isolation_threshold;
        let mut inner = self.inner.write();

        for i in 0..inner.nodes.len() {
            inner.breakers[i].refresh(now);
            inner.sync_state(i, threshold);
        }

        let structure = match inner.structure {
            Some(s) => s,
            None => {
                let s = metrics::structural_metrics(&inner.active_adjacency());
                inner.structure = Some(s);
                s
            }
        };

        let active: Vec<&Connection> = inner.connections.values().filter(|c| c.active).collect();
        let mean_latency_ms = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|c| c.latency_ms).sum::<f64>() / active.len() as f64
        };

        let n = inner.nodes.len();
        let healthy_nodes = inner
            .health
            .iter()
            .filter(|h| h.is_healthy(threshold))
            .count();
        let usable: Vec<usize> = (0..n).filter(|&i| inner.usable(i, threshold)).collect();
        let headroom: f64 = usable.iter().map(|&i| inner.nodes[i].resources.headroom()).sum();
        let open_breakers = inner
            .breakers
            .iter()
            .filter(|b| b.state() == BreakerState::Open)
            .count();

        FabricMetrics {
            structure,
            mean_latency_ms,
            healthy_nodes,
            usable_nodes: usable.len(),
            available_capacity: if n == 0 { 0.0 } else { headroom / n as f64 },
            open_breakers,
        }
    }

    /// Snapshot of one node.
    pub fn get_node(&self, id: NodeId) -> CoreResult<FabricNode> {
        let inner = self.inner.read();
        let index = inner.check(id)?;
        Ok(inner.nodes[index].clone())
    }

    pub fn health(&self, id: NodeId) -> CoreResult<NodeHealth> {
        let inner = self.inner.read();
        let index = inner.check(id)?;
        Ok(inner.health[index].clone())
    }

    /// Breaker state after applying any due Open → HalfOpen transition.
    pub fn breaker_state(&self, id: NodeId) -> CoreResult<BreakerState> {
        let mut inner = self.inner.write();
        let index = inner.check(id)?;
        let state = inner.breakers[index].refresh(Instant::now());
        inner.sync_state(index, self.config.isolation_threshold);
        Ok(state)
    }

    /// Record the outcome of a communication with a node.
    ///
    /// Updates health, the breaker and the derived node state. Returns the
    /// breaker state afterwards.
    pub fn report_outcome(&self, id: NodeId, success: bool) -> CoreResult<BreakerState> {
        let now = Instant::now();
        let threshold = self.config.isolation_threshold;
        let mut inner = self.inner.write();
        let index = inner.check(id)?;

        let before = inner.breakers[index].state();
        {
            let health = &mut inner.health[index];
            if success {
                health.last_seen = Some(Utc::now());
                health.consecutive_failures = 0;
                health.degraded = false;
                health.isolated = false;
            } else {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.degraded = true;
                if health.consecutive_failures >= threshold {
                    health.isolated = true;
                }
            }
        }
        if success {
            inner.breakers[index].record_success();
        } else {
            inner.breakers[index].record_failure(now);
        }
        inner.sync_state(index, threshold);

        let after = inner.breakers[index].state();
        if before != after {
            if after == BreakerState::Open {
                warn!(
                    node = %id,
                    failures = inner.health[index].consecutive_failures,
                    "Circuit breaker opened"
                );
            } else {
                info!(node = %id, from = %before, to = %after, "Circuit breaker transition");
            }
        }
        Ok(after)
    }

    /// Nodes currently usable for ignition, in id order.
    pub fn eligible_nodes(&self) -> Vec<NodeId> {
        let now = Instant::now();
        let threshold = self.config.isolation_threshold;
        let mut inner = self.inner.write();
        (0..inner.nodes.len())
            .filter(|&i| {
                inner.breakers[i].refresh(now);
                inner.sync_state(i, threshold);
                inner.usable(i, threshold)
            })
            .map(NodeId::from_index)
            .collect()
    }

    pub fn is_usable(&self, id: NodeId) -> bool {
        let now = Instant::now();
        let threshold = self.config.isolation_threshold;
        let mut inner = self.inner.write();
        match inner.check(id) {
            Ok(index) => {
                inner.breakers[index].refresh(now);
                inner.sync_state(index, threshold);
                inner.usable(index, threshold)
            }
            Err(_) => false,
        }
    }

    /// Ask the node's breaker for permission to dispatch one request.
    ///
    /// In HalfOpen only the first caller is admitted until an outcome is
    /// reported.
    pub fn try_acquire_probe(&self, id: NodeId) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        let index = inner.check(id)?;
        Ok(inner.breakers[index].allow_request(Instant::now()))
    }

    /// Neighbors over active links.
    pub fn neighbors(&self, id: NodeId) -> CoreResult<Vec<NodeId>> {
        let inner = self.inner.read();
        let index = inner.check(id)?;
        Ok(inner.links[index]
            .iter()
            .copied()
            .filter(|&b| inner.connections.get(&key(index, b)).map_or(false, |c| c.active))
            .map(NodeId::from_index)
            .collect())
    }

    /// Induced subgraph over `ids` in index space: entry `i` lists positions
    /// in `ids` adjacent to `ids[i]` over active links.
    pub fn adjacency(&self, ids: &[NodeId]) -> CoreResult<Vec<Vec<usize>>> {
        let inner = self.inner.read();
        let mut position = vec![usize::MAX; inner.nodes.len()];
        for (pos, &id) in ids.iter().enumerate() {
            position[inner.check(id)?] = pos;
        }

        Ok(ids
            .iter()
            .map(|id| {
                let a = id.index();
                inner.links[a]
                    .iter()
                    .copied()
                    .filter(|&b| position[b] != usize::MAX)
                    .filter(|&b| inner.connections.get(&key(a, b)).map_or(false, |c| c.active))
                    .map(|b| position[b])
                    .collect()
            })
            .collect())
    }

    pub fn enter_ignition_mode(&self, ids: &[NodeId]) -> CoreResult<()> {
        self.set_ignition_mode(ids, true)
    }

    pub fn exit_ignition_mode(&self, ids: &[NodeId]) -> CoreResult<()> {
        self.set_ignition_mode(ids, false)
    }

    fn set_ignition_mode(&self, ids: &[NodeId], entering: bool) -> CoreResult<()> {
        let threshold = self.config.isolation_threshold;
        let mut inner = self.inner.write();
        for &id in ids {
            let index = inner.check(id)?;
            let node = &mut inner.nodes[index];
            if entering {
                if node.state != NodeState::Offline {
                    node.state = NodeState::IgnitionMode;
                }
            } else if node.state == NodeState::IgnitionMode {
                node.state = NodeState::Active;
            }
            inner.sync_state(index, threshold);
        }
        Ok(())
    }

    /// Commit phases produced by the phase engine.
    pub fn record_phases(&self, phases: &[(NodeId, f64)]) -> CoreResult<()> {
        let mut inner = self.inner.write();
        let now = Instant::now();
        for &(id, phase) in phases {
            let index = inner.check(id)?;
            if !phase.is_finite() {
                return Err(CoreError::validation(
                    "phase",
                    format!("non-finite phase {} for {}", phase, id),
                ));
            }
            inner.nodes[index].phase = wrap_phase(phase);
            inner.phase_committed_at[index] = now;
        }
        Ok(())
    }

    /// Time since each node's phase was last committed, in `ids` order.
    ///
    /// Nodes that never took part in an ignition count from fabric creation.
    pub fn phase_ages(&self, ids: &[NodeId]) -> CoreResult<Vec<Duration>> {
        let inner = self.inner.read();
        let now = Instant::now();
        ids.iter()
            .map(|&id| {
                let index = inner.check(id)?;
                Ok(now.saturating_duration_since(inner.phase_committed_at[index]))
            })
            .collect()
    }

    pub fn update_resources(&self, id: NodeId, snapshot: ResourceSnapshot) -> CoreResult<()> {
        if !snapshot.is_valid() {
            return Err(CoreError::validation(
                "resources",
                format!("resource levels must be in [0, 1]: {:?}", snapshot),
            ));
        }
        let mut inner = self.inner.write();
        let index = inner.check(id)?;
        inner.nodes[index].resources = snapshot;
        Ok(())
    }

    pub fn connection(&self, a: NodeId, b: NodeId) -> Option<Connection> {
        self.inner
            .read()
            .connections
            .get(&key(a.index(), b.index()))
            .cloned()
    }

    /// Record a measured latency and loss rate for a link.
    pub fn record_link_sample(
        &self,
        a: NodeId,
        b: NodeId,
        latency_ms: f64,
        packet_loss: f64,
    ) -> CoreResult<()> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(CoreError::validation(
                "latency_ms",
                format!("must be finite and >= 0, got {}", latency_ms),
            ));
        }
        if !packet_loss.is_finite() || !(0.0..=1.0).contains(&packet_loss) {
            return Err(CoreError::validation(
                "packet_loss",
                format!("must be in [0, 1], got {}", packet_loss),
            ));
        }
        let mut inner = self.inner.write();
        inner.check(a)?;
        inner.check(b)?;
        let connection = inner
            .connections
            .get_mut(&key(a.index(), b.index()))
            .ok_or_else(|| CoreError::validation("link", format!("no link {} - {}", a, b)))?;
        connection.latency_ms = latency_ms;
        connection.packet_loss = packet_loss;
        connection.recompute_weight();
        Ok(())
    }

    /// Enable or disable a link. Structural metrics are recomputed lazily.
    pub fn set_link_active(&self, a: NodeId, b: NodeId, active: bool) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.check(a)?;
        inner.check(b)?;
        let connection = inner
            .connections
            .get_mut(&key(a.index(), b.index()))
            .ok_or_else(|| CoreError::validation("link", format!("no link {} - {}", a, b)))?;
        if connection.active != active {
            connection.active = active;
            inner.structure = None;
            info!(a = %a, b = %b, active, "Link activity changed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric(n: usize, density: f64) -> TopologyFabric {
        TopologyFabric::initialize(&FabricConfig {
            node_count: n,
            target_density: density,
            seed: Some(42),
            ..FabricConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_initialize_default_scenario() {
        let fabric = fabric(32, 0.20);
        let metrics = fabric.metrics();
        assert_eq!(metrics.structure.node_count, 32);
        assert!((metrics.structure.density - 0.20).abs() <= 0.02);
        assert!(metrics.structure.clustering_coefficient >= 0.75);
        assert!(metrics.structure.connected);
        assert_eq!(metrics.healthy_nodes, 32);
        assert_eq!(metrics.usable_nodes, 32);
        assert!(metrics.mean_latency_ms < 5.0);
        assert!(metrics.available_capacity > 0.40);
    }

    #[test]
    fn test_nodes_start_active_with_valid_phase() {
        let fabric = fabric(16, 0.3);
        for id in fabric.node_ids() {
            let node = fabric.get_node(id).unwrap();
            assert_eq!(node.state, NodeState::Active);
            assert!((0.0..TAU).contains(&node.phase));
            assert!((39.75..=40.25).contains(&node.natural_frequency_hz));
        }
        assert!(matches!(
            fabric.get_node(NodeId(99)),
            Err(CoreError::NodeNotFound { id: NodeId(99) })
        ));
    }

    #[test]
    fn test_failures_open_breaker_and_exclude_node() {
        let fabric = fabric(12, 1.0);
        let id = NodeId(4);
        assert_eq!(fabric.report_outcome(id, false).unwrap(), BreakerState::Closed);
        assert_eq!(fabric.get_node(id).unwrap().state, NodeState::Degraded);
        fabric.report_outcome(id, false).unwrap();
        assert_eq!(fabric.report_outcome(id, false).unwrap(), BreakerState::Open);

        assert_eq!(fabric.get_node(id).unwrap().state, NodeState::Offline);
        assert!(!fabric.is_usable(id));
        assert!(!fabric.eligible_nodes().contains(&id));
        assert!(!fabric.try_acquire_probe(id).unwrap());
        assert_eq!(fabric.metrics().open_breakers, 1);
    }

    #[test]
    fn test_success_restores_active_state() {
        let fabric = fabric(12, 1.0);
        let id = NodeId(2);
        fabric.report_outcome(id, false).unwrap();
        fabric.report_outcome(id, true).unwrap();
        let health = fabric.health(id).unwrap();
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_seen.is_some());
        assert_eq!(fabric.get_node(id).unwrap().state, NodeState::Active);
    }

    #[test]
    fn test_induced_adjacency_uses_positions() {
        let fabric = fabric(12, 1.0);
        let ids = vec![NodeId(3), NodeId(7), NodeId(9)];
        let adjacency = fabric.adjacency(&ids).unwrap();
        assert_eq!(adjacency, vec![vec![1, 2], vec![0, 2], vec![0, 1]]);
    }

    #[test]
    fn test_inactive_link_leaves_topology() {
        let fabric = fabric(12, 1.0);
        let before = fabric.metrics().structure.edge_count;
        fabric.set_link_active(NodeId(0), NodeId(1), false).unwrap();
        assert_eq!(fabric.metrics().structure.edge_count, before - 1);
        assert!(!fabric.neighbors(NodeId(0)).unwrap().contains(&NodeId(1)));
        let ids = vec![NodeId(0), NodeId(1)];
        assert_eq!(fabric.adjacency(&ids).unwrap(), vec![Vec::<usize>::new(), vec![]]);
    }

    #[test]
    fn test_link_sample_updates_weight() {
        let fabric = fabric(12, 1.0);
        fabric
            .record_link_sample(NodeId(1), NodeId(0), 3.0, 0.2)
            .unwrap();
        let c = fabric.connection(NodeId(0), NodeId(1)).unwrap();
        assert!((c.weight - 0.2).abs() < 1e-12);
        assert!(fabric
            .record_link_sample(NodeId(0), NodeId(1), -1.0, 0.0)
            .is_err());
        assert!(fabric
            .record_link_sample(NodeId(0), NodeId(1), 1.0, 1.5)
            .is_err());
    }

    #[test]
    fn test_ignition_mode_round_trip() {
        let fabric = fabric(12, 1.0);
        let ids = fabric.node_ids();
        fabric.enter_ignition_mode(&ids).unwrap();
        assert_eq!(fabric.get_node(NodeId(0)).unwrap().state, NodeState::IgnitionMode);
        fabric.record_phases(&[(NodeId(0), 7.0)]).unwrap();
        assert!((fabric.get_node(NodeId(0)).unwrap().phase - (7.0 - TAU)).abs() < 1e-12);
        fabric.exit_ignition_mode(&ids).unwrap();
        assert_eq!(fabric.get_node(NodeId(0)).unwrap().state, NodeState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_ages_track_last_commit() {
        let fabric = fabric(12, 1.0);
        tokio::time::advance(Duration::from_millis(300)).await;
        fabric.record_phases(&[(NodeId(2), 1.0)]).unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;

        let ages = fabric.phase_ages(&[NodeId(0), NodeId(2)]).unwrap();
        assert_eq!(ages, vec![Duration::from_millis(500), Duration::from_millis(200)]);
        assert!(matches!(
            fabric.phase_ages(&[NodeId(40)]),
            Err(CoreError::NodeNotFound { id: NodeId(40) })
        ));
    }

    #[test]
    fn test_resources_validated() {
        let fabric = fabric(12, 1.0);
        let bad = ResourceSnapshot {
            attention_level: 1.0,
            cpu_utilization: 1.2,
            memory_utilization: 0.1,
        };
        assert!(fabric.update_resources(NodeId(0), bad).is_err());
    }
}
