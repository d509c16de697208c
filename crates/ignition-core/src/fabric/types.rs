//! Node, link and metric types owned by the fabric.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a fabric node. Ids are dense: `NodeId(i)` is the i-th node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{:03}", self.0)
    }
}

/// Operational state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Initializing,
    Active,
    /// Participating in an ignition event.
    IgnitionMode,
    /// Recent failures, still reachable.
    Degraded,
    Offline,
}

/// Point-in-time resource usage of a node. All fields in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub attention_level: f64,
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            attention_level: 1.0,
            cpu_utilization: 0.0,
            memory_utilization: 0.0,
        }
    }
}

impl ResourceSnapshot {
    /// Fraction of the node still free: `1 - max(cpu, memory)`.
    #[inline]
    pub fn headroom(&self) -> f64 {
        (1.0 - self.cpu_utilization.max(self.memory_utilization)).clamp(0.0, 1.0)
    }

    pub(crate) fn is_valid(&self) -> bool {
        [
            self.attention_level,
            self.cpu_utilization,
            self.memory_utilization,
        ]
        .iter()
        .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// Snapshot of one fabric node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricNode {
    pub id: NodeId,
    pub state: NodeState,
    /// Last committed oscillator phase, radians in [0, 2π).
    pub phase: f64,
    /// Natural frequency (Hz).
    pub natural_frequency_hz: f64,
    pub resources: ResourceSnapshot,
}

/// Undirected link. Stored with `a < b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub a: NodeId,
    pub b: NodeId,
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
    pub packet_loss: f64,
    pub active: bool,
    /// Routing weight `(1 - packet_loss) / (1 + latency_ms)`, always >= 0.
    pub weight: f64,
}

impl Connection {
    pub(crate) fn new(a: NodeId, b: NodeId, bandwidth_mbps: f64, latency_ms: f64) -> Self {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        let mut connection = Self {
            a,
            b,
            bandwidth_mbps,
            latency_ms: latency_ms.max(0.0),
            packet_loss: 0.0,
            active: true,
            weight: 0.0,
        };
        connection.recompute_weight();
        connection
    }

    pub(crate) fn recompute_weight(&mut self) {
        self.weight = ((1.0 - self.packet_loss) / (1.0 + self.latency_ms)).max(0.0);
    }
}

/// Health bookkeeping for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub last_seen: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub isolated: bool,
    pub degraded: bool,
}

impl NodeHealth {
    /// Healthy iff not isolated and failures below the isolation threshold.
    #[inline]
    pub fn is_healthy(&self, isolation_threshold: u32) -> bool {
        !self.isolated && self.consecutive_failures < isolation_threshold
    }
}

/// Graph-theoretic properties of the active topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralMetrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub min_degree: usize,
    pub max_degree: usize,
    pub clustering_coefficient: f64,
    /// Mean shortest path over reachable pairs.
    pub average_path_length: f64,
    pub diameter: usize,
    /// Second-smallest Laplacian eigenvalue λ₂.
    pub algebraic_connectivity: f64,
    pub connected: bool,
}

/// Structural plus operational fabric metrics, derived on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FabricMetrics {
    #[serde(flatten)]
    pub structure: StructuralMetrics,
    /// Mean latency over active links (ms).
    pub mean_latency_ms: f64,
    pub healthy_nodes: usize,
    /// Nodes currently eligible for ignition.
    pub usable_nodes: usize,
    /// Summed headroom of usable nodes divided by node count, in [0, 1].
    pub available_capacity: f64,
    pub open_breakers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_normalizes_endpoints_and_weight() {
        let c = Connection::new(NodeId(5), NodeId(2), 1000.0, 1.0);
        assert_eq!((c.a, c.b), (NodeId(2), NodeId(5)));
        assert!((c.weight - 0.5).abs() < 1e-12);

        let c = Connection::new(NodeId(0), NodeId(1), 1000.0, -3.0);
        assert_eq!(c.latency_ms, 0.0);
        assert_eq!(c.weight, 1.0);
    }

    #[test]
    fn test_headroom_uses_tighter_resource() {
        let r = ResourceSnapshot {
            attention_level: 1.0,
            cpu_utilization: 0.3,
            memory_utilization: 0.6,
        };
        assert!((r.headroom() - 0.4).abs() < 1e-12);
        assert!(r.is_valid());
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(42).to_string(), "node-042");
        assert_eq!(NodeId::from_index(9).index(), 9);
    }
}
