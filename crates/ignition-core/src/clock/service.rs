//! Clock synchronization service.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::exchange::TimeExchange;
use super::{ClockMetrics, ClockOffset, ClockRole};
use crate::config::ClockConfig;
use crate::error::{CoreError, CoreResult};
use crate::fabric::NodeId;

#[derive(Debug, Clone)]
struct ClockState {
    role: ClockRole,
    /// Registration order among slaves, used for master assignment.
    slave_slot: usize,
    /// Offset against the parent from the latest exchange.
    measured_ns: Option<f64>,
    /// Correction applied after the latest exchange.
    last_correction_ns: f64,
    integral_ns: f64,
    last_exchange: Option<Instant>,
    offset: ClockOffset,
}

#[derive(Default)]
struct ClockTable {
    grand_master: Option<NodeId>,
    masters: Vec<NodeId>,
    slaves: usize,
    nodes: BTreeMap<NodeId, ClockState>,
}

impl ClockTable {
    fn parent_of(&self, node: NodeId) -> CoreResult<Option<NodeId>> {
        let state = self
            .nodes
            .get(&node)
            .ok_or(CoreError::NodeNotFound { id: node })?;
        let grand_master = self.grand_master.ok_or_else(|| CoreError::ClockSync {
            node,
            message: "no grand master registered".into(),
        })?;
        Ok(match state.role {
            ClockRole::GrandMaster => None,
            ClockRole::Master => Some(grand_master),
            ClockRole::Slave if self.masters.is_empty() => Some(grand_master),
            ClockRole::Slave => Some(self.masters[state.slave_slot % self.masters.len()]),
        })
    }
}

/// Outcome of one pass over every registered clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncRound {
    pub synchronized: usize,
    pub failed: Vec<NodeId>,
}

/// Maintains the clock hierarchy and the latest per-node offsets.
pub struct ClockSyncService {
    config: ClockConfig,
    exchange: Arc<dyn TimeExchange>,
    table: RwLock<ClockTable>,
}

impl ClockSyncService {
    pub fn new(config: ClockConfig, exchange: Arc<dyn TimeExchange>) -> Self {
        Self {
            config,
            exchange,
            table: RwLock::new(ClockTable::default()),
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    /// Add a clock to the hierarchy. Re-registering a node replaces its role
    /// and resets its servo.
    ///
    /// # Errors
    ///
    /// `CoreError::ValidationError` when a different node already holds the
    /// grand master role.
    pub fn register(&self, node: NodeId, role: ClockRole) -> CoreResult<()> {
        let mut table = self.table.write();
        if role == ClockRole::GrandMaster {
            if let Some(existing) = table.grand_master.filter(|gm| *gm != node) {
                return Err(CoreError::validation(
                    "role",
                    format!("{} is already the grand master", existing),
                ));
            }
        }

        let previous = table.nodes.get(&node).map(|s| (s.role, s.slave_slot));
        match previous {
            Some((ClockRole::GrandMaster, _)) => table.grand_master = None,
            Some((ClockRole::Master, _)) => table.masters.retain(|m| *m != node),
            _ => {}
        }
        match role {
            ClockRole::GrandMaster => table.grand_master = Some(node),
            ClockRole::Master => table.masters.push(node),
            ClockRole::Slave => {}
        }
        let slave_slot = match previous {
            Some((ClockRole::Slave, slot)) => slot,
            _ if role == ClockRole::Slave => {
                table.slaves += 1;
                table.slaves - 1
            }
            _ => 0,
        };

        let offset = if role == ClockRole::GrandMaster {
            ClockOffset::reference(Utc::now())
        } else {
            ClockOffset::default()
        };
        table.nodes.insert(
            node,
            ClockState {
                role,
                slave_slot,
                measured_ns: None,
                last_correction_ns: 0.0,
                integral_ns: 0.0,
                last_exchange: None,
                offset,
            },
        );
        debug!(node = %node, ?role, "Clock registered");
        Ok(())
    }

    /// Register `nodes` as one hierarchy: the first is the grand master, the
    /// next `master_count` are masters and the rest are slaves.
    pub fn register_hierarchy(&self, nodes: &[NodeId]) -> CoreResult<()> {
        for (i, &node) in nodes.iter().enumerate() {
            let role = match i {
                0 => ClockRole::GrandMaster,
                i if i <= self.config.master_count => ClockRole::Master,
                _ => ClockRole::Slave,
            };
            self.register(node, role)?;
        }
        info!(
            nodes = nodes.len(),
            masters = self.config.master_count.min(nodes.len().saturating_sub(1)),
            "Clock hierarchy registered"
        );
        Ok(())
    }

    pub fn role(&self, node: NodeId) -> Option<ClockRole> {
        self.table.read().nodes.get(&node).map(|s| s.role)
    }

    /// Run one exchange for `node` and steer its clock.
    ///
    /// # Errors
    ///
    /// - `CoreError::NodeNotFound` for an unregistered node
    /// - `CoreError::ClockSync` when no grand master exists or the exchange
    ///   fails or times out
    pub async fn synchronize(&self, node: NodeId) -> CoreResult<ClockOffset> {
        let parent = self.table.read().parent_of(node)?;
        let Some(parent) = parent else {
            let mut table = self.table.write();
            let state = table
                .nodes
                .get_mut(&node)
                .ok_or(CoreError::NodeNotFound { id: node })?;
            state.offset = ClockOffset::reference(Utc::now());
            return Ok(state.offset);
        };

        let timeout = Duration::from_millis(self.config.exchange_timeout_ms);
        let quad = match tokio::time::timeout(timeout, self.exchange.exchange(node, parent)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::ClockSync {
                    node,
                    message: format!("exchange with {} timed out after {}ms", parent, timeout.as_millis()),
                })
            }
        };
        let measured = quad.offset_ns();
        let delay = quad.delay_ns();
        let now = Instant::now();

        let (offset, correction) = {
            let mut table = self.table.write();
            let parent_offset = table.nodes.get(&parent).map(|s| s.offset);
            let state = table
                .nodes
                .get_mut(&node)
                .ok_or(CoreError::NodeNotFound { id: node })?;
            self.update_state(state, measured, delay, now, parent_offset)
        };

        if let Err(e) = self.exchange.adjust(node, correction).await {
            if let Some(state) = self.table.write().nodes.get_mut(&node) {
                state.last_correction_ns = 0.0;
            }
            return Err(e);
        }

        debug!(
            node = %node,
            parent = %parent,
            offset_ns = offset.offset_ns,
            jitter_ns = offset.jitter_ns,
            quality = offset.quality,
            "Clock synchronized"
        );
        Ok(offset)
    }

    fn update_state(
        &self,
        state: &mut ClockState,
        measured: f64,
        delay: f64,
        now: Instant,
        parent: Option<ClockOffset>,
    ) -> (ClockOffset, f64) {
        let alpha = self.config.jitter_smoothing;
        let (jitter, drift_ppm) = match (state.measured_ns, state.last_exchange) {
            (Some(previous), Some(at)) => {
                let jitter = (1.0 - alpha) * state.offset.jitter_ns + alpha * (measured - previous).abs();
                let elapsed_ns = now.saturating_duration_since(at).as_nanos() as f64;
                let unexplained = measured - (previous + state.last_correction_ns);
                let drift = if elapsed_ns > 0.0 {
                    unexplained / elapsed_ns * 1e6
                } else {
                    state.offset.drift_ppm
                };
                (jitter, drift)
            }
            // First exchange: the whole offset counts as jitter.
            _ => (measured.abs(), 0.0),
        };

        let mut quality = 1.0 / (1.0 + jitter / self.config.jitter_scale_ns);
        if delay > self.config.max_path_delay_ns {
            quality *= self.config.max_path_delay_ns / delay;
        }

        let (offset_ns, quality) = match parent {
            Some(p) => (measured + p.offset_ns, quality.min(p.quality)),
            None => (measured, quality),
        };

        state.integral_ns += measured;
        let correction = -(self.config.servo_kp * measured + self.config.servo_ki * state.integral_ns);
        state.measured_ns = Some(measured);
        state.last_correction_ns = correction;
        state.last_exchange = Some(now);
        state.offset = ClockOffset {
            offset_ns,
            jitter_ns: jitter,
            drift_ppm,
            path_delay_ns: delay,
            last_sync: Some(Utc::now()),
            quality: quality.clamp(0.0, 1.0),
        };
        (state.offset, correction)
    }

    /// Synchronize every clock: grand master, then masters, then slaves.
    pub async fn synchronize_all(&self) -> SyncRound {
        let order: Vec<NodeId> = {
            let table = self.table.read();
            let mut order: Vec<(ClockRole, NodeId)> =
                table.nodes.iter().map(|(id, s)| (s.role, *id)).collect();
            order.sort_by_key(|(role, id)| {
                let rank = match role {
                    ClockRole::GrandMaster => 0,
                    ClockRole::Master => 1,
                    ClockRole::Slave => 2,
                };
                (rank, *id)
            });
            order.into_iter().map(|(_, id)| id).collect()
        };

        let mut round = SyncRound::default();
        for node in order {
            match self.synchronize(node).await {
                Ok(_) => round.synchronized += 1,
                Err(e) => {
                    warn!(node = %node, error = %e, "Clock synchronization failed");
                    round.failed.push(node);
                }
            }
        }
        round
    }

    pub fn offset(&self, node: NodeId) -> Option<ClockOffset> {
        self.table.read().nodes.get(&node).map(|s| s.offset)
    }

    /// Every participant registered with an acceptable offset. An empty
    /// participant list is never ready.
    pub fn is_ready_for_ignition(&self, participants: &[NodeId]) -> bool {
        if participants.is_empty() {
            return false;
        }
        let table = self.table.read();
        participants.iter().all(|node| {
            table
                .nodes
                .get(node)
                .map_or(false, |s| s.offset.is_acceptable(&self.config))
        })
    }

    /// Every registered clock acceptable.
    pub fn is_ready(&self) -> bool {
        let table = self.table.read();
        !table.nodes.is_empty()
            && table
                .nodes
                .values()
                .all(|s| s.offset.is_acceptable(&self.config))
    }

    pub fn metrics(&self) -> ClockMetrics {
        let table = self.table.read();
        let synced: Vec<&ClockOffset> = table
            .nodes
            .values()
            .map(|s| &s.offset)
            .filter(|o| o.last_sync.is_some())
            .collect();
        ClockMetrics {
            grand_master: table.grand_master,
            registered: table.nodes.len(),
            synchronized: synced.len(),
            ready: synced
                .iter()
                .filter(|o| o.is_acceptable(&self.config))
                .count(),
            max_abs_offset_ns: synced.iter().map(|o| o.offset_ns.abs()).fold(0.0, f64::max),
            mean_jitter_ns: if synced.is_empty() {
                0.0
            } else {
                synced.iter().map(|o| o.jitter_ns).sum::<f64>() / synced.len() as f64
            },
            min_quality: synced.iter().map(|o| o.quality).fold(1.0, f64::min),
        }
    }
}
