//! Timestamp exchange transport.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use tokio::time::Instant;

use crate::error::{CoreError, CoreResult};
use crate::fabric::NodeId;

/// The four timestamps of one Sync / Delay_Req round, in nanoseconds.
///
/// `t1` master send and `t4` master receive are on the master's clock;
/// `t2` node receive and `t3` node send are on the node's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampQuad {
    pub t1: i64,
    pub t2: i64,
    pub t3: i64,
    pub t4: i64,
}

impl TimestampQuad {
    /// Node clock minus master clock, assuming a symmetric path.
    pub fn offset_ns(&self) -> f64 {
        ((self.t2 - self.t1) - (self.t4 - self.t3)) as f64 / 2.0
    }

    /// Mean one-way path delay.
    pub fn delay_ns(&self) -> f64 {
        ((self.t2 - self.t1) + (self.t4 - self.t3)) as f64 / 2.0
    }
}

/// Network seam for clock synchronization.
#[async_trait]
pub trait TimeExchange: Send + Sync {
    /// Run one exchange between `node` and its `master`.
    async fn exchange(&self, node: NodeId, master: NodeId) -> CoreResult<TimestampQuad>;

    /// Step the node's clock by `correction_ns`.
    async fn adjust(&self, node: NodeId, correction_ns: f64) -> CoreResult<()>;
}

const INITIAL_OFFSET_NS: f64 = 20_000.0;
const MAX_DRIFT_PPM: f64 = 2.0;
const BASE_DELAY_NS: f64 = 20_000.0;
const DELAY_JITTER_NS: f64 = 50.0;
const TURNAROUND_NS: f64 = 1_000.0;

#[derive(Debug, Clone, Copy)]
struct SimClock {
    /// Offset from true time at `epoch`, including applied corrections.
    offset_ns: f64,
    drift_ppm: f64,
}

struct SimState {
    clocks: HashMap<NodeId, SimClock>,
    unreachable: HashSet<NodeId>,
    rng: ChaCha8Rng,
}

/// In-process exchange over simulated drifting clocks and a noisy symmetric
/// link. Clocks are created lazily with a random offset of up to ±20 µs and a
/// drift of up to ±2 ppm.
pub struct SimulatedTimeExchange {
    epoch: Instant,
    state: Mutex<SimState>,
}

impl SimulatedTimeExchange {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            epoch: Instant::now(),
            state: Mutex::new(SimState {
                clocks: HashMap::new(),
                unreachable: HashSet::new(),
                rng,
            }),
        }
    }

    /// Make exchanges involving `node` fail.
    pub fn set_unreachable(&self, node: NodeId, unreachable: bool) {
        let mut state = self.state.lock();
        if unreachable {
            state.unreachable.insert(node);
        } else {
            state.unreachable.remove(&node);
        }
    }

    /// Step a node's clock without telling the service.
    pub fn inject_offset(&self, node: NodeId, delta_ns: f64) {
        let mut state = self.state.lock();
        let clock = Self::clock(&mut state, node);
        clock.offset_ns += delta_ns;
    }

    fn clock(state: &mut SimState, node: NodeId) -> &mut SimClock {
        let SimState { clocks, rng, .. } = state;
        clocks.entry(node).or_insert_with(|| SimClock {
            offset_ns: rng.gen_range(-INITIAL_OFFSET_NS..=INITIAL_OFFSET_NS),
            drift_ppm: rng.gen_range(-MAX_DRIFT_PPM..=MAX_DRIFT_PPM),
        })
    }

    fn elapsed_ns(&self) -> f64 {
        Instant::now().saturating_duration_since(self.epoch).as_nanos() as f64
    }
}

impl SimClock {
    fn offset_at(&self, elapsed_ns: f64) -> f64 {
        self.offset_ns + self.drift_ppm * 1e-6 * elapsed_ns
    }
}

#[async_trait]
impl TimeExchange for SimulatedTimeExchange {
    async fn exchange(&self, node: NodeId, master: NodeId) -> CoreResult<TimestampQuad> {
        let now = self.elapsed_ns();
        let mut state = self.state.lock();
        if state.unreachable.contains(&node) || state.unreachable.contains(&master) {
            return Err(CoreError::ClockSync {
                node,
                message: format!("no route to {}", master),
            });
        }

        let master_offset = Self::clock(&mut state, master).offset_at(now);
        let node_offset = Self::clock(&mut state, node).offset_at(now);
        let forward = (BASE_DELAY_NS + DELAY_JITTER_NS * state.rng.sample::<f64, _>(StandardNormal)).max(0.0);
        let backward = (BASE_DELAY_NS + DELAY_JITTER_NS * state.rng.sample::<f64, _>(StandardNormal)).max(0.0);

        let t1 = now + master_offset;
        let t2 = now + forward + node_offset;
        let t3 = t2 + TURNAROUND_NS;
        let t4 = now + forward + TURNAROUND_NS + backward + master_offset;

        Ok(TimestampQuad {
            t1: t1.round() as i64,
            t2: t2.round() as i64,
            t3: t3.round() as i64,
            t4: t4.round() as i64,
        })
    }

    async fn adjust(&self, node: NodeId, correction_ns: f64) -> CoreResult<()> {
        if !correction_ns.is_finite() {
            return Err(CoreError::validation(
                "correction_ns",
                format!("non-finite clock correction {}", correction_ns),
            ));
        }
        let mut state = self.state.lock();
        Self::clock(&mut state, node).offset_ns += correction_ns;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_offset_and_delay() {
        // Node 500 ns ahead, 10 µs each way, 1 µs turnaround.
        let quad = TimestampQuad {
            t1: 0,
            t2: 10_500,
            t3: 11_500,
            t4: 21_000,
        };
        assert_eq!(quad.offset_ns(), 500.0);
        assert_eq!(quad.delay_ns(), 10_000.0);
    }

    #[tokio::test]
    async fn test_simulated_exchange_measures_relative_offset() {
        let exchange = SimulatedTimeExchange::new(Some(9));
        let (node, master) = (NodeId(1), NodeId(0));
        exchange.inject_offset(node, 0.0);
        exchange.inject_offset(master, 0.0);

        let quad = exchange.exchange(node, master).await.unwrap();
        let (node_offset, master_offset) = {
            let state = exchange.state.lock();
            (state.clocks[&node].offset_ns, state.clocks[&master].offset_ns)
        };
        let expected = node_offset - master_offset;
        // Asymmetric delay noise is a few hundred ns at most.
        assert!((quad.offset_ns() - expected).abs() < 1_000.0);
        assert!((quad.delay_ns() - BASE_DELAY_NS).abs() < 1_000.0);
    }

    #[tokio::test]
    async fn test_unreachable_node_fails() {
        let exchange = SimulatedTimeExchange::new(Some(1));
        exchange.set_unreachable(NodeId(3), true);
        assert!(matches!(
            exchange.exchange(NodeId(3), NodeId(0)).await,
            Err(CoreError::ClockSync { .. })
        ));
    }
}
