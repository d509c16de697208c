//! Broadcast delivery seam.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{CoreError, CoreResult};
use crate::fabric::NodeId;

/// Delivers ignition content to one node.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    async fn deliver(&self, node: NodeId, content: &serde_json::Value) -> CoreResult<()>;
}

/// In-process transport with an optional random drop rate.
pub struct LocalTransport {
    failure_probability: f64,
    rng: Mutex<ChaCha8Rng>,
    down: Mutex<HashSet<NodeId>>,
    delivered: Mutex<Vec<NodeId>>,
}

impl LocalTransport {
    pub fn new(failure_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            failure_probability: failure_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            down: Mutex::new(HashSet::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn reliable() -> Self {
        Self::new(0.0, Some(0))
    }

    pub fn set_down(&self, node: NodeId, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(node);
        } else {
            set.remove(&node);
        }
    }

    /// Every successful delivery so far, in order.
    pub fn delivered(&self) -> Vec<NodeId> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl BroadcastTransport for LocalTransport {
    async fn deliver(&self, node: NodeId, _content: &serde_json::Value) -> CoreResult<()> {
        let dropped = self.down.lock().contains(&node)
            || self.rng.lock().gen::<f64>() < self.failure_probability;
        if dropped {
            return Err(CoreError::Delivery {
                node,
                message: "broadcast not acknowledged".into(),
            });
        }
        self.delivered.lock().push(node);
        Ok(())
    }
}
