//! Node health probing.
//!
//! A [`HealthMonitor`] sweeps every node through a [`NodeProbe`] on a fixed
//! cadence and feeds the outcomes into the fabric's health and breaker
//! bookkeeping. Nodes whose breaker refuses a request (Open, or HalfOpen with
//! the probe slot taken) are skipped for that sweep.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use super::types::{NodeId, ResourceSnapshot};
use super::TopologyFabric;
use crate::error::{CoreError, CoreResult};

const COMPONENT: &str = "health monitor";
const JOIN_TIMEOUT_MS: u64 = 5000;

/// Result of one successful probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub round_trip_ms: f64,
    /// Fresh resource usage, when the node reports it.
    pub resources: Option<ResourceSnapshot>,
}

/// Reaches a node and reports whether it answered.
#[async_trait]
pub trait NodeProbe: Send + Sync {
    async fn probe(&self, node: NodeId) -> CoreResult<ProbeReport>;
}

/// In-process probe with a configurable failure rate and forced outages.
pub struct SimulatedProbe {
    failure_probability: f64,
    rng: Mutex<ChaCha8Rng>,
    down: Mutex<HashSet<NodeId>>,
}

impl SimulatedProbe {
    pub fn new(failure_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            failure_probability: failure_probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
            down: Mutex::new(HashSet::new()),
        }
    }

    /// Force a node to fail (or stop failing) every probe.
    pub fn set_down(&self, node: NodeId, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(node);
        } else {
            set.remove(&node);
        }
    }
}

#[async_trait]
impl NodeProbe for SimulatedProbe {
    async fn probe(&self, node: NodeId) -> CoreResult<ProbeReport> {
        if self.down.lock().contains(&node) {
            return Err(CoreError::Delivery {
                node,
                message: "node unreachable".into(),
            });
        }
        let mut rng = self.rng.lock();
        if rng.gen::<f64>() < self.failure_probability {
            return Err(CoreError::Delivery {
                node,
                message: "probe dropped".into(),
            });
        }
        Ok(ProbeReport {
            round_trip_ms: rng.gen_range(0.2..1.5),
            resources: Some(ResourceSnapshot {
                attention_level: 1.0,
                cpu_utilization: rng.gen_range(0.05..0.35),
                memory_utilization: rng.gen_range(0.10..0.40),
            }),
        })
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSweep {
    pub probed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Refused by the node's breaker.
    pub skipped: usize,
}

#[derive(Clone)]
struct Prober {
    fabric: Arc<TopologyFabric>,
    probe: Arc<dyn NodeProbe>,
    timeout: Duration,
}

impl Prober {
    async fn sweep(&self) -> CoreResult<HealthSweep> {
        let mut sweep = HealthSweep::default();
        for id in self.fabric.node_ids() {
            if !self.fabric.try_acquire_probe(id)? {
                sweep.skipped += 1;
                continue;
            }
            sweep.probed += 1;

            let outcome = match tokio::time::timeout(self.timeout, self.probe.probe(id)).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::Delivery {
                    node: id,
                    message: format!("probe timed out after {}ms", self.timeout.as_millis()),
                }),
            };

            match outcome {
                Ok(report) => {
                    if let Some(resources) = report.resources {
                        self.fabric.update_resources(id, resources)?;
                    }
                    self.fabric.report_outcome(id, true)?;
                    sweep.succeeded += 1;
                }
                Err(e) => {
                    debug!(node = %id, error = %e, "Health probe failed");
                    self.fabric.report_outcome(id, false)?;
                    sweep.failed += 1;
                }
            }
        }
        trace!(?sweep, "Health sweep finished");
        Ok(sweep)
    }
}

/// Periodic health prober for every fabric node.
pub struct HealthMonitor {
    prober: Prober,
    interval_ms: u64,
    shutdown_notify: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
}

impl HealthMonitor {
    /// Cadence and probe timeout come from the fabric's configuration.
    pub fn new(fabric: Arc<TopologyFabric>, probe: Arc<dyn NodeProbe>) -> Self {
        let interval_ms = fabric.config().health_check_interval_ms;
        let timeout = Duration::from_millis(fabric.config().probe_timeout_ms);
        Self {
            prober: Prober {
                fabric,
                probe,
                timeout,
            },
            interval_ms,
            shutdown_notify: Arc::new(Notify::new()),
            task_handle: None,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Probe every node once, now.
    pub async fn sweep(&self) -> CoreResult<HealthSweep> {
        self.prober.sweep().await
    }

    pub fn start(&mut self) -> CoreResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning {
                component: COMPONENT,
            });
        }
        self.is_running.store(true, Ordering::SeqCst);
        self.shutdown_notify = Arc::new(Notify::new());

        let prober = self.prober.clone();
        let shutdown = Arc::clone(&self.shutdown_notify);
        let is_running = Arc::clone(&self.is_running);
        let interval_ms = self.interval_ms.max(1);

        self.task_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        is_running.store(false, Ordering::SeqCst);
                        break;
                    }

                    _ = interval.tick() => {
                        if let Err(e) = prober.sweep().await {
                            error!(error = %e, "Health sweep aborted");
                        }
                    }
                }
            }
            info!("Health monitor loop stopped");
        }));

        info!(interval_ms, "Health monitor started");
        Ok(())
    }

    pub async fn stop(&mut self) -> CoreResult<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(CoreError::NotRunning {
                component: COMPONENT,
            });
        }
        self.shutdown_notify.notify_one();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(Duration::from_millis(JOIN_TIMEOUT_MS), handle).await {
                Ok(Ok(())) => {
                    self.is_running.store(false, Ordering::SeqCst);
                    info!("Health monitor stopped gracefully");
                }
                Ok(Err(e)) => {
                    self.is_running.store(false, Ordering::SeqCst);
                    error!(error = ?e, "Health monitor task panicked");
                }
                Err(_) => {
                    return Err(CoreError::ShutdownTimeout {
                        component: COMPONENT,
                        timeout_ms: JOIN_TIMEOUT_MS,
                    });
                }
            }
        } else {
            self.is_running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FabricConfig;
    use crate::fabric::{BreakerState, NodeState};

    fn fabric() -> Arc<TopologyFabric> {
        Arc::new(
            TopologyFabric::initialize(&FabricConfig {
                node_count: 12,
                target_density: 1.0,
                seed: Some(7),
                recovery_timeout_ms: 1000,
                ..FabricConfig::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_sweep_marks_every_node_seen() {
        let fabric = fabric();
        let monitor = HealthMonitor::new(Arc::clone(&fabric), Arc::new(SimulatedProbe::new(0.0, Some(1))));
        let sweep = monitor.sweep().await.unwrap();
        assert_eq!(sweep.probed, 12);
        assert_eq!(sweep.succeeded, 12);
        for id in fabric.node_ids() {
            assert!(fabric.health(id).unwrap().last_seen.is_some());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_down_node_trips_then_recovers_through_half_open() {
        println!("\n=== TEST: breaker trip and recovery via health sweeps ===");
        let fabric = fabric();
        let probe = Arc::new(SimulatedProbe::new(0.0, Some(2)));
        let monitor = HealthMonitor::new(Arc::clone(&fabric), probe.clone());
        let target = NodeId(5);

        probe.set_down(target, true);
        for _ in 0..3 {
            monitor.sweep().await.unwrap();
        }
        assert_eq!(fabric.breaker_state(target).unwrap(), BreakerState::Open);
        assert_eq!(fabric.get_node(target).unwrap().state, NodeState::Offline);

        // Open breakers are skipped until the recovery timeout passes.
        let sweep = monitor.sweep().await.unwrap();
        assert_eq!(sweep.skipped, 1);

        probe.set_down(target, false);
        tokio::time::advance(Duration::from_millis(1001)).await;
        let sweep = monitor.sweep().await.unwrap();
        assert_eq!(sweep.skipped, 0);
        assert_eq!(fabric.breaker_state(target).unwrap(), BreakerState::Closed);
        assert_eq!(fabric.get_node(target).unwrap().state, NodeState::Active);
        println!("EVIDENCE: node recovered after half-open probe succeeded");
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut monitor = HealthMonitor::new(fabric(), Arc::new(SimulatedProbe::new(0.0, Some(3))));
        assert!(!monitor.is_running());
        monitor.start().unwrap();
        assert!(matches!(
            monitor.start(),
            Err(CoreError::AlreadyRunning { .. })
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.stop().await.unwrap();
        assert!(!monitor.is_running());
        assert!(matches!(
            monitor.stop().await,
            Err(CoreError::NotRunning { .. })
        ));
    }
}
