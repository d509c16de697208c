//! Cluster runtime owning every component's lifecycle.
//!
//! ```text
//! start:    fabric -> clock hierarchy -> context -> coordinator
//!           -> health monitor -> clock sync task -> control loop
//! shutdown: control loop -> health monitor -> clock sync task -> context
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{ClockMetrics, ClockSyncService, ClockSyncTask, SimulatedTimeExchange, TimeExchange};
use crate::config::Config;
use crate::coordinator::{
    ArousalSource, BroadcastTransport, ControlLoop, CoordinatorMetrics, EventSubscription,
    FixedArousal, IgnitionContext, IgnitionCoordinator, IgnitionEvent, LocalTransport,
    TriggerOutcome,
};
use crate::error::{CoreError, CoreResult};
use crate::fabric::{FabricMetrics, HealthMonitor, NodeProbe, SimulatedProbe, TopologyFabric};
use crate::salience::SalienceInput;
use crate::sync::CoherenceSample;
use crate::validation::{score_event, score_topology, EventCompliance, TopologyCompliance};

/// The network-bound seams a cluster is built on.
#[derive(Clone)]
pub struct ClusterCollaborators {
    pub probe: Arc<dyn NodeProbe>,
    pub time_exchange: Arc<dyn TimeExchange>,
    pub transport: Arc<dyn BroadcastTransport>,
    pub arousal: Arc<dyn ArousalSource>,
}

impl ClusterCollaborators {
    /// In-process stand-ins, seeded from `fabric.seed`.
    pub fn simulated(config: &Config) -> Self {
        let seed = config.fabric.seed;
        Self {
            probe: Arc::new(SimulatedProbe::new(0.0, seed)),
            time_exchange: Arc::new(SimulatedTimeExchange::new(seed)),
            transport: Arc::new(LocalTransport::new(0.0, seed)),
            arousal: Arc::new(FixedArousal(config.coordinator.initial_arousal)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Running,
    Stopping,
    Stopped,
}

/// Aggregate health returned by [`IgnitionCluster::metrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub status: ClusterStatus,
    pub fabric: FabricMetrics,
    pub topology: TopologyCompliance,
    pub clock: ClockMetrics,
    pub coordinator: CoordinatorMetrics,
    /// Most recent coherence sample, if any ignition has run.
    pub coherence: Option<CoherenceSample>,
}

pub struct IgnitionCluster {
    config: Config,
    fabric: Arc<TopologyFabric>,
    clock: Arc<ClockSyncService>,
    context: Arc<IgnitionContext>,
    coordinator: Arc<IgnitionCoordinator>,
    health: HealthMonitor,
    clock_task: ClockSyncTask,
    control: ControlLoop,
    status: RwLock<ClusterStatus>,
}

impl IgnitionCluster {
    /// Validate `config`, build every component and start the background
    /// tasks.
    ///
    /// # Errors
    ///
    /// `ConfigError` for an invalid configuration, `TopologyConstruction`
    /// when the fabric cannot meet its structural goals.
    pub async fn start(config: Config, collaborators: ClusterCollaborators) -> CoreResult<Self> {
        config.validate()?;

        let fabric = Arc::new(TopologyFabric::initialize(&config.fabric)?);
        let clock = Arc::new(ClockSyncService::new(
            config.clock.clone(),
            collaborators.time_exchange,
        ));
        clock.register_hierarchy(&fabric.node_ids())?;

        let c = &config.coordinator;
        let context = Arc::new(IgnitionContext::new(
            c.history_capacity,
            c.coherence_capacity,
            c.event_channel_capacity,
        ));
        let coordinator = Arc::new(IgnitionCoordinator::new(
            &config,
            Arc::clone(&fabric),
            Arc::clone(&clock),
            collaborators.transport,
            Arc::clone(&context),
        ));

        let mut health = HealthMonitor::new(Arc::clone(&fabric), collaborators.probe);
        let mut clock_task = ClockSyncTask::new(Arc::clone(&clock));
        let mut control = ControlLoop::new(
            Arc::clone(&coordinator),
            collaborators.arousal,
            config.runtime.clone(),
        );
        health.start()?;
        clock_task.start()?;
        control.start()?;

        let metrics = fabric.metrics();
        info!(
            nodes = metrics.structure.node_count,
            edges = metrics.structure.edge_count,
            density = metrics.structure.density,
            clustering = metrics.structure.clustering_coefficient,
            "Ignition cluster started"
        );

        Ok(Self {
            config,
            fabric,
            clock,
            context,
            coordinator,
            health,
            clock_task,
            control,
            status: RwLock::new(ClusterStatus::Running),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fabric(&self) -> &Arc<TopologyFabric> {
        &self.fabric
    }

    pub fn clock(&self) -> &Arc<ClockSyncService> {
        &self.clock
    }

    pub fn coordinator(&self) -> &Arc<IgnitionCoordinator> {
        &self.coordinator
    }

    pub fn status(&self) -> ClusterStatus {
        *self.status.read()
    }

    /// Wait up to `rounds` sync intervals for the background clock task to
    /// bring every clock into readiness.
    pub async fn warm_up(&self, rounds: usize) -> ClockMetrics {
        let interval = Duration::from_millis(self.config.clock.sync_interval_ms);
        for _ in 0..rounds {
            if self.clock.is_ready() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
        let metrics = self.clock.metrics();
        if !self.clock.is_ready() {
            warn!(ready = metrics.ready, registered = metrics.registered, "Clocks not ready after warm-up");
        }
        metrics
    }

    /// Queue a trigger on the control loop and wait for its outcome.
    pub async fn submit(&self, input: SalienceInput) -> CoreResult<TriggerOutcome> {
        self.ensure_running()?;
        self.control.submit(input).await
    }

    /// Manual trigger, bypassing the control loop queue.
    pub async fn trigger(&self, input: SalienceInput) -> CoreResult<TriggerOutcome> {
        self.ensure_running()?;
        self.coordinator.initiate(input).await
    }

    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.coordinator.cancel(reason)
    }

    pub fn subscribe(&self) -> CoreResult<EventSubscription> {
        self.coordinator.subscribe()
    }

    pub fn history(&self) -> Vec<IgnitionEvent> {
        self.coordinator.history()
    }

    /// Score a finalized event against the configured criteria using the
    /// coherence samples still retained for it.
    pub fn score_event(&self, event: &IgnitionEvent) -> EventCompliance {
        let samples = self.context.samples_for(event.id);
        score_event(event, &samples, &self.config.validation.event)
    }

    pub fn metrics(&self) -> ClusterMetrics {
        let fabric = self.fabric.metrics();
        ClusterMetrics {
            status: self.status(),
            topology: score_topology(&fabric.structure, &self.config.validation.topology),
            fabric,
            clock: self.clock.metrics(),
            coordinator: self.coordinator.metrics(),
            coherence: self.context.recent_samples().pop(),
        }
    }

    fn ensure_running(&self) -> CoreResult<()> {
        if self.status() != ClusterStatus::Running {
            return Err(CoreError::NotRunning {
                component: "ignition cluster",
            });
        }
        Ok(())
    }

    /// Stop every background task and close the context. An in-flight
    /// ignition is cancelled first. Every task is asked to stop even when
    /// an earlier one fails; the first error is returned.
    pub async fn shutdown(mut self) -> CoreResult<()> {
        *self.status.write() = ClusterStatus::Stopping;
        self.coordinator.cancel("cluster shutdown");

        let mut first_error = None;
        for result in [
            self.control.stop().await,
            self.health.stop().await,
            self.clock_task.stop().await,
        ] {
            if let Err(e) = result {
                warn!(error = %e, "Component failed to stop cleanly");
                first_error.get_or_insert(e);
            }
        }
        self.context.close();
        *self.status.write() = ClusterStatus::Stopped;
        info!("Ignition cluster stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
