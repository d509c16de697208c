//! The ignition coordinator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ignition_phase::PhaseConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::{EventSubscription, IgnitionContext};
use super::event::{BroadcastSummary, IgnitionEvent, TriggerOutcome};
use super::limiter::{FrequencyLimiter, RefractoryTimer};
use super::state::{FailureReason, IgnitionPhase};
use super::transport::BroadcastTransport;
use crate::clock::ClockSyncService;
use crate::config::{Config, CoordinatorConfig};
use crate::error::{CoreError, CoreResult};
use crate::fabric::{NodeId, TopologyFabric};
use crate::salience::{AdmissionDecision, RejectionReason, SalienceGate, SalienceInput, SalienceScore};
use crate::sync::{CoherenceSample, PhaseSyncEngine};

/// Ticks between cooperative yields while synchronizing.
const SYNC_YIELD_TICKS: u64 = 10;

/// Counters and live state of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorMetrics {
    pub active: bool,
    pub current_event: Option<Uuid>,
    pub current_phase: Option<IgnitionPhase>,
    pub arousal: f64,
    pub refractory_boost: f64,
    pub tokens_available: f64,
    pub triggers: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub rejections: BTreeMap<String, u64>,
    pub failures: BTreeMap<String, u64>,
    pub last_event: Option<Uuid>,
}

#[derive(Debug, Default)]
struct Counters {
    triggers: u64,
    rejected: u64,
    completed: u64,
    failed: u64,
    rejections: BTreeMap<String, u64>,
    failures: BTreeMap<String, u64>,
    last_event: Option<Uuid>,
}

/// Clears the in-progress flag however `initiate` exits.
struct ActiveGuard<'a> {
    coordinator: &'a IgnitionCoordinator,
    nodes: Vec<NodeId>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if !self.nodes.is_empty() {
            if let Err(e) = self.coordinator.fabric.exit_ignition_mode(&self.nodes) {
                error!(error = %e, "Failed to release ignition mode");
            }
        }
        *self.coordinator.current.lock() = None;
        // A cancel never outlives the ignition it was aimed at.
        let mut reason = self.coordinator.cancel_reason.lock();
        *reason = None;
        self.coordinator.cancel_requested.store(false, Ordering::SeqCst);
        self.coordinator.active.store(false, Ordering::SeqCst);
    }
}

/// Sequences admitted triggers through the ignition state machine.
///
/// Owns the frequency limiter and refractory timer. At most one ignition
/// is in flight; concurrent triggers are rejected with
/// `IGNITION_IN_PROGRESS`.
pub struct IgnitionCoordinator {
    config: CoordinatorConfig,
    phase_config: PhaseConfig,
    gate: SalienceGate,
    fabric: Arc<TopologyFabric>,
    clock: Arc<ClockSyncService>,
    transport: Arc<dyn BroadcastTransport>,
    context: Arc<IgnitionContext>,
    limiter: Mutex<FrequencyLimiter>,
    refractory: Mutex<RefractoryTimer>,
    /// f64 bits.
    arousal: AtomicU64,
    active: AtomicBool,
    current: Mutex<Option<(Uuid, IgnitionPhase)>>,
    cancel_requested: AtomicBool,
    cancel_reason: Mutex<Option<String>>,
    cancel_notify: Notify,
    counters: Mutex<Counters>,
}

impl std::fmt::Debug for IgnitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionCoordinator")
            .field("active", &self.is_active())
            .field("arousal", &self.arousal())
            .finish()
    }
}

impl IgnitionCoordinator {
    pub fn new(
        config: &Config,
        fabric: Arc<TopologyFabric>,
        clock: Arc<ClockSyncService>,
        transport: Arc<dyn BroadcastTransport>,
        context: Arc<IgnitionContext>,
    ) -> Self {
        let c = &config.coordinator;
        Self {
            config: c.clone(),
            phase_config: config.phase.clone(),
            gate: SalienceGate::new(config.salience.clone()),
            fabric,
            clock,
            transport,
            context,
            limiter: Mutex::new(FrequencyLimiter::new(c.max_events_per_second)),
            refractory: Mutex::new(RefractoryTimer::new(
                Duration::from_millis(c.absolute_refractory_ms),
                Duration::from_millis(c.relative_refractory_ms),
                c.refractory_boost,
            )),
            arousal: AtomicU64::new(c.initial_arousal.to_bits()),
            active: AtomicBool::new(false),
            current: Mutex::new(None),
            cancel_requested: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            cancel_notify: Notify::new(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn gate(&self) -> &SalienceGate {
        &self.gate
    }

    pub fn context(&self) -> &Arc<IgnitionContext> {
        &self.context
    }

    pub fn arousal(&self) -> f64 {
        f64::from_bits(self.arousal.load(Ordering::SeqCst))
    }

    /// Update the arousal level consumed by the gate.
    pub fn set_arousal(&self, level: f64) -> CoreResult<()> {
        if !level.is_finite() || !(0.0..=1.0).contains(&level) {
            return Err(CoreError::validation(
                "arousal_level",
                format!("must be in [0, 1], got {}", level),
            ));
        }
        self.arousal.store(level.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Kill switch. Forces the in-flight ignition to `Failed`; the limiter
    /// token it consumed is not refunded. Returns false when nothing is in
    /// flight.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut slot = self.cancel_reason.lock();
        if !self.is_active() {
            return false;
        }
        let reason = reason.into();
        warn!(reason = %reason, "Ignition cancellation requested");
        *slot = Some(reason);
        self.cancel_requested.store(true, Ordering::SeqCst);
        drop(slot);
        self.cancel_notify.notify_one();
        true
    }

    fn take_cancellation(&self) -> Option<FailureReason> {
        if !self.cancel_requested.load(Ordering::SeqCst) {
            return None;
        }
        let reason = self
            .cancel_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "kill switch".to_string());
        Some(FailureReason::Cancelled { reason })
    }

    pub fn subscribe(&self) -> CoreResult<EventSubscription> {
        self.context.subscribe()
    }

    pub fn history(&self) -> Vec<IgnitionEvent> {
        self.context.history()
    }

    pub fn recent_coherence(&self) -> Vec<CoherenceSample> {
        self.context.recent_samples()
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        let current = *self.current.lock();
        let counters = self.counters.lock();
        CoordinatorMetrics {
            active: self.is_active(),
            current_event: current.map(|(id, _)| id),
            current_phase: current.map(|(_, phase)| phase),
            arousal: self.arousal(),
            refractory_boost: self.refractory.lock().boost(),
            tokens_available: self.limiter.lock().available(),
            triggers: counters.triggers,
            rejected: counters.rejected,
            completed: counters.completed,
            failed: counters.failed,
            rejections: counters.rejections.clone(),
            failures: counters.failures.clone(),
            last_event: counters.last_event,
        }
    }

    /// Run one trigger through admission and, if admitted, the full
    /// ignition protocol.
    ///
    /// Rejections and failed ignitions are returned as values.
    ///
    /// # Errors
    ///
    /// `CoreError::ValidationError` for a malformed input. Collaborator
    /// errors after admission fail the event with `ABORTED` instead.
    pub async fn initiate(&self, input: SalienceInput) -> CoreResult<TriggerOutcome> {
        let score = self.gate.evaluate(&input)?;
        self.counters.lock().triggers += 1;

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(self.reject_with(score, RejectionReason::IgnitionInProgress));
        }
        let mut guard = ActiveGuard {
            coordinator: self,
            nodes: Vec::new(),
        };

        let remaining = self.refractory.lock().absolute_remaining();
        if let Some(remaining) = remaining {
            let reason = RejectionReason::Refractory {
                remaining_ms: remaining.as_millis() as u64,
            };
            return Ok(self.reject_with(score, reason));
        }

        let boost = self.refractory.lock().boost();
        let metrics = self.fabric.metrics();
        let eligible = self.fabric.eligible_nodes();
        let clock_ready = self.clock.is_ready_for_ignition(&eligible);
        let decision = self
            .gate
            .check_admission(&score, &metrics, clock_ready, self.arousal(), boost);
        if !decision.admitted {
            return Ok(self.reject(decision));
        }
        if !self.limiter.lock().try_acquire() {
            let decision = AdmissionDecision::rejected(
                score,
                decision.effective_threshold,
                RejectionReason::RateLimited,
            );
            return Ok(self.reject(decision));
        }

        let mut event = IgnitionEvent::new(&input, score);
        info!(
            event_id = %event.id,
            source = %event.source,
            salience = score.total,
            level = %score.level,
            "Ignition admitted"
        );

        let mut samples = Vec::new();
        let mut engine = None;
        let outcome = self
            .run_protocol(&mut event, &mut guard, &mut engine, &mut samples)
            .await;
        let failure = match outcome {
            Ok(failure) => failure,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Ignition aborted by collaborator error");
                Some(FailureReason::Aborted {
                    message: e.to_string(),
                })
            }
        };

        Ok(self.finish(event, failure, engine, &samples))
    }

    fn reject_with(&self, score: SalienceScore, reason: RejectionReason) -> TriggerOutcome {
        let threshold = self
            .gate
            .effective_threshold(self.arousal(), self.refractory.lock().boost());
        self.reject(AdmissionDecision::rejected(score, threshold, reason))
    }

    fn reject(&self, decision: AdmissionDecision) -> TriggerOutcome {
        let mut counters = self.counters.lock();
        counters.rejected += 1;
        for code in decision.codes() {
            *counters.rejections.entry(code.to_string()).or_default() += 1;
        }
        debug!(codes = ?decision.codes(), "Trigger rejected");
        TriggerOutcome::Rejected(decision)
    }

    fn advance(&self, event: &mut IgnitionEvent, to: IgnitionPhase) -> CoreResult<()> {
        event.transition(to)?;
        *self.current.lock() = Some((event.id, to));
        debug!(event_id = %event.id, phase = %to, "Ignition phase");
        Ok(())
    }

    fn record(&self, engine: &PhaseSyncEngine, event: &IgnitionEvent, samples: &mut Vec<CoherenceSample>) {
        let sample = engine.sample(event.id, event.phase);
        self.context.record_sample(sample.clone());
        samples.push(sample);
    }

    /// Drive the event from Idle to Dissolve. `Ok(None)` means ready to
    /// complete, `Ok(Some(reason))` means the protocol failed.
    async fn run_protocol(
        &self,
        event: &mut IgnitionEvent,
        guard: &mut ActiveGuard<'_>,
        engine_slot: &mut Option<PhaseSyncEngine>,
        samples: &mut Vec<CoherenceSample>,
    ) -> CoreResult<Option<FailureReason>> {
        // ---- Prepare ----
        self.advance(event, IgnitionPhase::Prepare)?;
        let eligible = self.fabric.eligible_nodes();
        event.eligible_nodes = eligible.clone();
        if eligible.len() < self.config.min_nodes {
            return Ok(Some(FailureReason::InsufficientNodes {
                eligible: eligible.len(),
                required: self.config.min_nodes,
            }));
        }

        // ---- Synchronize ----
        self.advance(event, IgnitionPhase::Synchronize)?;
        self.fabric.enter_ignition_mode(&eligible)?;
        guard.nodes = eligible.clone();
        let engine = engine_slot.insert(PhaseSyncEngine::from_fabric(
            &self.fabric,
            &eligible,
            &self.phase_config,
        )?);

        let started = Instant::now();
        let tick_ms = self.phase_config.tick_ms.max(1);
        let max_ticks = self.config.sync_timeout_ms.div_ceil(tick_ms);
        let check_every = self.config.health_check_ticks.max(1);
        self.record(engine, event, samples);

        while !engine.is_ignited() {
            if let Some(reason) = self.take_cancellation() {
                return Ok(Some(reason));
            }
            if engine.ticks() >= max_ticks {
                return Ok(Some(FailureReason::SyncTimeout {
                    final_r: engine.order_parameter().r,
                    elapsed_ms: engine.oscillator_time_ms(),
                }));
            }

            engine.tick();
            let ticks = engine.ticks();
            if ticks % check_every == 0 {
                self.record(engine, event, samples);
                if !self.clock.is_ready_for_ignition(engine.nodes()) {
                    return Ok(Some(FailureReason::ClockReadinessLost));
                }
                let dropped = engine.retain_usable(&self.fabric)?;
                if !dropped.is_empty() {
                    warn!(
                        event_id = %event.id,
                        dropped = dropped.len(),
                        remaining = engine.len(),
                        "Participants lost during synchronization"
                    );
                    self.fabric.exit_ignition_mode(&dropped)?;
                    if engine.len() < self.config.min_nodes {
                        return Ok(Some(FailureReason::NodesExhausted {
                            remaining: engine.len(),
                            required: self.config.min_nodes,
                        }));
                    }
                }
            }
            if ticks % SYNC_YIELD_TICKS == 0 {
                tokio::task::yield_now().await;
            }
        }

        event.coherence.time_to_ignition_ms =
            Some(started.elapsed().as_secs_f64() * 1000.0);
        event.coherence.sync_ticks = engine.ticks();
        event.coherence.sync_time_ms = engine.oscillator_time_ms();
        info!(
            event_id = %event.id,
            r = engine.order_parameter().r,
            ticks = engine.ticks(),
            participants = engine.len(),
            "Coherence reached"
        );

        // ---- Broadcast ----
        self.advance(event, IgnitionPhase::Broadcast)?;
        self.record(engine, event, samples);
        let summary = self.broadcast(engine.nodes(), &event.content).await?;
        let delivered: Vec<NodeId> = engine
            .nodes()
            .iter()
            .copied()
            .filter(|id| !summary.failed.contains(id) && !summary.skipped.contains(id))
            .collect();
        event.participating_nodes = delivered;
        event.broadcast = Some(summary);
        if event.participating_nodes.len() < self.config.min_nodes {
            return Ok(Some(FailureReason::NodesExhausted {
                remaining: event.participating_nodes.len(),
                required: self.config.min_nodes,
            }));
        }

        // ---- Sustain ----
        self.advance(event, IgnitionPhase::Sustain)?;
        let sustain_started = Instant::now();
        if let Some(reason) = self
            .hold(engine, event, samples, self.config.sustain_ms)
            .await
        {
            return Ok(Some(reason));
        }
        event.sustain_duration_ms = sustain_started.elapsed().as_secs_f64() * 1000.0;

        // ---- Dissolve ----
        self.advance(event, IgnitionPhase::Dissolve)?;
        engine.release(self.config.dissolve_coupling_factor);
        if let Some(reason) = self
            .hold(engine, event, samples, self.config.dissolve_ms)
            .await
        {
            return Ok(Some(reason));
        }

        Ok(None)
    }

    async fn broadcast(
        &self,
        nodes: &[NodeId],
        content: &serde_json::Value,
    ) -> CoreResult<BroadcastSummary> {
        let mut summary = BroadcastSummary::default();
        for &node in nodes {
            if !self.fabric.try_acquire_probe(node)? {
                summary.skipped.push(node);
                continue;
            }
            match self.transport.deliver(node, content).await {
                Ok(()) => {
                    self.fabric.report_outcome(node, true)?;
                    summary.delivered += 1;
                }
                Err(e) => {
                    debug!(node = %node, error = %e, "Broadcast delivery failed");
                    self.fabric.report_outcome(node, false)?;
                    summary.failed.push(node);
                }
            }
        }
        Ok(summary)
    }

    /// Keep ticking the engine in real time for `duration_ms`, sampling
    /// every tick. Returns a failure only on cancellation.
    async fn hold(
        &self,
        engine: &mut PhaseSyncEngine,
        event: &IgnitionEvent,
        samples: &mut Vec<CoherenceSample>,
        duration_ms: u64,
    ) -> Option<FailureReason> {
        if let Some(reason) = self.take_cancellation() {
            return Some(reason);
        }
        if duration_ms == 0 {
            return None;
        }
        let deadline = Instant::now() + Duration::from_millis(duration_ms);
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.phase_config.tick_ms.max(1)));
        // The first tick completes immediately.
        interval.tick().await;

        while Instant::now() < deadline {
            tokio::select! {
                biased;

                _ = self.cancel_notify.notified() => {
                    if let Some(reason) = self.take_cancellation() {
                        return Some(reason);
                    }
                }

                _ = interval.tick() => {
                    engine.tick();
                    self.record(engine, event, samples);
                }
            }
        }
        self.take_cancellation()
    }

    fn finish(
        &self,
        mut event: IgnitionEvent,
        failure: Option<FailureReason>,
        engine: Option<PhaseSyncEngine>,
        samples: &[CoherenceSample],
    ) -> TriggerOutcome {
        if let Some(engine) = &engine {
            event.coherence.final_r = engine.order_parameter().r;
            if let Err(e) = self.fabric.record_phases(&engine.phases()) {
                error!(event_id = %event.id, error = %e, "Failed to commit phases");
            }
        }
        event.coherence.peak_r = samples.iter().map(|s| s.r).fold(0.0, f64::max);
        let held: Vec<f64> = samples
            .iter()
            .filter(|s| matches!(s.phase, IgnitionPhase::Broadcast | IgnitionPhase::Sustain))
            .map(|s| s.r)
            .collect();
        if !held.is_empty() {
            event.coherence.mean_r = held.iter().sum::<f64>() / held.len() as f64;
        }

        let finalized = match failure.clone() {
            None => event.complete(),
            Some(reason) => event.fail(reason),
        };
        if let Err(e) = finalized {
            // The protocol only ever finalizes here, so this is a bug.
            error!(event_id = %event.id, error = %e, "Event finalization rejected");
        }

        self.refractory.lock().start();
        let event = self.context.publish(event);

        let mut counters = self.counters.lock();
        counters.last_event = Some(event.id);
        match &failure {
            None => {
                counters.completed += 1;
                info!(
                    event_id = %event.id,
                    sequence = event.sequence,
                    participants = event.participating_nodes.len(),
                    peak_r = event.coherence.peak_r,
                    mean_r = event.coherence.mean_r,
                    "Ignition complete"
                );
                TriggerOutcome::Completed(event)
            }
            Some(reason) => {
                counters.failed += 1;
                *counters.failures.entry(reason.code().to_string()).or_default() += 1;
                if reason.is_fatal() {
                    error!(event_id = %event.id, code = reason.code(), reason = %reason, "Ignition failed");
                } else {
                    warn!(event_id = %event.id, code = reason.code(), reason = %reason, "Ignition failed");
                }
                TriggerOutcome::Failed(event)
            }
        }
    }
}
