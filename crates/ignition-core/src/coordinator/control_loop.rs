//! Fixed-cadence control loop in front of the coordinator.
//!
//! Triggers are queued on a bounded channel and dispatched one at a time on
//! each control tick, after the arousal source has been sampled. Callers
//! await the outcome through a oneshot reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event::TriggerOutcome;
use super::ignition::IgnitionCoordinator;
use crate::config::RuntimeConfig;
use crate::error::{CoreError, CoreResult};
use crate::salience::SalienceInput;

const COMPONENT: &str = "control loop";

/// Supplies the arousal level sampled every control tick.
pub trait ArousalSource: Send + Sync {
    fn arousal_level(&self) -> f64;
}

/// Constant arousal.
#[derive(Debug, Clone, Copy)]
pub struct FixedArousal(pub f64);

impl ArousalSource for FixedArousal {
    fn arousal_level(&self) -> f64 {
        self.0
    }
}

struct Submission {
    input: SalienceInput,
    reply: oneshot::Sender<CoreResult<TriggerOutcome>>,
}

pub struct ControlLoop {
    coordinator: Arc<IgnitionCoordinator>,
    arousal: Arc<dyn ArousalSource>,
    config: RuntimeConfig,
    sender: Option<mpsc::Sender<Submission>>,
    shutdown_notify: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
}

impl ControlLoop {
    pub fn new(
        coordinator: Arc<IgnitionCoordinator>,
        arousal: Arc<dyn ArousalSource>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            coordinator,
            arousal,
            config,
            sender: None,
            shutdown_notify: Arc::new(Notify::new()),
            task_handle: None,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&mut self) -> CoreResult<()> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(CoreError::AlreadyRunning {
                component: COMPONENT,
            });
        }
        self.is_running.store(true, Ordering::SeqCst);
        self.shutdown_notify = Arc::new(Notify::new());

        let (tx, mut rx) = mpsc::channel::<Submission>(self.config.submission_queue.max(1));
        self.sender = Some(tx);

        let coordinator = Arc::clone(&self.coordinator);
        let arousal = Arc::clone(&self.arousal);
        let shutdown = Arc::clone(&self.shutdown_notify);
        let is_running = Arc::clone(&self.is_running);
        let interval_ms = self.config.control_interval_ms.max(1);

        self.task_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut dispatched: u64 = 0;

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        is_running.store(false, Ordering::SeqCst);
                        break;
                    }

                    _ = interval.tick() => {
                        let level = arousal.arousal_level();
                        if let Err(e) = coordinator.set_arousal(level) {
                            warn!(error = %e, "Ignoring arousal sample");
                        }

                        if let Ok(submission) = rx.try_recv() {
                            let outcome = coordinator.initiate(submission.input).await;
                            dispatched += 1;
                            if submission.reply.send(outcome).is_err() {
                                debug!("Trigger submitter went away before the outcome");
                            }
                        }
                    }
                }
            }

            // Fail whatever is still queued.
            rx.close();
            while let Ok(submission) = rx.try_recv() {
                let _ = submission.reply.send(Err(CoreError::NotRunning {
                    component: COMPONENT,
                }));
            }
            info!(dispatched, "Control loop stopped");
        }));

        info!(interval_ms, "Control loop started");
        Ok(())
    }

    /// Queue a trigger and wait for its outcome.
    ///
    /// # Errors
    ///
    /// `NotRunning` when the loop is stopped, `ValidationError` when the
    /// submission queue is full, plus anything `initiate` returns.
    pub async fn submit(&self, input: SalienceInput) -> CoreResult<TriggerOutcome> {
        let Some(sender) = self.sender.as_ref().filter(|_| self.is_running()) else {
            return Err(CoreError::NotRunning {
                component: COMPONENT,
            });
        };
        let (reply, rx) = oneshot::channel();
        sender
            .try_send(Submission { input, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => CoreError::validation(
                    "submission_queue",
                    format!("full ({} pending)", self.config.submission_queue),
                ),
                mpsc::error::TrySendError::Closed(_) => CoreError::NotRunning {
                    component: COMPONENT,
                },
            })?;
        rx.await.map_err(|_| CoreError::NotRunning {
            component: COMPONENT,
        })?
    }

    pub async fn stop(&mut self) -> CoreResult<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(CoreError::NotRunning {
                component: COMPONENT,
            });
        }
        self.sender = None;
        self.shutdown_notify.notify_one();

        if let Some(handle) = self.task_handle.take() {
            let timeout_ms = self.config.shutdown_timeout_ms;
            match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "Control loop task panicked");
                }
                Err(_) => {
                    self.is_running.store(false, Ordering::SeqCst);
                    return Err(CoreError::ShutdownTimeout {
                        component: COMPONENT,
                        timeout_ms,
                    });
                }
            }
        }
        self.is_running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if self.is_running.load(Ordering::SeqCst) {
            self.shutdown_notify.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockSyncService, SimulatedTimeExchange};
    use crate::config::Config;
    use crate::coordinator::{IgnitionContext, LocalTransport};
    use crate::fabric::TopologyFabric;

    async fn coordinator() -> Arc<IgnitionCoordinator> {
        let mut config = Config::default();
        config.fabric.node_count = 12;
        config.fabric.target_density = 1.0;
        config.fabric.min_degree = 3;
        config.fabric.seed = Some(11);
        config.salience.min_healthy_nodes = 8;
        config.coordinator.sustain_ms = 20;
        config.coordinator.dissolve_ms = 10;
        config.phase.seed = Some(11);

        let fabric = Arc::new(TopologyFabric::initialize(&config.fabric).unwrap());
        let clock = Arc::new(ClockSyncService::new(
            config.clock.clone(),
            Arc::new(SimulatedTimeExchange::new(Some(11))),
        ));
        clock.register_hierarchy(&fabric.node_ids()).unwrap();
        for _ in 0..40 {
            clock.synchronize_all().await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        let context = Arc::new(IgnitionContext::new(16, 64, 8));
        Arc::new(IgnitionCoordinator::new(
            &config,
            fabric,
            clock,
            Arc::new(LocalTransport::reliable()),
            context,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_dispatches_and_applies_arousal() {
        println!("\n=== TEST: control loop dispatches a queued trigger ===");
        let coordinator = coordinator().await;
        let mut control = ControlLoop::new(
            Arc::clone(&coordinator),
            Arc::new(FixedArousal(0.9)),
            RuntimeConfig::default(),
        );
        control.start().unwrap();

        let outcome = control
            .submit(SalienceInput::new(0.9, 0.9, 0.9))
            .await
            .unwrap();
        assert!(outcome.event().is_some(), "admitted: {}", outcome.code());
        assert!((coordinator.arousal() - 0.9).abs() < 1e-12);
        println!("EVIDENCE: outcome {}", outcome.code());

        control.stop().await.unwrap();
        assert!(!control.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_when_stopped_fails() {
        let coordinator = coordinator().await;
        let control = ControlLoop::new(coordinator, Arc::new(FixedArousal(0.5)), RuntimeConfig::default());
        let err = control
            .submit(SalienceInput::new(0.9, 0.9, 0.9))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotRunning { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_errors() {
        let coordinator = coordinator().await;
        let mut control = ControlLoop::new(coordinator, Arc::new(FixedArousal(0.5)), RuntimeConfig::default());
        assert!(matches!(
            control.stop().await,
            Err(CoreError::NotRunning { .. })
        ));
        control.start().unwrap();
        assert!(matches!(
            control.start(),
            Err(CoreError::AlreadyRunning { .. })
        ));
        control.stop().await.unwrap();
    }
}
