//! Background clock synchronization on a fixed cadence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

use super::ClockSyncService;
use crate::error::{CoreError, CoreResult};

const COMPONENT: &str = "clock sync task";
const JOIN_TIMEOUT_MS: u64 = 5000;

/// Runs `synchronize_all` every `sync_interval_ms`, independent of any
/// ignition in progress.
pub struct ClockSyncTask {
    service: Arc<ClockSyncService>,
    shutdown_notify: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
}

impl ClockSyncTask {
    pub fn new(service: Arc<ClockSyncService>) -> Self {
        Self {
            service,
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

        let service = Arc::clone(&self.service);
        let shutdown = Arc::clone(&self.shutdown_notify);
        let is_running = Arc::clone(&self.is_running);
        let interval_ms = service.config().sync_interval_ms.max(1);

        self.task_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            let mut rounds: u64 = 0;
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.notified() => {
                        is_running.store(false, Ordering::SeqCst);
                        break;
                    }

                    _ = interval.tick() => {
                        let round = service.synchronize_all().await;
                        rounds += 1;
                        trace!(
                            round = rounds,
                            synchronized = round.synchronized,
                            failed = round.failed.len(),
                            "Clock sync round"
                        );
                    }
                }
            }
            info!(rounds, "Clock sync loop stopped");
        }));

        info!(interval_ms, "Clock sync task started");
        Ok(())
    }

    pub async fn stop(&mut self) -> CoreResult<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(CoreError::NotRunning {
                component: COMPONENT,
            });
        }
        self.shutdown_notify.notify_one();

        let Some(handle) = self.task_handle.take() else {
            self.is_running.store(false, Ordering::SeqCst);
            return Ok(());
        };
        match tokio::time::timeout(Duration::from_millis(JOIN_TIMEOUT_MS), handle).await {
            Ok(joined) => {
                if let Err(e) = joined {
                    error!(error = ?e, "Clock sync task panicked");
                }
                self.is_running.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(_) => Err(CoreError::ShutdownTimeout {
                component: COMPONENT,
                timeout_ms: JOIN_TIMEOUT_MS,
            }),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedTimeExchange;
    use crate::config::ClockConfig;
    use crate::fabric::NodeId;

    #[tokio::test(start_paused = true)]
    async fn test_background_sync_converges() {
        println!("\n=== TEST: clock sync task drives readiness ===");
        let service = Arc::new(ClockSyncService::new(
            ClockConfig::default(),
            Arc::new(SimulatedTimeExchange::new(Some(21))),
        ));
        let nodes: Vec<NodeId> = (0..6).map(NodeId).collect();
        service.register_hierarchy(&nodes).unwrap();

        let mut task = ClockSyncTask::new(Arc::clone(&service));
        task.start().unwrap();
        assert!(task.is_running());

        // 50 rounds at the default 100 ms cadence.
        tokio::time::sleep(Duration::from_millis(5_000)).await;
        println!("METRICS: {:?}", service.metrics());
        assert!(service.is_ready_for_ignition(&nodes));

        task.stop().await.unwrap();
        assert!(!task.is_running());
        assert!(matches!(task.stop().await, Err(CoreError::NotRunning { .. })));
        println!("EVIDENCE: background task synchronized all clocks");
    }
}
