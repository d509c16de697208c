//! Shared ignition context.
//!
//! Owns the state that outlives a single ignition: the bounded event
//! history, the bounded coherence sample ring, the publication sequence and
//! the broadcast channel feeding subscribers. Created when the cluster
//! starts and closed at shutdown; closing ends every subscription once it
//! has drained.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::IgnitionEvent;
use crate::error::{CoreError, CoreResult};
use crate::sync::CoherenceSample;

struct History {
    events: VecDeque<IgnitionEvent>,
    next_sequence: u64,
}

pub struct IgnitionContext {
    history: Mutex<History>,
    history_capacity: usize,
    samples: Mutex<VecDeque<CoherenceSample>>,
    sample_capacity: usize,
    sender: Mutex<Option<broadcast::Sender<IgnitionEvent>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for IgnitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnitionContext")
            .field("history_capacity", &self.history_capacity)
            .field("sample_capacity", &self.sample_capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl IgnitionContext {
    pub fn new(history_capacity: usize, sample_capacity: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            history: Mutex::new(History {
                events: VecDeque::with_capacity(history_capacity.min(1024)),
                next_sequence: 1,
            }),
            history_capacity: history_capacity.max(1),
            samples: Mutex::new(VecDeque::with_capacity(sample_capacity.min(1024))),
            sample_capacity: sample_capacity.max(1),
            sender: Mutex::new(Some(sender)),
            closed: AtomicBool::new(false),
        }
    }

    /// Assign the next sequence number, append to history and notify
    /// subscribers. Returns the event as published.
    pub fn publish(&self, mut event: IgnitionEvent) -> IgnitionEvent {
        let mut history = self.history.lock();
        event.sequence = history.next_sequence;
        history.next_sequence += 1;
        if history.events.len() == self.history_capacity {
            history.events.pop_front();
        }
        history.events.push_back(event.clone());

        // Sent under the history lock so channel order matches sequence order.
        if let Some(sender) = self.sender.lock().as_ref() {
            if sender.send(event.clone()).is_err() {
                debug!(sequence = event.sequence, "No subscribers for ignition event");
            }
        }
        event
    }

    pub fn record_sample(&self, sample: CoherenceSample) {
        let mut samples = self.samples.lock();
        if samples.len() == self.sample_capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Retained events, oldest first.
    pub fn history(&self) -> Vec<IgnitionEvent> {
        self.history.lock().events.iter().cloned().collect()
    }

    pub fn event(&self, id: Uuid) -> Option<IgnitionEvent> {
        self.history
            .lock()
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    /// Retained events with `sequence >= from`.
    fn events_since(&self, from: u64) -> Vec<IgnitionEvent> {
        self.history
            .lock()
            .events
            .iter()
            .filter(|e| e.sequence >= from)
            .cloned()
            .collect()
    }

    /// Retained coherence samples, oldest first.
    pub fn recent_samples(&self) -> Vec<CoherenceSample> {
        self.samples.lock().iter().cloned().collect()
    }

    /// Retained samples belonging to one event.
    pub fn samples_for(&self, event_id: Uuid) -> Vec<CoherenceSample> {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Subscribe to events published from now on.
    ///
    /// # Errors
    ///
    /// `CoreError::NotRunning` once the context is closed.
    pub fn subscribe(self: &Arc<Self>) -> CoreResult<EventSubscription> {
        let history = self.history.lock();
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(CoreError::NotRunning {
                component: "ignition context",
            });
        };
        Ok(EventSubscription {
            receiver: sender.subscribe(),
            context: Arc::clone(self),
            next_sequence: history.next_sequence,
            backlog: VecDeque::new(),
        })
    }

    /// Drop the sender. Subscribers drain what is buffered and then end.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.sender.lock().take();
            debug!("Ignition context closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Ordered stream of published events.
///
/// A subscriber that falls behind the channel buffer is refilled from the
/// history ring, so every event still retained is delivered at least once.
pub struct EventSubscription {
    receiver: broadcast::Receiver<IgnitionEvent>,
    context: Arc<IgnitionContext>,
    next_sequence: u64,
    backlog: VecDeque<IgnitionEvent>,
}

impl EventSubscription {
    /// Next event, or `None` once the context is closed and drained.
    pub async fn recv(&mut self) -> Option<IgnitionEvent> {
        loop {
            if let Some(event) = self.backlog.pop_front() {
                self.next_sequence = event.sequence + 1;
                return Some(event);
            }
            match self.receiver.recv().await {
                Ok(event) if event.sequence >= self.next_sequence => {
                    self.next_sequence = event.sequence + 1;
                    return Some(event);
                }
                // Already delivered through a backfill.
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    let missed = self.context.events_since(self.next_sequence);
                    warn!(
                        skipped,
                        backfilled = missed.len(),
                        "Event subscriber lagged, backfilling from history"
                    );
                    self.backlog.extend(missed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
