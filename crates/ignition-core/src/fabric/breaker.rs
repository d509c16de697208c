//! Per-node circuit breaker.
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────▶ Open
//!     ▲                                │ recovery timeout elapsed
//!     │ probe succeeded                ▼
//!     └────────────────────────── HalfOpen ──▶ Open (probe failed)
//! ```
//!
//! HalfOpen admits exactly one in-flight probe. All methods take the current
//! instant explicitly so callers (and tests) control time.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Closed and HalfOpen nodes may take part in ignition.
    #[inline]
    pub fn is_usable(self) -> bool {
        !matches!(self, BreakerState::Open)
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            opened_at: None,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            probe_in_flight: false,
        }
    }

    #[inline]
    pub fn state(&self) -> BreakerState {
        self.state
    }

    #[inline]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[inline]
    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Apply the Open → HalfOpen transition if the recovery timeout elapsed.
    pub fn refresh(&mut self, now: Instant) -> BreakerState {
        if self.state == BreakerState::Open {
            if let Some(opened_at) = self.opened_at {
                if now.saturating_duration_since(opened_at) >= self.recovery_timeout {
                    self.state = BreakerState::HalfOpen;
                    self.probe_in_flight = false;
                }
            }
        }
        self.state
    }

    /// Whether a request may be dispatched now. In HalfOpen the first caller
    /// gets the probe slot and every other caller is refused until the probe
    /// outcome is recorded.
    pub fn allow_request(&mut self, now: Instant) -> bool {
        match self.refresh(now) {
            BreakerState::Closed => true,
            BreakerState::Open => false,
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    false
                } else {
                    self.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.probe_in_flight = false;
        self.opened_at = None;
        self.state = BreakerState::Closed;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.failure_count = self.failure_count.saturating_add(1);
        match self.state {
            BreakerState::Closed => {
                if self.failure_count >= self.failure_threshold {
                    self.trip(now);
                }
            }
            BreakerState::HalfOpen => self.trip(now),
            // Late outcomes from requests dispatched before the trip.
            BreakerState::Open => {}
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = BreakerState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(30))
    }

    #[test]
    fn test_opens_at_threshold() {
        let mut b = breaker();
        let t0 = Instant::now();
        b.record_failure(t0);
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow_request(t0 + Duration::from_secs(29)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut b = breaker();
        let t0 = Instant::now();
        b.record_failure(t0);
        b.record_failure(t0);
        b.record_success();
        b.record_failure(t0);
        b.record_failure(t0);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let later = t0 + Duration::from_secs(30);
        assert!(b.allow_request(later));
        assert_eq!(b.state(), BreakerState::HalfOpen);
        assert!(!b.allow_request(later));
        assert!(!b.allow_request(later + Duration::from_secs(1)));

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow_request(later));
    }

    #[test]
    fn test_failed_probe_reopens() {
        let mut b = breaker();
        let t0 = Instant::now();
        for _ in 0..3 {
            b.record_failure(t0);
        }
        let probe_at = t0 + Duration::from_secs(31);
        assert!(b.allow_request(probe_at));
        b.record_failure(probe_at);
        assert_eq!(b.state(), BreakerState::Open);
        // Recovery is measured from the reopen, not the first trip.
        assert!(!b.allow_request(probe_at + Duration::from_secs(29)));
        assert!(b.allow_request(probe_at + Duration::from_secs(30)));
    }
}
