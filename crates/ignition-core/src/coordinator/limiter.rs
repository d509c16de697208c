//! Token-bucket frequency limiter and refractory timer.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket holding at most `rate` tokens, refilled continuously at
/// `rate` tokens per second.
#[derive(Debug, Clone)]
pub struct FrequencyLimiter {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl FrequencyLimiter {
    pub fn new(max_events_per_second: u32) -> Self {
        let capacity = f64::from(max_events_per_second.max(1));
        Self {
            capacity,
            refill_per_sec: capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token if available. A taken token is never refunded.
    pub fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available now.
    pub fn available(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

/// Post-ignition refractory state.
///
/// For `absolute` after an event ends new triggers are refused outright.
/// During the following `relative` window the salience threshold carries a
/// boost that decays linearly from `boost` to zero.
#[derive(Debug, Clone)]
pub struct RefractoryTimer {
    absolute: Duration,
    relative: Duration,
    boost: f64,
    last_end: Option<Instant>,
}

impl RefractoryTimer {
    pub fn new(absolute: Duration, relative: Duration, boost: f64) -> Self {
        Self {
            absolute,
            relative,
            boost,
            last_end: None,
        }
    }

    /// Start the refractory period now.
    pub fn start(&mut self) {
        self.last_end = Some(Instant::now());
    }

    /// Remaining absolute refractory time, if inside the absolute period.
    pub fn absolute_remaining(&self) -> Option<Duration> {
        let since = Instant::now().saturating_duration_since(self.last_end?);
        (since < self.absolute).then(|| self.absolute - since)
    }

    /// Threshold boost at this instant.
    pub fn boost(&self) -> f64 {
        let Some(end) = self.last_end else {
            return 0.0;
        };
        let since = Instant::now().saturating_duration_since(end);
        if since < self.absolute {
            return self.boost;
        }
        let into_relative = since - self.absolute;
        if into_relative >= self.relative || self.relative.is_zero() {
            return 0.0;
        }
        self.boost * (1.0 - into_relative.as_secs_f64() / self.relative.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_admits_exactly_capacity_per_second() {
        println!("\n=== TEST: frequency limiter admits max_events_per_second ===");
        let mut limiter = FrequencyLimiter::new(10);
        let admitted = (0..25).filter(|_| limiter.try_acquire()).count();
        assert_eq!(admitted, 10);

        // Half a second refills half the bucket.
        tokio::time::advance(Duration::from_millis(500)).await;
        let admitted = (0..25).filter(|_| limiter.try_acquire()).count();
        assert_eq!(admitted, 5);

        // Long idle never exceeds capacity.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((limiter.available() - 10.0).abs() < 1e-9);
        println!("EVIDENCE: bucket capped at 10 tokens with continuous refill");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refractory_windows() {
        let mut timer = RefractoryTimer::new(
            Duration::from_millis(200),
            Duration::from_millis(500),
            0.15,
        );
        assert!(timer.absolute_remaining().is_none());
        assert_eq!(timer.boost(), 0.0);

        timer.start();
        assert_eq!(timer.absolute_remaining(), Some(Duration::from_millis(200)));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(timer.absolute_remaining().is_none());
        assert!((timer.boost() - 0.15).abs() < 1e-12);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((timer.boost() - 0.075).abs() < 1e-9);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(timer.boost(), 0.0);
    }
}
