//! Per-connection inbound frame limiting
//!
//! Token bucket: the bucket holds up to `burst` tokens, refills at `rate`
//! tokens per second, and each inbound frame costs one token. Frames arriving
//! with an empty bucket are dropped; the connection stays open.

use std::time::Instant;

use crate::core::config::DEFAULT_WS_MESSAGES_PER_SECOND;

#[derive(Debug, Clone)]
pub struct FrameLimiter {
    burst: f64,
    tokens: f64,
    /// Tokens per second
    rate: f64,
    last_refill: Instant,
    /// Frames rejected since the last accepted frame
    rejected_streak: u32,
}

impl FrameLimiter {
    pub fn new(rate: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            burst,
            tokens: burst,
            rate: f64::from(rate.max(1)),
            last_refill: Instant::now(),
            rejected_streak: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// Take one token for a frame arriving now
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Take one token for a frame arriving at `now`
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.rejected_streak = 0;
            true
        } else {
            self.rejected_streak = self.rejected_streak.saturating_add(1);
            false
        }
    }

    /// Whether the last rejection was the first of a streak (worth logging once)
    pub fn first_rejection(&self) -> bool {
        self.rejected_streak == 1
    }
}

impl Default for FrameLimiter {
    fn default() -> Self {
        Self::new(
            DEFAULT_WS_MESSAGES_PER_SECOND,
            DEFAULT_WS_MESSAGES_PER_SECOND * 2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_burst_then_reject() {
        let mut limiter = FrameLimiter::new(20, 40);
        let now = Instant::now();

        for _ in 0..40 {
            assert!(limiter.try_acquire_at(now));
        }
        assert!(!limiter.try_acquire_at(now));
        assert!(limiter.first_rejection());
        assert!(!limiter.try_acquire_at(now));
        assert!(!limiter.first_rejection());
    }

    #[test]
    fn test_refills_over_time() {
        let mut limiter = FrameLimiter::new(20, 40);
        let start = Instant::now();
        for _ in 0..40 {
            limiter.try_acquire_at(start);
        }

        // 20 tokens per second: 100ms buys two frames
        let later = start + Duration::from_millis(100);
        assert!(limiter.try_acquire_at(later));
        assert!(limiter.try_acquire_at(later));
        assert!(!limiter.try_acquire_at(later));
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let mut limiter = FrameLimiter::new(20, 4);
        let start = Instant::now();
        let much_later = start + Duration::from_secs(60);

        for _ in 0..4 {
            assert!(limiter.try_acquire_at(much_later));
        }
        assert!(!limiter.try_acquire_at(much_later));
    }

    #[test]
    fn test_default_matches_config_defaults() {
        let mut limiter = FrameLimiter::default();
        let now = Instant::now();
        let accepted = (0..100).filter(|_| limiter.try_acquire_at(now)).count();
        assert_eq!(accepted, 40);
    }
}
