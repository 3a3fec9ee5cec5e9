//! Token bucket rate limiter.
//!
//! Tokens accrue at `refill_rate` per second up to `capacity`; each request
//! spends one. Block explorers meter per second, so the defaults match the
//! free Etherscan tier.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub capacity: f64,
    /// Tokens per second.
    pub refill_rate: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_rate: 5.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        // the bucket holds plain numbers, a poisoned lock is still usable
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.refill_rate).min(self.config.capacity);
        bucket.last_refill = now;
    }

    /// Spend a token if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until a token is available.
    pub fn wait_time(&self) -> Duration {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        let deficit = 1.0 - bucket.tokens;
        if deficit <= 0.0 || self.config.refill_rate <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(deficit / self.config.refill_rate)
        }
    }

    /// Wait until a token can be spent.
    pub async fn acquire(&self) {
        while !self.try_acquire() {
            let wait = self.wait_time().max(Duration::from_millis(10));
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn available(&self) -> f64 {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_to_empty() {
        let rl = RateLimiter::new(RateLimiterConfig {
            capacity: 3.0,
            refill_rate: 0.0001,
        });
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());
    }

    #[test]
    fn wait_time_follows_refill_rate() {
        let rl = RateLimiter::new(RateLimiterConfig {
            capacity: 1.0,
            refill_rate: 10.0,
        });
        assert!(rl.try_acquire());
        let wait = rl.wait_time();
        assert!(wait <= Duration::from_millis(110), "{wait:?}");
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let rl = RateLimiter::new(RateLimiterConfig {
            capacity: 1.0,
            refill_rate: 50.0,
        });
        rl.acquire().await;
        let start = Instant::now();
        rl.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
