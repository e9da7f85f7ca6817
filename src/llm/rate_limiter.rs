//! Token-bucket rate limiting for outbound model calls.
//!
//! A [`RateLimiter`] holds two buckets: one metering requests, one metering
//! prompt tokens. A call proceeds only when both can pay; neither is charged
//! otherwise. Buckets refill lazily from the elapsed time at each check.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateLimitError {
    /// The request can never succeed: it costs more than the bucket holds.
    #[error("{bucket} cost {cost} exceeds bucket capacity {capacity}")]
    CostExceedsCapacity {
        bucket: &'static str,
        cost: f64,
        capacity: f64,
    },
    #[error("{bucket} bucket exhausted, retry after {retry_after:?}")]
    Exhausted {
        bucket: &'static str,
        retry_after: Duration,
    },
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    name: &'static str,
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(name: &'static str, capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            name,
            capacity,
            refill_per_sec,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Whether `cost` could be paid at `now`, without charging it.
    fn check(&mut self, cost: f64, now: Instant) -> Result<(), RateLimitError> {
        if cost > self.capacity {
            return Err(RateLimitError::CostExceedsCapacity {
                bucket: self.name,
                cost,
                capacity: self.capacity,
            });
        }
        self.refill(now);
        if cost <= self.tokens {
            return Ok(());
        }
        let deficit = cost - self.tokens;
        Err(RateLimitError::Exhausted {
            bucket: self.name,
            retry_after: Duration::from_secs_f64(deficit / self.refill_per_sec),
        })
    }

    pub fn try_take(&mut self, cost: f64) -> Result<(), RateLimitError> {
        self.check(cost, Instant::now())?;
        self.tokens -= cost;
        Ok(())
    }

    pub fn available(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub requests_available: f64,
    pub tokens_available: f64,
}

#[derive(Debug)]
struct Buckets {
    requests: TokenBucket,
    tokens: TokenBucket,
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_min = |n: u32| f64::from(n) / 60.0;
        Self {
            buckets: Mutex::new(Buckets {
                requests: TokenBucket::new(
                    "request",
                    f64::from(config.burst_requests),
                    per_min(config.requests_per_minute),
                ),
                tokens: TokenBucket::new(
                    "token",
                    f64::from(config.tokens_per_minute),
                    per_min(config.tokens_per_minute),
                ),
            }),
        }
    }

    /// Charge one request and `tokens` prompt tokens, or charge nothing.
    pub async fn try_acquire(&self, tokens: usize) -> Result<(), RateLimitError> {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();
        let cost = tokens as f64;

        let request_check = buckets.requests.check(1.0, now);
        let token_check = buckets.tokens.check(cost, now);
        match (request_check, token_check) {
            (Ok(()), Ok(())) => {
                buckets.requests.tokens -= 1.0;
                buckets.tokens.tokens -= cost;
                Ok(())
            }
            // A permanent failure wins over a transient one.
            (_, Err(e @ RateLimitError::CostExceedsCapacity { .. })) => Err(e),
            (Err(a), Err(b)) => Err(longer_wait(a, b)),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        }
    }

    /// Wait until capacity is available, then charge it.
    pub async fn acquire(&self, tokens: usize) -> Result<(), RateLimitError> {
        loop {
            match self.try_acquire(tokens).await {
                Ok(()) => return Ok(()),
                Err(RateLimitError::Exhausted { bucket, retry_after }) => {
                    tracing::warn!(bucket, wait_ms = retry_after.as_millis() as u64, "rate limited, waiting");
                    tokio::time::sleep(retry_after).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn snapshot(&self) -> RateLimitSnapshot {
        let mut buckets = self.buckets.lock().await;
        RateLimitSnapshot {
            requests_available: buckets.requests.available(),
            tokens_available: buckets.tokens.available(),
        }
    }
}

fn longer_wait(a: RateLimitError, b: RateLimitError) -> RateLimitError {
    match (&a, &b) {
        (
            RateLimitError::Exhausted { retry_after: ra, .. },
            RateLimitError::Exhausted { retry_after: rb, .. },
        ) if rb > ra => b,
        _ => a,
    }
}
