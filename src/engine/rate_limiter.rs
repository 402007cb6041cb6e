//! Per-domain token bucket rate limiter.
//!
//! Refill rate and burst are derived from a job's `concurrency` option
//! (refill = concurrency req/s, burst = max(5, concurrency)) rather than a
//! fixed constant, so jobs with different concurrency settings sharing a
//! domain converge on the higher of their rates.
//!
//! - `DashMap` for concurrent, sharded domain lookups (no single global lock
//!   guards the whole registry).
//! - Each domain's bucket state lives behind its own `parking_lot::Mutex`;
//!   the critical section is pure arithmetic, never held across I/O.
//! - Instance-based: each `RateLimiter` has isolated state, so tests don't
//!   leak rate-limit state into each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after: Duration },
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
struct DomainBucket {
    state: Mutex<BucketState>,
    rate_per_sec: f64,
    max_tokens: f64,
}

impl DomainBucket {
    fn new(rate_rps: f64, burst: f64, now: Instant) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: now,
            }),
            rate_per_sec: rate_rps,
            max_tokens: burst,
        }
    }

    fn try_consume(&self) -> RateLimitDecision {
        let now = Instant::now();
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.max_tokens);
            state.last_refill = now;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return RateLimitDecision::Allow;
        }

        let deficit = 1.0 - state.tokens;
        let wait_secs = if self.rate_per_sec > 0.0 {
            deficit / self.rate_per_sec
        } else {
            1.0
        };
        RateLimitDecision::Deny {
            retry_after: Duration::from_secs_f64(wait_secs),
        }
    }
}

/// Per-domain token-bucket limiter, shared by every worker in the pool.
///
/// Jobs targeting the same domain share one bucket, keyed by domain name;
/// the bucket's rate is set by whichever job creates it first and is not
/// retuned by later jobs sharing the domain.
pub struct RateLimiter {
    buckets: DashMap<String, Arc<DomainBucket>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Acquire a token for `domain`, waiting out any `Deny` internally until
    /// a token is available or `cancel` resolves.
    pub async fn acquire(&self, domain: &str, concurrency: u32, cancel: &tokio::sync::Notify) {
        loop {
            match self.check(domain, concurrency) {
                RateLimitDecision::Allow => return,
                RateLimitDecision::Deny { retry_after } => {
                    tokio::select! {
                        () = tokio::time::sleep(retry_after) => {}
                        () = cancel.notified() => return,
                    }
                }
            }
        }
    }

    fn check(&self, domain: &str, concurrency: u32) -> RateLimitDecision {
        let rate = f64::from(concurrency).max(1.0);
        let burst = rate.max(5.0);
        let bucket = Arc::clone(
            self.buckets
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainBucket::new(rate, burst, Instant::now())))
                .value(),
        );
        bucket.try_consume()
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }

    #[must_use]
    pub fn tracked_domain_count(&self) -> usize {
        self.buckets.len()
    }
}
