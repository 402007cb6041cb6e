//! Shared low-level primitives used across the store, fetcher, discoverer,
//! and worker pool: error classification, timeouts, and the per-domain rate
//! limiter.

pub mod errors;
pub mod rate_limiter;
pub mod timeout;

pub use errors::{classify_status, AppError, DiscoveryError, FailureKind, FetchError, StoreError};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use timeout::with_timeout;
