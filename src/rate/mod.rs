//! Per-domain adaptive rate limiting
//!
//! Tracks request history and active cooldowns per target hostname,
//! computing mandatory waits with exponential backoff and jitter.

mod limiter;

pub use limiter::{calculate_backoff_with_jitter, DomainRateLimiter, RateLimited, RateLimiterConfig};
