//! Domain rate limiter with exponential backoff and jitter
//!
//! One explicitly instantiated limiter per orchestrator: no module-level
//! state, so tests run in isolation and multiple orchestrators cannot
//! cross-contaminate. Calls for the same domain serialize on a per-domain
//! mutex; different domains never block each other.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Raised when a domain is inside an active cooldown window.
#[derive(Debug, Error)]
#[error("Domain {domain} is rate limited for another {retry_after:?}")]
pub struct RateLimited {
    pub domain: String,
    pub retry_after: Duration,
}

/// Rate limiter configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfig {
    /// Rolling window length in seconds.
    pub window_secs: u64,
    /// Requests allowed per domain inside one rolling window.
    pub max_requests_per_window: usize,
    /// Base delay applied once the window fills, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the backoff-derived delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Cooldown applied when a target actively signals blocking, in seconds.
    pub cooldown_secs: u64,
    /// Jitter applied to computed delays (percentage, 0-100).
    pub jitter_percent: u8,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests_per_window: 10,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            cooldown_secs: 300,
            jitter_percent: 20,
        }
    }
}

/// Per-domain state, owned exclusively by the limiter.
struct DomainState {
    recent: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    backoff_multiplier: f64,
    /// Invalidates pending cooldown-expiry tasks when a newer block arrives.
    cooldown_generation: u64,
}

impl DomainState {
    fn new() -> Self {
        Self {
            recent: VecDeque::new(),
            cooldown_until: None,
            backoff_multiplier: 1.0,
            cooldown_generation: 0,
        }
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&front) = self.recent.front() {
            if now.duration_since(front) >= window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-domain adaptive rate limiter.
pub struct DomainRateLimiter {
    config: RateLimiterConfig,
    domains: DashMap<String, Arc<Mutex<DomainState>>>,
}

impl DomainRateLimiter {
    /// Create a new limiter with the given config.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            domains: DashMap::new(),
        }
    }

    /// Get current configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Clear all per-domain state.
    pub fn reset(&self) {
        self.domains.clear();
    }

    fn state_for(&self, domain: &str) -> Arc<Mutex<DomainState>> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DomainState::new())))
            .clone()
    }

    /// Gate one outgoing request to `domain`.
    ///
    /// Fails with [`RateLimited`] inside an active cooldown. Otherwise, when
    /// the rolling window is full, sleeps long enough to both honor the
    /// backoff schedule and keep the window at its cap, then records the
    /// request. The per-domain mutex is held across the sleep so same-domain
    /// callers serialize.
    pub async fn before_request(&self, domain: &str) -> Result<(), RateLimited> {
        let window = Duration::from_secs(self.config.window_secs);
        let state = self.state_for(domain);
        let mut state = state.lock().await;

        let now = Instant::now();
        if let Some(until) = state.cooldown_until {
            if now < until {
                return Err(RateLimited {
                    domain: domain.to_string(),
                    retry_after: until - now,
                });
            }
            // Cooldown expired between requests before the scheduled task
            // could clear it.
            state.cooldown_until = None;
        }

        // Quiet periods ease the multiplier back toward 1.0, one step per
        // full idle window.
        if let Some(&last) = state.recent.back() {
            let mut idle = now.duration_since(last);
            while idle >= window && state.backoff_multiplier > 1.0 {
                state.backoff_multiplier = (state.backoff_multiplier / 1.5).max(1.0);
                idle -= window;
            }
        }

        state.prune(window, now);

        let count = state.recent.len();
        if count >= self.config.max_requests_per_window {
            let backoff_ms = ((self.config.base_delay_ms as f64
                * state.backoff_multiplier
                * count as f64) as u64)
                .min(self.config.max_delay_ms);

            // The backoff delay alone may not push this request out of the
            // rolling window; also wait until enough history expires that
            // admitting one more stays at the cap.
            let oldest_relevant = state.recent[count - self.config.max_requests_per_window];
            let window_wait = (oldest_relevant + window).saturating_duration_since(now);

            let delay = self
                .with_jitter(Duration::from_millis(backoff_ms))
                .max(window_wait);

            info!(
                "Rate limiting {}: {} requests in window, waiting {}ms (backoff x{:.2})",
                domain,
                count,
                delay.as_millis(),
                state.backoff_multiplier
            );
            sleep(delay).await;
            state.backoff_multiplier *= 1.5;

            let now = Instant::now();
            state.prune(window, now);
        }

        state.recent.push_back(Instant::now());
        debug!(
            "Request admitted for {} ({} in window)",
            domain,
            state.recent.len()
        );
        Ok(())
    }

    /// React to a target actively signaling rate limiting or blocking:
    /// 5-minute cooldown, doubled backoff, and a scheduled task that clears
    /// the cooldown and halves the multiplier once it expires.
    pub async fn on_blocked(&self, domain: &str) {
        let cooldown = Duration::from_secs(self.config.cooldown_secs);
        let state_ref = self.state_for(domain);

        let generation = {
            let mut state = state_ref.lock().await;
            state.cooldown_until = Some(Instant::now() + cooldown);
            state.backoff_multiplier *= 2.0;
            state.cooldown_generation += 1;
            warn!(
                "Domain {} blocked - cooldown {}s, backoff x{:.2}",
                domain,
                cooldown.as_secs(),
                state.backoff_multiplier
            );
            state.cooldown_generation
        };

        let domain = domain.to_string();
        tokio::spawn(async move {
            sleep(cooldown).await;
            let mut state = state_ref.lock().await;
            if state.cooldown_generation == generation {
                state.cooldown_until = None;
                state.backoff_multiplier = (state.backoff_multiplier / 2.0).max(1.0);
                info!(
                    "Cooldown lifted for {} (backoff eased to x{:.2})",
                    domain, state.backoff_multiplier
                );
            }
        });
    }

    /// Current backoff multiplier for a domain (reporting only).
    pub async fn backoff_multiplier(&self, domain: &str) -> f64 {
        match self.domains.get(domain) {
            Some(state) => state.lock().await.backoff_multiplier,
            None => 1.0,
        }
    }

    fn with_jitter(&self, delay: Duration) -> Duration {
        let base = delay.as_millis() as i64;
        let jitter_range = base * self.config.jitter_percent as i64 / 100;
        if jitter_range == 0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_millis((base + jitter).max(0) as u64)
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

/// Calculate delay for a retry attempt with exponential backoff and +/-20%
/// jitter (standalone function).
pub fn calculate_backoff_with_jitter(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let base_delay = base_ms * 2u64.pow(attempt.saturating_sub(1).min(5));
    let capped_delay = base_delay.min(max_ms);

    let jitter_range = capped_delay / 5;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range * 2) as i64 - jitter_range as i64
    } else {
        0
    };

    Duration::from_millis((capped_delay as i64 + jitter).max(0) as u64)
}
