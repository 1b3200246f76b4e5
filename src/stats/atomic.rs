//! Lock-free statistics using atomic operations
//!
//! Tracks per-run outcome counters without mutex contention. The recent
//! failure streak feeds back into the orchestrator's inter-target delay.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::evidence::Outcome;

/// Run-wide outcome counters.
#[derive(Debug, Default)]
pub struct RunStats {
    pub attempts: AtomicU64,
    pub success: AtomicU64,
    pub partial: AtomicU64,
    pub blocked: AtomicU64,
    pub errors: AtomicU64,
    pub manual_required: AtomicU64,
    /// Terminal failures since the last success (drives delay scaling).
    pub consecutive_failures: AtomicU64,
    pub start_time: AtomicU64,
}

impl RunStats {
    /// Create new run stats
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            start_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    /// Record one terminal attempt outcome.
    pub fn record_outcome(&self, outcome: Outcome) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Outcome::Success => {
                self.success.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Outcome::Partial => {
                self.partial.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Outcome::Blocked => {
                self.blocked.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::ManualRequired => {
                self.manual_required.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Current failure streak.
    pub fn failure_streak(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Total attempts recorded.
    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Whether any attempt ended in an error outcome.
    pub fn any_errors(&self) -> bool {
        self.errors.load(Ordering::Relaxed) > 0
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::Relaxed);
        self.success.store(0, Ordering::Relaxed);
        self.partial.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.manual_required.store(0, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.start_time.store(now, Ordering::Relaxed);
    }

    /// Get snapshot for serialization
    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            manual_required: self.manual_required.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of run stats
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatsSnapshot {
    pub attempts: u64,
    pub success: u64,
    pub partial: u64,
    pub blocked: u64,
    pub errors: u64,
    pub manual_required: u64,
}

impl std::fmt::Display for RunStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempts: {} success, {} partial, {} blocked, {} error, {} manual",
            self.attempts, self.success, self.partial, self.blocked, self.errors, self.manual_required
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters_and_failure_streak() {
        let stats = RunStats::new();

        stats.record_outcome(Outcome::Error);
        stats.record_outcome(Outcome::Blocked);
        assert_eq!(stats.failure_streak(), 2);

        stats.record_outcome(Outcome::Success);
        assert_eq!(stats.failure_streak(), 0);
        assert_eq!(stats.attempt_count(), 3);
        assert!(stats.any_errors());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_reset_clears_counters() {
        let stats = RunStats::new();
        stats.record_outcome(Outcome::Partial);
        stats.reset();
        assert_eq!(stats.attempt_count(), 0);
        assert!(!stats.any_errors());
    }
}
