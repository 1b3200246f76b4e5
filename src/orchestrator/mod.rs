//! Submission orchestration
//!
//! The top-level state machine that drives one attempt per directory target
//! (navigate, defense check, form fill, defense recheck, submit, classify,
//! capture evidence) and the batch runner that sequences targets with
//! randomized pacing.

mod machine;
mod runner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::defense::{ChallengeSolver, DefenseDetector, ManualSolver};
use crate::driver::BrowserDriver;
use crate::evidence::EvidenceLog;
use crate::fingerprint::FingerprintGenerator;
use crate::form::FormFillStrategyChain;
use crate::rate::DomainRateLimiter;
use crate::stats::RunStats;

/// States of one submission attempt, in the order they are normally visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    RateLimitWait,
    Navigating,
    DefenseCheck,
    FormFilling,
    DefenseRecheck,
    Submitting,
    OutcomeClassification,
    Done,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::RateLimitWait => "rate-limit-wait",
            SubmissionState::Navigating => "navigating",
            SubmissionState::DefenseCheck => "defense-check",
            SubmissionState::FormFilling => "form-filling",
            SubmissionState::DefenseRecheck => "defense-recheck",
            SubmissionState::Submitting => "submitting",
            SubmissionState::OutcomeClassification => "outcome-classification",
            SubmissionState::Done => "done",
        }
    }
}

/// Orchestrator tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Upper bound on one navigation, in seconds.
    pub nav_timeout_secs: u64,
    /// Upper bound on one defense inspection (grace period excluded).
    pub defense_check_timeout_secs: u64,
    /// Transport retries before an attempt fails.
    pub max_nav_retries: u32,
    /// Base for the transport retry backoff, in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Cap for the transport retry backoff, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Typo injection rate handed to the typing synthesizer.
    pub typing_error_rate: f64,
    /// Settle time after clicking submit, in milliseconds.
    pub post_submit_settle_ms: u64,
    /// Randomized pause between targets, lower bound in seconds.
    pub inter_target_delay_min_secs: u64,
    /// Randomized pause between targets, upper bound in seconds.
    pub inter_target_delay_max_secs: u64,
    /// Longest rate-limit cooldown the orchestrator waits through silently.
    pub rate_limit_sanity_secs: u64,
    /// Leave browser sessions open after each attempt (debugging).
    pub keep_session_open: bool,
    /// Seed for fingerprint/behavior randomness. Production runs leave this
    /// unset; tests pin it for reproducible trajectories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            nav_timeout_secs: 60,
            defense_check_timeout_secs: 30,
            max_nav_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 15_000,
            typing_error_rate: 0.03,
            post_submit_settle_ms: 2_000,
            inter_target_delay_min_secs: 15,
            inter_target_delay_max_secs: 30,
            rate_limit_sanity_secs: 600,
            keep_session_open: false,
            rng_seed: None,
        }
    }
}

/// The submission orchestrator. One instance per run; owns its rate limiter
/// and statistics, shares nothing through globals.
pub struct SubmissionOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    evidence: Arc<EvidenceLog>,
    detector: DefenseDetector,
    limiter: Arc<DomainRateLimiter>,
    solver: Arc<dyn ChallengeSolver>,
    chain: FormFillStrategyChain,
    stats: Arc<RunStats>,
    fingerprints: Mutex<FingerprintGenerator>,
    config: OrchestratorConfig,
    cancel: Arc<AtomicBool>,
}

impl SubmissionOrchestrator {
    /// Create an orchestrator with default detector, limiter and the manual
    /// challenge solver.
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        evidence: Arc<EvidenceLog>,
        config: OrchestratorConfig,
    ) -> Self {
        let fingerprints = match config.rng_seed {
            Some(seed) => FingerprintGenerator::with_seed(seed),
            None => FingerprintGenerator::new(),
        };

        Self {
            driver,
            evidence,
            detector: DefenseDetector::default(),
            limiter: Arc::new(DomainRateLimiter::default()),
            solver: Arc::new(ManualSolver),
            chain: FormFillStrategyChain::new(config.typing_error_rate),
            stats: Arc::new(RunStats::new()),
            fingerprints: Mutex::new(fingerprints),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the defense detector.
    pub fn with_detector(mut self, detector: DefenseDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Replace the rate limiter.
    pub fn with_limiter(mut self, limiter: Arc<DomainRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replace the challenge solver.
    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Live run statistics.
    pub fn stats(&self) -> Arc<RunStats> {
        self.stats.clone()
    }

    /// Cancellation flag. Honored between state transitions; in-flight
    /// browser operations are allowed to complete first.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
