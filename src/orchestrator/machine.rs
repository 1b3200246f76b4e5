//! Per-target attempt state machine
//!
//! Drives one directory target from rate-limit clearance through outcome
//! classification. Attempt-level failures never escape this module: every
//! path ends in exactly one terminal outcome with evidence captured.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::{SubmissionOrchestrator, SubmissionState};
use crate::behavior::{BehaviorSynthesizer, Point};
use crate::defense::{extract_site_key, ChallengeContext, DefenseKind, DefenseVerdict};
use crate::driver::{DriverError, PageSession};
use crate::evidence::{Outcome, SubmissionAttempt};
use crate::form::{glide_and_click, FillStrategy};
use crate::model::{BusinessRecord, DirectoryTarget};
use crate::rate::calculate_backoff_with_jitter;

/// Mutable bookkeeping for one attempt.
struct AttemptTrace {
    state: SubmissionState,
    screenshots: Vec<String>,
    defense: Option<DefenseKind>,
    strategy: Option<FillStrategy>,
    fields_filled: u32,
}

impl AttemptTrace {
    fn new() -> Self {
        Self {
            state: SubmissionState::Idle,
            screenshots: Vec::new(),
            defense: None,
            strategy: None,
            fields_filled: 0,
        }
    }
}

impl SubmissionOrchestrator {
    /// Run one target to a terminal outcome. Never returns an error: every
    /// failure mode maps to an outcome and is logged.
    pub(crate) async fn submit_target(
        &self,
        target: &DirectoryTarget,
        record: &BusinessRecord,
    ) -> SubmissionAttempt {
        let started_at = Utc::now();
        let host = target.host();
        let mut trace = AttemptTrace::new();

        info!("Attempt starting for {} ({})", target.id, host);

        // Rate-limit clearance.
        self.transition(&mut trace, SubmissionState::RateLimitWait, target);
        if let Err(limited) = self.limiter.before_request(&host).await {
            let sanity = Duration::from_secs(self.config.rate_limit_sanity_secs);
            if limited.retry_after > sanity {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        None,
                        Outcome::Error,
                        Some(format!(
                            "rate-limit cooldown of {}s exceeds sanity bound",
                            limited.retry_after.as_secs()
                        )),
                    )
                    .await;
            }

            info!(
                "Waiting out {}s cooldown for {}",
                limited.retry_after.as_secs(),
                host
            );
            sleep(limited.retry_after).await;
            if let Err(still_limited) = self.limiter.before_request(&host).await {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        None,
                        Outcome::Error,
                        Some(format!(
                            "still rate limited after cooldown wait: {}",
                            still_limited
                        )),
                    )
                    .await;
            }
        }

        if self.is_cancelled() {
            return self
                .finish(target, started_at, trace, None, Outcome::Error, Some("cancelled".into()))
                .await;
        }

        // Fresh fingerprint, fresh session, navigate with bounded retries.
        self.transition(&mut trace, SubmissionState::Navigating, target);
        let session = match self.launch_session().await {
            Ok(session) => session,
            Err(e) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        None,
                        Outcome::Error,
                        Some(format!("browser launch failed: {}", e)),
                    )
                    .await;
            }
        };

        if let Err(e) = self.navigate_with_retries(session.as_ref(), target).await {
            return self
                .finish(
                    target,
                    started_at,
                    trace,
                    Some(session.as_ref()),
                    Outcome::Error,
                    Some(format!("navigation failed: {}", e)),
                )
                .await;
        }

        // Pre-interaction defense check.
        self.transition(&mut trace, SubmissionState::DefenseCheck, target);
        match self.inspect_defenses(session.as_ref(), target, &mut trace).await {
            DefenseDecision::Proceed => {}
            DefenseDecision::Halt => {
                self.capture(session.as_ref(), target, "blocked", &mut trace).await;
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Blocked,
                        Some("anti-bot defense detected before interaction".into()),
                    )
                    .await;
            }
            DefenseDecision::Failed(detail) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Error,
                        Some(detail),
                    )
                    .await;
            }
        }

        if self.is_cancelled() {
            return self
                .finish(
                    target,
                    started_at,
                    trace,
                    Some(session.as_ref()),
                    Outcome::Error,
                    Some("cancelled".into()),
                )
                .await;
        }

        // Fill the form through the strategy cascade.
        self.transition(&mut trace, SubmissionState::FormFilling, target);
        let mut synth = self.new_synthesizer();
        let cursor = Point::new(640.0, 360.0);
        let fill = match self
            .chain
            .fill(session.as_ref(), &mut synth, record, target, cursor)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Error,
                        Some(format!("form filling failed: {}", e)),
                    )
                    .await;
            }
        };

        trace.fields_filled = fill.fields_filled as u32;
        trace.strategy = fill.strategy;
        if fill.fields_filled == 0 {
            return self
                .finish(
                    target,
                    started_at,
                    trace,
                    Some(session.as_ref()),
                    Outcome::Error,
                    Some("no fields matched".into()),
                )
                .await;
        }

        // Defenses may appear only after interaction: recheck, never reuse
        // the earlier verdict.
        self.transition(&mut trace, SubmissionState::DefenseRecheck, target);
        match self.inspect_defenses(session.as_ref(), target, &mut trace).await {
            DefenseDecision::Proceed => {}
            DefenseDecision::Halt => {
                self.capture(session.as_ref(), target, "blocked", &mut trace).await;
                // The form is filled; a human can finish the submission.
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::ManualRequired,
                        Some("defense appeared after form interaction".into()),
                    )
                    .await;
            }
            DefenseDecision::Failed(detail) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Error,
                        Some(detail),
                    )
                    .await;
            }
        }

        if self.is_cancelled() {
            return self
                .finish(
                    target,
                    started_at,
                    trace,
                    Some(session.as_ref()),
                    Outcome::Error,
                    Some("cancelled".into()),
                )
                .await;
        }

        // Submit.
        self.transition(&mut trace, SubmissionState::Submitting, target);
        match self
            .click_submit(session.as_ref(), &mut synth, fill.cursor)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Error,
                        Some("no submit control found".into()),
                    )
                    .await;
            }
            Err(e) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Error,
                        Some(format!("submit failed: {}", e)),
                    )
                    .await;
            }
        }
        sleep(Duration::from_millis(self.config.post_submit_settle_ms)).await;

        // Classify the resulting page.
        self.transition(&mut trace, SubmissionState::OutcomeClassification, target);
        let html = match timeout(
            Duration::from_secs(self.config.defense_check_timeout_secs),
            session.content(),
        )
        .await
        {
            Ok(Ok(html)) => html,
            Ok(Err(e)) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Partial,
                        Some(format!("post-submit page unreadable: {}", e)),
                    )
                    .await;
            }
            Err(_) => {
                return self
                    .finish(
                        target,
                        started_at,
                        trace,
                        Some(session.as_ref()),
                        Outcome::Partial,
                        Some("post-submit page read timed out".into()),
                    )
                    .await;
            }
        };

        let (outcome, detail) = classify_submission(&html);
        self.finish(target, started_at, trace, Some(session.as_ref()), outcome, detail)
            .await
    }

    fn transition(&self, trace: &mut AttemptTrace, next: SubmissionState, target: &DirectoryTarget) {
        debug!(
            "Attempt {}: {} -> {}",
            target.id,
            trace.state.as_str(),
            next.as_str()
        );
        trace.state = next;
    }

    fn new_synthesizer(&self) -> BehaviorSynthesizer {
        match self.config.rng_seed {
            Some(seed) => BehaviorSynthesizer::with_seed(seed),
            None => BehaviorSynthesizer::new(),
        }
    }

    async fn launch_session(&self) -> Result<Box<dyn PageSession>, DriverError> {
        let profile = self.fingerprints.lock().generate();
        self.driver.launch(&profile).await
    }

    /// Navigate with exponential backoff and jitter, bounded by the retry
    /// cap. Only transport-level failures are retried.
    async fn navigate_with_retries(
        &self,
        session: &dyn PageSession,
        target: &DirectoryTarget,
    ) -> Result<(), DriverError> {
        let nav_timeout = Duration::from_secs(self.config.nav_timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let result = timeout(nav_timeout, session.goto(&target.url)).await;

            let error = match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => e,
                Err(_) => DriverError::Timeout(format!(
                    "navigation to {} exceeded {}s",
                    target.url,
                    nav_timeout.as_secs()
                )),
            };

            if !error.is_retryable() || attempt > self.config.max_nav_retries {
                return Err(error);
            }

            let delay = calculate_backoff_with_jitter(
                attempt,
                self.config.retry_base_delay_ms,
                self.config.retry_max_delay_ms,
            );
            warn!(
                "Navigation attempt {}/{} to {} failed ({}), retrying in {}ms",
                attempt,
                self.config.max_nav_retries + 1,
                target.id,
                error,
                delay.as_millis()
            );
            sleep(delay).await;
        }
    }

    /// Inspect defenses with a bounded wait, then route blocking verdicts
    /// through the challenge solver before giving up on the attempt.
    async fn inspect_defenses(
        &self,
        session: &dyn PageSession,
        target: &DirectoryTarget,
        trace: &mut AttemptTrace,
    ) -> DefenseDecision {
        let bound = Duration::from_secs(
            self.config.defense_check_timeout_secs + self.detector.config().cloudflare_grace_secs,
        );

        let verdict: DefenseVerdict = match timeout(bound, self.detector.inspect(session)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => {
                return DefenseDecision::Failed(format!("defense inspection failed: {}", e));
            }
            Err(_) => {
                return DefenseDecision::Failed(format!(
                    "defense inspection exceeded {}s",
                    bound.as_secs()
                ));
            }
        };

        if verdict.kind != DefenseKind::None {
            trace.defense = Some(verdict.kind);
        }
        if !verdict.is_blocking() {
            return DefenseDecision::Proceed;
        }

        // Last resort before halting: an external token service may clear
        // token-based challenges (the in-browser injection is the solver
        // extension's job, mirroring how hosted solvers integrate).
        let site_key = match session.content().await {
            Ok(html) => extract_site_key(&html),
            Err(_) => None,
        };
        let challenge = ChallengeContext {
            kind: verdict.kind,
            page_url: target.url.clone(),
            site_key,
        };
        match self.solver.solve(&challenge).await {
            Ok(Some(_token)) => {
                info!(
                    "Challenge {} on {} cleared via external solver",
                    verdict.kind.as_str(),
                    target.id
                );
                DefenseDecision::Proceed
            }
            Ok(None) => DefenseDecision::Halt,
            Err(e) => {
                warn!("Challenge solver failed for {}: {}", target.id, e);
                DefenseDecision::Halt
            }
        }
    }

    /// Locate and click the submit control. Returns false when none exists.
    async fn click_submit(
        &self,
        session: &dyn PageSession,
        synth: &mut BehaviorSynthesizer,
        cursor: Point,
    ) -> Result<bool, DriverError> {
        let candidates = session
            .query_selector("button[type='submit'], input[type='submit'], button")
            .await?;
        let Some(submit) = candidates.iter().find(|e| e.visible) else {
            return Ok(false);
        };

        glide_and_click(session, synth, cursor, submit).await?;
        Ok(true)
    }

    async fn capture(
        &self,
        session: &dyn PageSession,
        target: &DirectoryTarget,
        stage: &str,
        trace: &mut AttemptTrace,
    ) {
        match session.screenshot().await {
            Ok(png) => match self.evidence.save_screenshot(&target.id, stage, &png) {
                Ok(reference) => trace.screenshots.push(reference),
                Err(e) => warn!("Failed to store {} screenshot for {}: {}", stage, target.id, e),
            },
            Err(e) => warn!("Failed to capture {} screenshot for {}: {}", stage, target.id, e),
        }
    }

    /// Seal the attempt: terminal screenshot, session teardown, one outcome.
    async fn finish(
        &self,
        target: &DirectoryTarget,
        started_at: chrono::DateTime<Utc>,
        mut trace: AttemptTrace,
        session: Option<&dyn PageSession>,
        outcome: Outcome,
        error_detail: Option<String>,
    ) -> SubmissionAttempt {
        self.transition(&mut trace, SubmissionState::Done, target);

        if let Some(session) = session {
            self.capture(session, target, "terminal", &mut trace).await;
            if !self.config.keep_session_open {
                if let Err(e) = session.close().await {
                    warn!("Failed to close session for {}: {}", target.id, e);
                }
            }
        }

        if outcome == Outcome::Blocked {
            // The target actively pushed back; put its domain on cooldown.
            self.limiter.on_blocked(&target.host()).await;
        }

        info!(
            "Attempt finished for {}: {} ({} fields, {} screenshots{})",
            target.id,
            outcome.as_str(),
            trace.fields_filled,
            trace.screenshots.len(),
            error_detail
                .as_deref()
                .map(|d| format!(", {}", d))
                .unwrap_or_default()
        );

        SubmissionAttempt {
            directory_id: target.id.clone(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            fields_filled: trace.fields_filled,
            screenshot_refs: trace.screenshots,
            error_detail,
            defense: trace.defense,
            fill_strategy: trace.strategy,
        }
    }
}

enum DefenseDecision {
    Proceed,
    Halt,
    Failed(String),
}

const SUCCESS_MARKERS: &[&str] = &[
    "thank you",
    "thanks for",
    "success",
    "submitted",
    "received",
    "confirmation",
    "we will review",
    "under review",
];

const FAILURE_MARKERS: &[&str] = &[
    "error",
    "failed",
    "invalid",
    "required field",
    "try again",
    "captcha",
    "verify you are human",
    "rejected",
];

/// Success/failure heuristics for the post-submit page. Pages matching
/// neither set are reported as partial, never silently treated as success.
fn classify_submission(html: &str) -> (Outcome, Option<String>) {
    let lower = html.to_lowercase();
    let failed = FAILURE_MARKERS.iter().any(|m| lower.contains(m));
    if failed {
        return (
            Outcome::Error,
            Some("submission rejected by target".to_string()),
        );
    }

    let succeeded = SUCCESS_MARKERS.iter().any(|m| lower.contains(m));
    if succeeded {
        (Outcome::Success, None)
    } else {
        (
            Outcome::Partial,
            Some("post-submit content matched neither success nor failure heuristics".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_classification() {
        let (outcome, _) = classify_submission("<h1>Thank you! Your listing has been received.</h1>");
        assert_eq!(outcome, Outcome::Success);

        let (outcome, detail) = classify_submission("<p>Invalid phone number, try again</p>");
        assert_eq!(outcome, Outcome::Error);
        assert!(detail.is_some());

        let (outcome, detail) = classify_submission("<p>Directory home page</p>");
        assert_eq!(outcome, Outcome::Partial);
        assert!(detail.is_some());
    }

    #[test]
    fn test_failure_markers_beat_success_markers() {
        // "thank you" plus an inline error still counts as rejected.
        let (outcome, _) =
            classify_submission("<p>Thank you, but an error occurred processing your listing</p>");
        assert_eq!(outcome, Outcome::Error);
    }
}
