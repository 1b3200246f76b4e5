//! End-to-end submission scenarios against the simulated driver.

use std::collections::HashMap;
use std::sync::Arc;

use dirpilot::driver::sim::{ScriptedSite, SimField, SimulatedDriver};
use dirpilot::evidence::EvidenceLog;
use dirpilot::model::{
    Address, Business, BusinessRecord, Contact, Difficulty, DirectoryTarget, Location,
};
use dirpilot::orchestrator::{OrchestratorConfig, SubmissionOrchestrator};
use dirpilot::rate::DomainRateLimiter;
use tempfile::TempDir;

fn record_with_seven_fields() -> BusinessRecord {
    BusinessRecord {
        business: Business {
            name: "Acme Plumbing".to_string(),
            description: String::new(),
            categories: vec!["plumber".to_string()],
            hours: Default::default(),
        },
        contact: Contact {
            phone: "555-0142".to_string(),
            email: "office@acmeplumbing.example".to_string(),
            website: String::new(),
        },
        location: Location {
            address: Address {
                street: "12 Canal St".to_string(),
                city: "Springfield".to_string(),
                state: "Illinois".to_string(),
                state_code: "IL".to_string(),
                zip: "62701".to_string(),
            },
        },
    }
}

fn target(id: &str, host: &str) -> DirectoryTarget {
    DirectoryTarget {
        id: id.to_string(),
        name: id.to_string(),
        url: format!("https://{}/submit", host),
        difficulty: Difficulty::Easy,
        automatable: true,
        requires_verification: false,
        selectors: HashMap::new(),
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        inter_target_delay_min_secs: 0,
        inter_target_delay_max_secs: 0,
        rng_seed: Some(42),
        ..OrchestratorConfig::default()
    }
}

fn labeled_seven_field_site() -> ScriptedSite {
    ScriptedSite::form(vec![
        SimField::text("f-name").label("Business Name"),
        SimField::text("f-phone").input_type("tel").label("Phone Number"),
        SimField::text("f-street").label("Street Address"),
        SimField::text("f-city").label("City"),
        SimField::text("f-state").label("State"),
        SimField::text("f-zip").label("ZIP Code"),
        SimField::text("f-email").input_type("email").label("Email Address"),
    ])
}

fn orchestrator(
    driver: &Arc<SimulatedDriver>,
    evidence: &Arc<EvidenceLog>,
) -> SubmissionOrchestrator {
    SubmissionOrchestrator::new(driver.clone(), evidence.clone(), test_config())
}

#[tokio::test(start_paused = true)]
async fn captcha_before_interaction_yields_blocked_with_evidence() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert(
        "captcha.example",
        ScriptedSite::form(vec![SimField::text("f-name").label("Business Name")]).with_form_html(
            r#"<html><body><div class="g-recaptcha" data-sitekey="k"></div><form></form></body></html>"#,
        ),
    );

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(&[target("captcha-dir", "captcha.example")], &record_with_seven_fields())
        .await;

    assert_eq!(summary.blocked, 1);
    assert_eq!(summary.success, 0);

    let log_summary = evidence.summary().unwrap();
    assert_eq!(log_summary.blocked, 1);

    // At least one screenshot, zero form fields attempted.
    assert!(driver.screenshot_count("captcha.example") >= 1);
    assert!(driver.typed_value("captcha.example", "f-name").is_none());
    assert!(!driver.submitted("captcha.example"));
}

#[tokio::test(start_paused = true)]
async fn label_matchable_form_is_submitted_with_all_fields() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert("easy.example", labeled_seven_field_site());

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let record = record_with_seven_fields();
    let summary = engine
        .run_batch(&[target("easy-dir", "easy.example")], &record)
        .await;

    assert_eq!(summary.success, 1, "expected success, got {:?}", summary);
    assert!(driver.submitted("easy.example"));
    // One session, one exclusively owned fingerprint.
    assert_eq!(driver.launch_count(), 1);

    // Seven matchable fields, all filled with exact record values.
    assert_eq!(driver.typed_value("easy.example", "f-name").unwrap(), "Acme Plumbing");
    assert_eq!(driver.typed_value("easy.example", "f-phone").unwrap(), "555-0142");
    assert_eq!(driver.typed_value("easy.example", "f-street").unwrap(), "12 Canal St");
    assert_eq!(driver.typed_value("easy.example", "f-city").unwrap(), "Springfield");
    assert_eq!(driver.typed_value("easy.example", "f-state").unwrap(), "Illinois");
    assert_eq!(driver.typed_value("easy.example", "f-zip").unwrap(), "62701");
    assert_eq!(
        driver.typed_value("easy.example", "f-email").unwrap(),
        "office@acmeplumbing.example"
    );
}

#[tokio::test(start_paused = true)]
async fn ambiguous_post_submit_content_reports_partial() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert(
        "vague.example",
        labeled_seven_field_site()
            .with_post_submit_html("<html><body><p>Directory home page</p></body></html>"),
    );

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(&[target("vague-dir", "vague.example")], &record_with_seven_fields())
        .await;

    assert_eq!(summary.partial, 1);
    assert_eq!(summary.success, 0);
    assert!(driver.submitted("vague.example"));
}

#[tokio::test(start_paused = true)]
async fn transient_navigation_failures_are_retried() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert(
        "flaky.example",
        labeled_seven_field_site().with_nav_failures(2),
    );

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(&[target("flaky-dir", "flaky.example")], &record_with_seven_fields())
        .await;

    assert_eq!(summary.success, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_navigation_retries_end_in_error() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert(
        "down.example",
        labeled_seven_field_site().with_nav_failures(10),
    );

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(&[target("down-dir", "down.example")], &record_with_seven_fields())
        .await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.success, 0);
}

#[tokio::test(start_paused = true)]
async fn form_without_matchable_fields_reports_error() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert("empty.example", ScriptedSite::form(vec![]));

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(&[target("empty-dir", "empty.example")], &record_with_seven_fields())
        .await;

    assert_eq!(summary.errors, 1);
    assert!(!driver.submitted("empty.example"));
}

#[tokio::test(start_paused = true)]
async fn one_bad_target_does_not_abort_the_batch() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert("empty.example", ScriptedSite::form(vec![]));
    driver.insert("easy.example", labeled_seven_field_site());

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    let summary = engine
        .run_batch(
            &[
                target("empty-dir", "empty.example"),
                target("easy-dir", "easy.example"),
            ],
            &record_with_seven_fields(),
        )
        .await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.success, 1);
    assert_eq!(evidence.attempt_count().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn rerunning_a_batch_doubles_the_evidence_log() {
    let tmp = TempDir::new().unwrap();
    let targets = [target("easy-dir", "easy.example")];
    let record = record_with_seven_fields();

    for _ in 0..2 {
        // Fresh driver and orchestrator each run, same evidence path.
        let driver = Arc::new(SimulatedDriver::new());
        driver.insert("easy.example", labeled_seven_field_site());
        let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
        let engine = orchestrator(&driver, &evidence);
        engine.run_batch(&targets, &record).await;
    }

    let evidence = EvidenceLog::open(tmp.path()).unwrap();
    assert_eq!(evidence.attempt_count().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn sustained_same_domain_submissions_hit_the_rate_limiter() {
    // Scenario: 12 consecutive clearances for one domain. The 11th must wait
    // a measurable, strictly positive delay and raise the backoff multiplier.
    let limiter = DomainRateLimiter::default();

    for i in 0..12u32 {
        let before = tokio::time::Instant::now();
        limiter.before_request("busy.example").await.unwrap();
        let waited = tokio::time::Instant::now().duration_since(before);

        if i < 10 {
            assert_eq!(waited.as_millis(), 0, "request {} should be immediate", i);
        }
        if i == 10 {
            assert!(waited.as_millis() > 0, "11th request must be delayed");
        }
    }

    assert!(limiter.backoff_multiplier("busy.example").await >= 1.5);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_batch_between_targets() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(SimulatedDriver::new());
    driver.insert("easy.example", labeled_seven_field_site());
    driver.insert("second.example", labeled_seven_field_site());

    let evidence = Arc::new(EvidenceLog::open(tmp.path()).unwrap());
    let engine = orchestrator(&driver, &evidence);

    // Cancel before starting: no target may run.
    engine
        .cancel_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let summary = engine
        .run_batch(
            &[
                target("easy-dir", "easy.example"),
                target("second-dir", "second.example"),
            ],
            &record_with_seven_fields(),
        )
        .await;

    assert_eq!(summary.attempts, 0);
    assert!(!driver.submitted("easy.example"));
    assert!(!driver.submitted("second.example"));
}
