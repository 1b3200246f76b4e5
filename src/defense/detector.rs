//! Page signature checks
//!
//! An ordered set of markup signatures, first match wins. The only
//! self-resolving case is a Cloudflare-style interstitial, which frequently
//! clears on its own when the session presents a consistent fingerprint: the
//! detector waits a configurable grace period and re-checks exactly once,
//! logging the outcome either way.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::types::{DefenseKind, DefenseVerdict};
use crate::driver::{DriverError, PageSession};

/// One markup signature mapped to the defense kind it indicates.
struct Signature {
    kind: DefenseKind,
    pattern: Regex,
}

/// Ordered signature table; earlier entries win.
static SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    let sig = |kind, pattern: &str| Signature {
        kind,
        pattern: Regex::new(pattern).expect("static signature pattern"),
    };

    vec![
        sig(
            DefenseKind::CaptchaRecaptcha,
            r#"(?i)class="g-recaptcha"|google\.com/recaptcha|data-sitekey="[^"]+"[^>]*recaptcha|iframe[^>]+recaptcha"#,
        ),
        sig(
            DefenseKind::CaptchaHCaptcha,
            r#"(?i)class="h-captcha"|hcaptcha\.com/1/api\.js|iframe[^>]+hcaptcha"#,
        ),
        sig(
            DefenseKind::ChallengeCloudflare,
            r#"(?i)checking your browser|cf-browser-verification|challenge-platform|cf_chl_|just a moment|cloudflare ray id"#,
        ),
        sig(
            DefenseKind::CaptchaText,
            r#"(?i)<input[^>]+name="captcha"|<input[^>]+id="captcha"|enter the (code|characters) (shown|displayed)"#,
        ),
    ]
});

/// Detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    /// Grace period before re-checking a Cloudflare-style interstitial.
    pub cloudflare_grace_secs: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { cloudflare_grace_secs: 5 }
    }
}

/// Classifies anti-bot defenses on a loaded page. Never mutates page state.
pub struct DefenseDetector {
    config: DetectorConfig,
}

impl DefenseDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Inspect the current page and classify any active defense.
    pub async fn inspect(&self, session: &dyn PageSession) -> Result<DefenseVerdict, DriverError> {
        let kind = classify(&session.content().await?);

        match kind {
            DefenseKind::None => Ok(DefenseVerdict::clear()),
            DefenseKind::ChallengeCloudflare => self.recheck_after_grace(session).await,
            other => {
                warn!("Defense detected: {} - manual follow-up required", other.as_str());
                Ok(DefenseVerdict {
                    kind: other,
                    auto_resolved: false,
                    requires_manual: true,
                })
            }
        }
    }

    /// Cloudflare interstitials often clear by themselves; give the page one
    /// grace period and look again. The wait and its outcome are logged so
    /// the heuristic stays observable instead of silently masking failures.
    async fn recheck_after_grace(
        &self,
        session: &dyn PageSession,
    ) -> Result<DefenseVerdict, DriverError> {
        let grace = Duration::from_secs(self.config.cloudflare_grace_secs);
        info!(
            "Cloudflare-style challenge detected - waiting {}s grace period before recheck",
            grace.as_secs()
        );
        tokio::time::sleep(grace).await;

        let kind_after = classify(&session.content().await?);
        if kind_after == DefenseKind::None {
            info!("Challenge auto-resolved after {}s grace period", grace.as_secs());
            Ok(DefenseVerdict {
                kind: DefenseKind::ChallengeCloudflare,
                auto_resolved: true,
                requires_manual: false,
            })
        } else {
            warn!(
                "Challenge still present after {}s grace period (now classified {})",
                grace.as_secs(),
                kind_after.as_str()
            );
            Ok(DefenseVerdict {
                kind: DefenseKind::ChallengeCloudflare,
                auto_resolved: false,
                requires_manual: true,
            })
        }
    }
}

impl Default for DefenseDetector {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

/// Run the ordered signature table against page markup.
fn classify(html: &str) -> DefenseKind {
    for signature in SIGNATURES.iter() {
        if signature.pattern.is_match(html) {
            debug!("Page matched defense signature {}", signature.kind.as_str());
            return signature.kind;
        }
    }
    DefenseKind::None
}

/// Extract a reCAPTCHA/hCaptcha site key from page markup, when present.
pub(crate) fn extract_site_key(html: &str) -> Option<String> {
    static SITE_KEY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"data-sitekey="([^"]+)""#).expect("static pattern"));
    SITE_KEY
        .captures(html)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sim::{ScriptedSite, SimField, SimulatedDriver};
    use crate::driver::BrowserDriver;
    use crate::fingerprint::FingerprintGenerator;

    #[test]
    fn test_classification_first_match_wins() {
        assert_eq!(
            classify(r#"<div class="g-recaptcha" data-sitekey="k"></div>"#),
            DefenseKind::CaptchaRecaptcha
        );
        assert_eq!(
            classify(r#"<div class="h-captcha" data-sitekey="k"></div>"#),
            DefenseKind::CaptchaHCaptcha
        );
        assert_eq!(
            classify("<title>Just a moment...</title>"),
            DefenseKind::ChallengeCloudflare
        );
        assert_eq!(
            classify(r#"<input type="text" name="captcha">"#),
            DefenseKind::CaptchaText
        );
        assert_eq!(classify("<html><body>plain form</body></html>"), DefenseKind::None);

        // A page carrying both recaptcha and cloudflare markers classifies as
        // recaptcha because the table is ordered.
        assert_eq!(
            classify(r#"<div class="g-recaptcha"></div> checking your browser"#),
            DefenseKind::CaptchaRecaptcha
        );
    }

    #[test]
    fn test_site_key_extraction() {
        let html = r#"<div class="g-recaptcha" data-sitekey="6LfRMGAq-example"></div>"#;
        assert_eq!(extract_site_key(html).as_deref(), Some("6LfRMGAq-example"));
        assert_eq!(extract_site_key("<html></html>"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloudflare_interstitial_auto_resolves() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "cf.example",
            ScriptedSite::form(vec![SimField::text("a")])
                .with_interstitial("<html><body>Checking your browser before accessing</body></html>", true),
        );

        let profile = FingerprintGenerator::with_seed(1).generate();
        let session = driver.launch(&profile).await.unwrap();
        session.goto("https://cf.example/").await.unwrap();

        let verdict = DefenseDetector::default().inspect(session.as_ref()).await.unwrap();
        assert_eq!(verdict.kind, DefenseKind::ChallengeCloudflare);
        assert!(verdict.auto_resolved);
        assert!(!verdict.requires_manual);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cloudflare_interstitial_that_persists_blocks() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "cf.example",
            ScriptedSite::form(vec![SimField::text("a")])
                .with_interstitial("<html><body>Checking your browser before accessing</body></html>", false),
        );

        let profile = FingerprintGenerator::with_seed(2).generate();
        let session = driver.launch(&profile).await.unwrap();
        session.goto("https://cf.example/").await.unwrap();

        let verdict = DefenseDetector::default().inspect(session.as_ref()).await.unwrap();
        assert_eq!(verdict.kind, DefenseKind::ChallengeCloudflare);
        assert!(!verdict.auto_resolved);
        assert!(verdict.requires_manual);
    }

    #[tokio::test]
    async fn test_recaptcha_marker_requires_manual_immediately() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "captcha.example",
            ScriptedSite::form(vec![SimField::text("a")]).with_form_html(
                r#"<html><body><div class="g-recaptcha" data-sitekey="k"></div></body></html>"#,
            ),
        );

        let profile = FingerprintGenerator::with_seed(3).generate();
        let session = driver.launch(&profile).await.unwrap();
        session.goto("https://captcha.example/").await.unwrap();

        let verdict = DefenseDetector::default().inspect(session.as_ref()).await.unwrap();
        assert_eq!(verdict.kind, DefenseKind::CaptchaRecaptcha);
        assert!(verdict.requires_manual);
    }
}
