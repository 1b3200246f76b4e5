//! Form fill strategy cascade
//!
//! Four discovery strategies tried in fixed priority order, each at most once
//! per attempt; the first that yields at least one fillable field wins and
//! the rest are skipped. Matched fields are populated exclusively through
//! synthesized mouse movement and keystrokes, never direct value assignment.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::fields::{CanonicalField, FILL_ORDER};
use crate::behavior::{BehaviorSynthesizer, Point, TypingAction};
use crate::driver::{DriverError, ElementInfo, Keystroke, PageSession};
use crate::model::{BusinessRecord, DirectoryTarget};

/// The strategy that ended up filling the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FillStrategy {
    ExplicitSelectors,
    LabelText,
    AttributeText,
    Positional,
}

impl FillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::ExplicitSelectors => "explicit-selectors",
            FillStrategy::LabelText => "label-text",
            FillStrategy::AttributeText => "attribute-text",
            FillStrategy::Positional => "positional",
        }
    }
}

const STRATEGIES: [FillStrategy; 4] = [
    FillStrategy::ExplicitSelectors,
    FillStrategy::LabelText,
    FillStrategy::AttributeText,
    FillStrategy::Positional,
];

/// Result of one fill pass.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub fields_filled: usize,
    pub strategy: Option<FillStrategy>,
    /// Where the pointer ended up, so the caller can continue from there.
    pub cursor: Point,
}

/// The strategy cascade.
pub struct FormFillStrategyChain {
    /// Typo injection rate handed to the typing synthesizer.
    typing_error_rate: f64,
}

impl FormFillStrategyChain {
    pub fn new(typing_error_rate: f64) -> Self {
        Self {
            typing_error_rate: typing_error_rate.clamp(0.0, 1.0),
        }
    }

    /// Discover and fill form fields from `record`.
    ///
    /// Strategies run in priority order; discovery failures fall through to
    /// the next strategy, driver errors during filling propagate.
    pub async fn fill(
        &self,
        session: &dyn PageSession,
        synth: &mut BehaviorSynthesizer,
        record: &BusinessRecord,
        target: &DirectoryTarget,
        start: Point,
    ) -> Result<FillOutcome, DriverError> {
        for strategy in STRATEGIES {
            let pairs = match strategy {
                FillStrategy::ExplicitSelectors => self.discover_explicit(session, target).await?,
                FillStrategy::LabelText => self.discover_labels(session).await?,
                FillStrategy::AttributeText => self.discover_attributes(session).await?,
                FillStrategy::Positional => self.discover_positional(session, record).await?,
            };

            // Only fields the record can actually populate count.
            let pairs: Vec<(CanonicalField, ElementInfo)> = pairs
                .into_iter()
                .filter(|(field, _)| !field.value(record).is_empty())
                .collect();

            if pairs.is_empty() {
                debug!("Strategy {} matched no fillable fields", strategy.as_str());
                continue;
            }

            info!(
                "Strategy {} matched {} fields on {}",
                strategy.as_str(),
                pairs.len(),
                target.id
            );

            let mut cursor = start;
            for (field, element) in &pairs {
                cursor = glide_and_click(session, synth, cursor, element).await?;
                type_value(session, synth, field.value(record), self.typing_error_rate).await?;
                debug!("Filled {} on {}", field.key(), target.id);
            }

            return Ok(FillOutcome {
                fields_filled: pairs.len(),
                strategy: Some(strategy),
                cursor,
            });
        }

        Ok(FillOutcome {
            fields_filled: 0,
            strategy: None,
            cursor: start,
        })
    }

    /// Strategy 1: explicit selector hints from the directory config.
    async fn discover_explicit(
        &self,
        session: &dyn PageSession,
        target: &DirectoryTarget,
    ) -> Result<Vec<(CanonicalField, ElementInfo)>, DriverError> {
        let mut pairs = Vec::new();
        let mut claimed = Claimed::new();

        // Deterministic field order regardless of hint-map iteration order.
        for field in FILL_ORDER {
            let Some(hint) = target.selectors.get(field.key()) else {
                continue;
            };
            for selector in hint.candidates() {
                let found = session.query_selector(selector).await?;
                if let Some(element) = first_text_control(&found) {
                    if claimed.try_claim(field, element) {
                        pairs.push((field, element.clone()));
                    }
                    break;
                }
            }
        }
        Ok(pairs)
    }

    /// Strategy 2: `<label for=...>` text matched against the keyword table.
    async fn discover_labels(
        &self,
        session: &dyn PageSession,
    ) -> Result<Vec<(CanonicalField, ElementInfo)>, DriverError> {
        let labels = session.query_selector("label").await?;
        let mut pairs = Vec::new();
        let mut claimed = Claimed::new();

        for label in labels {
            let for_id = label.attr("for");
            if for_id.is_empty() {
                continue;
            }
            let Some(field) = CanonicalField::match_text(&label.text) else {
                continue;
            };

            let found = session.query_selector(&format!("#{}", for_id)).await?;
            if let Some(element) = first_text_control(&found) {
                if claimed.try_claim(field, element) {
                    pairs.push((field, element.clone()));
                }
            }
        }
        Ok(pairs)
    }

    /// Strategy 3: placeholder/name/id attribute text against the same table.
    async fn discover_attributes(
        &self,
        session: &dyn PageSession,
    ) -> Result<Vec<(CanonicalField, ElementInfo)>, DriverError> {
        let controls = session.query_selector("input, textarea, select").await?;
        let mut pairs = Vec::new();
        let mut claimed = Claimed::new();

        for element in &controls {
            if !element.visible || !element.is_text_control() {
                continue;
            }
            let matched = [element.attr("placeholder"), element.attr("name"), element.attr("id")]
                .into_iter()
                .find_map(CanonicalField::match_text);

            if let Some(field) = matched {
                if claimed.try_claim(field, element) {
                    pairs.push((field, element.clone()));
                }
            }
        }
        Ok(pairs)
    }

    /// Strategy 4: last resort, visible text inputs in document order paired
    /// with the canonical field order.
    async fn discover_positional(
        &self,
        session: &dyn PageSession,
        record: &BusinessRecord,
    ) -> Result<Vec<(CanonicalField, ElementInfo)>, DriverError> {
        let controls = session.query_selector("input, textarea").await?;
        let visible: Vec<&ElementInfo> = controls
            .iter()
            .filter(|e| e.visible && e.is_text_control())
            .collect();

        let ordered_values: Vec<CanonicalField> = FILL_ORDER
            .into_iter()
            .filter(|f| !f.value(record).is_empty())
            .collect();

        Ok(ordered_values
            .into_iter()
            .zip(visible.into_iter())
            .map(|(field, element)| (field, element.clone()))
            .collect())
    }
}

/// Tracks claims so one strategy never assigns two fields to one element or
/// one field to two elements.
struct Claimed {
    fields: HashSet<CanonicalField>,
    elements: HashSet<String>,
}

impl Claimed {
    fn new() -> Self {
        Self {
            fields: HashSet::new(),
            elements: HashSet::new(),
        }
    }

    fn try_claim(&mut self, field: CanonicalField, element: &ElementInfo) -> bool {
        let element_key = element_identity(element);
        if self.fields.contains(&field) || self.elements.contains(&element_key) {
            return false;
        }
        self.fields.insert(field);
        self.elements.insert(element_key);
        true
    }
}

fn element_identity(element: &ElementInfo) -> String {
    let id = element.attr("id");
    if !id.is_empty() {
        return format!("#{}", id);
    }
    format!("@{:.1},{:.1}", element.center.0, element.center.1)
}

/// First visible fillable control in a query result.
fn first_text_control(elements: &[ElementInfo]) -> Option<&ElementInfo> {
    elements.iter().find(|e| e.visible && e.is_text_control())
}

/// Walk the pointer along a synthesized path to an element and click it.
/// Returns the pointer's final position.
pub(crate) async fn glide_and_click(
    session: &dyn PageSession,
    synth: &mut BehaviorSynthesizer,
    from: Point,
    element: &ElementInfo,
) -> Result<Point, DriverError> {
    let to = Point::new(element.center.0, element.center.1);
    let path = synth.mouse_path(from, to);

    for waypoint in &path.waypoints {
        tokio::time::sleep(Duration::from_millis(waypoint.delay_ms)).await;
        session.dispatch_mouse_move(waypoint.x, waypoint.y).await?;
    }
    session.dispatch_click(to.x, to.y).await?;
    Ok(to)
}

/// Replay a typing plan into the focused element.
pub(crate) async fn type_value(
    session: &dyn PageSession,
    synth: &mut BehaviorSynthesizer,
    text: &str,
    error_rate: f64,
) -> Result<(), DriverError> {
    let plan = synth.typing_plan(text, error_rate);
    for step in &plan.steps {
        tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        match step.action {
            TypingAction::Type { char } => {
                session.dispatch_keystroke(Keystroke::Char(char)).await?;
            }
            TypingAction::Backspace => {
                session.dispatch_keystroke(Keystroke::Backspace).await?;
            }
            TypingAction::Wait => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sim::{ScriptedSite, SimField, SimulatedDriver};
    use crate::driver::BrowserDriver;
    use crate::fingerprint::FingerprintGenerator;
    use crate::model::{sample_record, TargetCatalog};

    fn target_with_selectors(selectors: &[(&str, &str)]) -> DirectoryTarget {
        let json = serde_json::json!({
            "targets": [{
                "id": "dir",
                "name": "Dir",
                "url": "https://dir.example/submit",
                "difficulty": "easy",
                "automatable": true,
                "selectors": selectors
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
                    .collect::<serde_json::Map<_, _>>(),
            }]
        });
        let catalog: TargetCatalog = serde_json::from_value(json).unwrap();
        catalog.targets.into_iter().next().unwrap()
    }

    async fn session_for(
        driver: &SimulatedDriver,
        host: &str,
    ) -> Box<dyn crate::driver::PageSession> {
        let profile = FingerprintGenerator::with_seed(1).generate();
        let session = driver.launch(&profile).await.unwrap();
        session.goto(&format!("https://{}/submit", host)).await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_selectors_win_when_configured() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "dir.example",
            ScriptedSite::form(vec![
                SimField::text("biz-name"),
                SimField::text("biz-phone").input_type("tel"),
            ]),
        );
        let session = session_for(&driver, "dir.example").await;
        let target = target_with_selectors(&[("name", "#biz-name"), ("phone", "#biz-phone")]);

        let chain = FormFillStrategyChain::new(0.0);
        let mut synth = BehaviorSynthesizer::with_seed(2);
        let record = sample_record();
        let outcome = chain
            .fill(session.as_ref(), &mut synth, &record, &target, Point::new(10.0, 10.0))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Some(FillStrategy::ExplicitSelectors));
        assert_eq!(outcome.fields_filled, 2);
        assert_eq!(driver.typed_value("dir.example", "biz-name").unwrap(), "Acme Plumbing");
        assert_eq!(driver.typed_value("dir.example", "biz-phone").unwrap(), "555-0142");
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_page_falls_through_to_attribute_strategy() {
        // No explicit hints, no labels: strategies 1 and 2 must both report
        // zero and the chain must still fill via strategy 3.
        let driver = SimulatedDriver::new();
        driver.insert(
            "dir.example",
            ScriptedSite::form(vec![
                SimField::text("a").placeholder("Business Name"),
                SimField::text("b").placeholder("Email Address").input_type("email"),
            ]),
        );
        let session = session_for(&driver, "dir.example").await;
        let target = target_with_selectors(&[]);

        let chain = FormFillStrategyChain::new(0.0);
        let mut synth = BehaviorSynthesizer::with_seed(3);
        let record = sample_record();
        let outcome = chain
            .fill(session.as_ref(), &mut synth, &record, &target, Point::new(10.0, 10.0))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Some(FillStrategy::AttributeText));
        assert_eq!(outcome.fields_filled, 2);
        assert_eq!(
            driver.typed_value("dir.example", "b").unwrap(),
            "office@acmeplumbing.example"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_positional_fallback_uses_canonical_order() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "dir.example",
            ScriptedSite::form(vec![
                SimField::text("first"),
                SimField::text("second"),
                SimField::text("third").hidden(),
            ]),
        );
        let session = session_for(&driver, "dir.example").await;
        let target = target_with_selectors(&[]);

        let chain = FormFillStrategyChain::new(0.0);
        let mut synth = BehaviorSynthesizer::with_seed(4);
        let record = sample_record();
        let outcome = chain
            .fill(session.as_ref(), &mut synth, &record, &target, Point::new(10.0, 10.0))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Some(FillStrategy::Positional));
        assert_eq!(outcome.fields_filled, 2);
        // Canonical order: name first, phone second; the hidden input is
        // never touched.
        assert_eq!(driver.typed_value("dir.example", "first").unwrap(), "Acme Plumbing");
        assert_eq!(driver.typed_value("dir.example", "second").unwrap(), "555-0142");
        assert!(driver.typed_value("dir.example", "third").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_controls_yields_zero_without_strategy() {
        let driver = SimulatedDriver::new();
        driver.insert("dir.example", ScriptedSite::form(vec![]));
        let session = session_for(&driver, "dir.example").await;
        let target = target_with_selectors(&[]);

        let chain = FormFillStrategyChain::new(0.0);
        let mut synth = BehaviorSynthesizer::with_seed(5);
        let record = sample_record();
        let outcome = chain
            .fill(session.as_ref(), &mut synth, &record, &target, Point::new(10.0, 10.0))
            .await
            .unwrap();

        assert_eq!(outcome.fields_filled, 0);
        assert!(outcome.strategy.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_typos_still_render_exact_values() {
        let driver = SimulatedDriver::new();
        driver.insert(
            "dir.example",
            ScriptedSite::form(vec![SimField::text("biz").label("Business Name")]),
        );
        let session = session_for(&driver, "dir.example").await;
        let target = target_with_selectors(&[]);

        // Maximum typo rate: every character gets a wrong keystroke plus a
        // correction, and the rendered value must still be exact.
        let chain = FormFillStrategyChain::new(1.0);
        let mut synth = BehaviorSynthesizer::with_seed(6);
        let record = sample_record();
        let outcome = chain
            .fill(session.as_ref(), &mut synth, &record, &target, Point::new(10.0, 10.0))
            .await
            .unwrap();

        assert_eq!(outcome.strategy, Some(FillStrategy::LabelText));
        assert_eq!(driver.typed_value("dir.example", "biz").unwrap(), "Acme Plumbing");
    }
}
