//! Simulated browser driver
//!
//! In-process driver that serves scripted pages. Powers `--dry-run` (the full
//! pipeline runs with zero network traffic) and the end-to-end tests. Pages
//! are described as a flat field list; the session answers selector queries,
//! tracks focus from click coordinates, and applies keystrokes to the focused
//! field, so the replay contract of typing plans is exercised for real.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use super::{BrowserDriver, DriverError, ElementInfo, Keystroke, PageSession};
use crate::fingerprint::FingerprintProfile;

/// Distance within which a click lands on an element.
const CLICK_TOLERANCE: f64 = 25.0;

/// Minimal valid 1x1 PNG, used as the screenshot payload.
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// One scripted form control.
#[derive(Debug, Clone)]
pub struct SimField {
    pub id: String,
    pub tag: String,
    pub input_type: String,
    pub name: String,
    pub placeholder: String,
    pub label: Option<String>,
    pub visible: bool,
}

impl SimField {
    /// A visible text input with the given element id.
    pub fn text(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tag: "input".to_string(),
            input_type: "text".to_string(),
            name: String::new(),
            placeholder: String::new(),
            label: None,
            visible: true,
        }
    }

    pub fn input_type(mut self, ty: &str) -> Self {
        self.input_type = ty.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = placeholder.to_string();
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// A scripted site: what the session serves for one hostname.
#[derive(Debug, Clone)]
pub struct ScriptedSite {
    /// Markup served once any interstitial has cleared.
    pub form_html: String,
    /// Markup served before the form, when present.
    pub interstitial_html: Option<String>,
    /// Whether the interstitial clears after one re-inspection.
    pub interstitial_clears: bool,
    /// Markup served after the submit control is clicked.
    pub post_submit_html: String,
    pub fields: Vec<SimField>,
    /// Element id of the submit control.
    pub submit_id: String,
    /// Number of navigations that fail before one succeeds.
    pub nav_failures_before_load: u32,
}

impl ScriptedSite {
    /// A plain form page with the given fields and a submit button.
    pub fn form(fields: Vec<SimField>) -> Self {
        Self {
            form_html: "<html><body><form id=\"listing\">scripted form</form></body></html>".to_string(),
            interstitial_html: None,
            interstitial_clears: false,
            post_submit_html:
                "<html><body><h1>Thank you! Your listing has been received.</h1></body></html>"
                    .to_string(),
            fields,
            submit_id: "submit".to_string(),
            nav_failures_before_load: 0,
        }
    }

    pub fn with_form_html(mut self, html: &str) -> Self {
        self.form_html = html.to_string();
        self
    }

    pub fn with_post_submit_html(mut self, html: &str) -> Self {
        self.post_submit_html = html.to_string();
        self
    }

    pub fn with_interstitial(mut self, html: &str, clears: bool) -> Self {
        self.interstitial_html = Some(html.to_string());
        self.interstitial_clears = clears;
        self
    }

    pub fn with_nav_failures(mut self, failures: u32) -> Self {
        self.nav_failures_before_load = failures;
        self
    }

    /// The standard labeled listing form used by dry runs: every canonical
    /// business field reachable through label-text matching.
    pub fn generic_listing_form() -> Self {
        Self::form(vec![
            SimField::text("f-name").label("Business Name"),
            SimField::text("f-phone").input_type("tel").label("Phone Number"),
            SimField::text("f-street").label("Street Address"),
            SimField::text("f-city").label("City"),
            SimField::text("f-state").label("State"),
            SimField::text("f-zip").label("ZIP Code"),
            SimField::text("f-email").input_type("email").label("Email Address"),
            SimField::text("f-website").input_type("url").label("Website"),
            SimField::text("f-description").label("Business Description"),
        ])
    }
}

/// Mutable per-site runtime state shared between driver and sessions.
struct SiteState {
    site: ScriptedSite,
    values: Mutex<HashMap<String, String>>,
    focused: Mutex<Option<String>>,
    submitted: AtomicBool,
    content_serves: AtomicU32,
    remaining_nav_failures: AtomicU32,
    screenshots: AtomicU32,
}

impl SiteState {
    fn new(site: ScriptedSite) -> Self {
        let failures = site.nav_failures_before_load;
        Self {
            site,
            values: Mutex::new(HashMap::new()),
            focused: Mutex::new(None),
            submitted: AtomicBool::new(false),
            content_serves: AtomicU32::new(0),
            remaining_nav_failures: AtomicU32::new(failures),
            screenshots: AtomicU32::new(0),
        }
    }

    fn interstitial_blocking(&self) -> bool {
        match self.site.interstitial_html {
            None => false,
            // A clearing interstitial is gone once it has been served and
            // re-inspected (two content reads).
            Some(_) => !self.site.interstitial_clears || self.content_serves.load(Ordering::SeqCst) < 2,
        }
    }

    /// All elements currently on the page, with deterministic layout.
    fn elements(&self) -> Vec<(ElementInfo, ElementRole)> {
        if self.submitted.load(Ordering::SeqCst) || self.interstitial_blocking() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for (i, field) in self.site.fields.iter().enumerate() {
            let y = 140.0 + 64.0 * i as f64;

            let mut attrs = HashMap::new();
            attrs.insert("id".to_string(), field.id.clone());
            if field.tag == "input" {
                attrs.insert("type".to_string(), field.input_type.clone());
            }
            if !field.name.is_empty() {
                attrs.insert("name".to_string(), field.name.clone());
            }
            if !field.placeholder.is_empty() {
                attrs.insert("placeholder".to_string(), field.placeholder.clone());
            }

            out.push((
                ElementInfo {
                    tag: field.tag.clone(),
                    attrs,
                    text: String::new(),
                    center: (400.0, y),
                    visible: field.visible,
                },
                ElementRole::Field(field.id.clone()),
            ));

            if let Some(ref label) = field.label {
                let mut label_attrs = HashMap::new();
                label_attrs.insert("for".to_string(), field.id.clone());
                out.push((
                    ElementInfo {
                        tag: "label".to_string(),
                        attrs: label_attrs,
                        text: label.clone(),
                        center: (200.0, y),
                        visible: true,
                    },
                    ElementRole::Label,
                ));
            }
        }

        let mut submit_attrs = HashMap::new();
        submit_attrs.insert("id".to_string(), self.site.submit_id.clone());
        submit_attrs.insert("type".to_string(), "submit".to_string());
        out.push((
            ElementInfo {
                tag: "button".to_string(),
                attrs: submit_attrs,
                text: "Submit".to_string(),
                center: (400.0, 140.0 + 64.0 * self.site.fields.len() as f64),
                visible: true,
            },
            ElementRole::Submit,
        ));

        out
    }
}

#[derive(Debug, Clone)]
enum ElementRole {
    Field(String),
    Label,
    Submit,
}

/// The simulated driver. Hosts are registered up front; launched sessions
/// resolve them at navigation time.
pub struct SimulatedDriver {
    sites: Arc<DashMap<String, Arc<SiteState>>>,
    launches: AtomicU32,
}

impl SimulatedDriver {
    pub fn new() -> Self {
        Self {
            sites: Arc::new(DashMap::new()),
            launches: AtomicU32::new(0),
        }
    }

    /// Register a scripted site for a hostname.
    pub fn insert(&self, host: &str, site: ScriptedSite) {
        self.sites.insert(host.to_string(), Arc::new(SiteState::new(site)));
    }

    /// Value typed into a field so far (tests and dry-run reporting).
    pub fn typed_value(&self, host: &str, field_id: &str) -> Option<String> {
        self.sites
            .get(host)
            .and_then(|s| s.values.lock().get(field_id).cloned())
    }

    /// Whether the submit control was clicked.
    pub fn submitted(&self, host: &str) -> bool {
        self.sites
            .get(host)
            .map(|s| s.submitted.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Screenshots captured against a host.
    pub fn screenshot_count(&self, host: &str) -> u32 {
        self.sites
            .get(host)
            .map(|s| s.screenshots.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Sessions launched so far.
    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for SimulatedDriver {
    async fn launch(
        &self,
        profile: &FingerprintProfile,
    ) -> Result<Box<dyn PageSession>, DriverError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        debug!("Simulated session launched with fingerprint {}", profile);

        Ok(Box::new(SimulatedSession {
            sites: self.sites.clone(),
            current: Mutex::new(None),
        }))
    }
}

/// One simulated page session.
struct SimulatedSession {
    sites: Arc<DashMap<String, Arc<SiteState>>>,
    current: Mutex<Option<Arc<SiteState>>>,
}

impl SimulatedSession {
    fn site(&self) -> Result<Arc<SiteState>, DriverError> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| DriverError::ConnectionLost("No page loaded".into()))
    }
}

#[async_trait]
impl PageSession for SimulatedSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        let state = self
            .sites
            .get(&host)
            .map(|s| s.clone())
            .ok_or_else(|| DriverError::NavigationFailed(format!("No scripted site for {}", host)))?;

        let remaining = state.remaining_nav_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            state.remaining_nav_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::NavigationFailed(format!(
                "Scripted connection reset ({} left)",
                remaining - 1
            )));
        }

        *self.current.lock() = Some(state);
        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        let state = self.site()?;
        if state.submitted.load(Ordering::SeqCst) {
            return Ok(state.site.post_submit_html.clone());
        }

        let serve = state.content_serves.fetch_add(1, Ordering::SeqCst);
        if let Some(ref interstitial) = state.site.interstitial_html {
            if serve == 0 || !state.site.interstitial_clears {
                return Ok(interstitial.clone());
            }
        }
        Ok(state.site.form_html.clone())
    }

    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementInfo>, DriverError> {
        let state = self.site()?;
        Ok(state
            .elements()
            .into_iter()
            .filter(|(el, _)| selector_matches(el, selector))
            .map(|(el, _)| el)
            .collect())
    }

    async fn dispatch_mouse_move(&self, _x: f64, _y: f64) -> Result<(), DriverError> {
        self.site()?;
        Ok(())
    }

    async fn dispatch_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let state = self.site()?;

        let hit = state
            .elements()
            .into_iter()
            .filter(|(el, _)| el.visible)
            .min_by(|(a, _), (b, _)| {
                distance(a.center, (x, y))
                    .partial_cmp(&distance(b.center, (x, y)))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        if let Some((el, role)) = hit {
            if distance(el.center, (x, y)) <= CLICK_TOLERANCE {
                match role {
                    ElementRole::Field(id) => {
                        *state.focused.lock() = Some(id);
                    }
                    ElementRole::Submit => {
                        state.submitted.store(true, Ordering::SeqCst);
                        *state.focused.lock() = None;
                    }
                    ElementRole::Label => {}
                }
            }
        }
        Ok(())
    }

    async fn dispatch_keystroke(&self, key: Keystroke) -> Result<(), DriverError> {
        let state = self.site()?;
        let focused = state.focused.lock().clone();
        let Some(field_id) = focused else {
            return Ok(());
        };

        let mut values = state.values.lock();
        let value = values.entry(field_id).or_default();
        match key {
            Keystroke::Char(c) => value.push(c),
            Keystroke::Backspace => {
                value.pop();
            }
            Keystroke::Enter | Keystroke::Tab => {}
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        if let Ok(state) = self.site() {
            state.screenshots.fetch_add(1, Ordering::SeqCst);
        }
        Ok(BLANK_PNG.to_vec())
    }

    async fn close(&self) -> Result<(), DriverError> {
        *self.current.lock() = None;
        Ok(())
    }
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Match one element against a comma-separated CSS selector list.
///
/// Supports the subset the engine emits: tag names, `#id`, and `[attr]` /
/// `[attr=value]` clauses (quoted or bare). Unsupported syntax fails the
/// match rather than erroring.
fn selector_matches(el: &ElementInfo, selector: &str) -> bool {
    selector.split(',').any(|s| simple_selector_matches(el, s.trim()))
}

fn simple_selector_matches(el: &ElementInfo, selector: &str) -> bool {
    if selector.is_empty() {
        return false;
    }

    let mut rest = selector;

    // Leading tag name.
    let tag_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && tag != el.tag {
        return false;
    }
    rest = &rest[tag_end..];

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('#') {
            let id_end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                .unwrap_or(after.len());
            if el.attr("id") != &after[..id_end] {
                return false;
            }
            rest = &after[id_end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let Some(close) = after.find(']') else {
                return false;
            };
            let clause = &after[..close];
            let matched = match clause.split_once('=') {
                Some((attr, value)) => {
                    let value = value.trim_matches(|c| c == '\'' || c == '"');
                    el.attrs.get(attr.trim()).map(String::as_str) == Some(value)
                }
                None => el.attrs.contains_key(clause.trim()),
            };
            if !matched {
                return false;
            }
            rest = &after[close + 1..];
        } else {
            // Classes, pseudo-selectors, combinators: unsupported.
            return false;
        }
    }

    true
}
