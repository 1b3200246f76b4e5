//! Browser driver capability boundary
//!
//! The engine is agnostic to the underlying automation technology: it depends
//! only on this capability set. Two implementations ship in-tree: the
//! simulated driver (dry runs, tests) and an optional Chromium adapter.

mod errors;
pub mod sim;

#[cfg(feature = "chrome")]
pub mod chrome;

pub use errors::DriverError;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::fingerprint::FingerprintProfile;

/// A key event dispatched into the focused element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    Char(char),
    Backspace,
    Enter,
    Tab,
}

/// Snapshot of a DOM element returned by [`PageSession::query_selector`].
///
/// Plain data rather than a live handle: the engine decides what to do with
/// an element from this snapshot and then acts through coordinates and
/// keystrokes, the same way a user would.
#[derive(Debug, Clone)]
pub struct ElementInfo {
    /// Lowercase tag name ("input", "label", ...).
    pub tag: String,
    /// All attributes present on the element.
    pub attrs: HashMap<String, String>,
    /// Visible text content.
    pub text: String,
    /// Center of the element's box in page coordinates.
    pub center: (f64, f64),
    /// Whether the element currently has a renderable box.
    pub visible: bool,
}

impl ElementInfo {
    /// Attribute lookup, empty string when absent.
    pub fn attr(&self, name: &str) -> &str {
        self.attrs.get(name).map(String::as_str).unwrap_or("")
    }

    /// Whether this is a fillable free-text control: a textarea, or an input
    /// whose type takes keystrokes.
    pub fn is_text_control(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                self.attr("type"),
                "" | "text" | "email" | "tel" | "url" | "search" | "number"
            ),
            _ => false,
        }
    }
}

/// One live browser page.
///
/// All operations suspend the calling task until the underlying driver
/// signals completion; none of them are fire-and-forget.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Navigate to a URL and wait for the load to settle.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Current page HTML.
    async fn content(&self) -> Result<String, DriverError>;

    /// All elements matching a CSS selector (comma lists allowed).
    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementInfo>, DriverError>;

    /// Move the pointer to page coordinates.
    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Press and release the primary button at page coordinates.
    async fn dispatch_click(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Send one key event to the focused element.
    async fn dispatch_keystroke(&self, key: Keystroke) -> Result<(), DriverError>;

    /// Capture the viewport as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Tear the session down. Idempotent.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Launches browser sessions. One fingerprint profile per session, never
/// shared and never reused.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(
        &self,
        profile: &FingerprintProfile,
    ) -> Result<Box<dyn PageSession>, DriverError>;
}
