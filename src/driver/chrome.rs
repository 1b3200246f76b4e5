//! Chromium-backed browser driver
//!
//! Applies the session fingerprint through CDP-level overrides only (user
//! agent, accept-language, device metrics, timezone). CDP overrides act at
//! the engine level and stay invisible to JavaScript inspection, unlike
//! prototype patching, which anti-bot scripts look for.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BrowserDriver, DriverError, ElementInfo, Keystroke, PageSession};
use crate::fingerprint::FingerprintProfile;

/// Chromium launch configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromeDriverConfig {
    /// Path to the Chrome/Chromium executable; autodetected when unset.
    pub chrome_path: Option<String>,
    /// Run without a visible window.
    pub headless: bool,
    /// Seconds to wait for navigations to settle.
    pub nav_settle_timeout_secs: u64,
}

impl Default for ChromeDriverConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            nav_settle_timeout_secs: 60,
        }
    }
}

/// Driver that launches one Chromium instance per session.
pub struct ChromeDriver {
    config: ChromeDriverConfig,
}

impl ChromeDriver {
    pub fn new(config: ChromeDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn launch(
        &self,
        profile: &FingerprintProfile,
    ) -> Result<Box<dyn PageSession>, DriverError> {
        let user_data_dir = std::env::temp_dir()
            .join("dirpilot")
            .join("browser_data")
            .join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&user_data_dir)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&user_data_dir)
            .window_size(profile.screen.width, profile.screen.height)
            // Anti-detection launch flags (undetected-chromedriver style).
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-default-browser-check")
            .arg("--disable-features=TranslateUI,IsolateOrigins,site-per-process")
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-notifications")
            .arg("--disable-domain-reliability")
            .arg("--disable-component-update")
            // Required when running as root (e.g. in Docker or on a VPS).
            .arg("--no-sandbox");

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .build()
            .map_err(DriverError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        // When the handler stream ends, Chromium has disconnected.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("Chromium event handler ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

        apply_fingerprint(&page, profile).await?;

        info!("Chromium session launched with fingerprint {}", profile);

        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task,
            nav_settle_timeout: Duration::from_secs(self.config.nav_settle_timeout_secs),
        }))
    }
}

/// Apply the synthetic identity through CDP overrides.
async fn apply_fingerprint(page: &Page, profile: &FingerprintProfile) -> Result<(), DriverError> {
    let user_agent = SetUserAgentOverrideParams::builder()
        .user_agent(&profile.user_agent)
        .accept_language(profile.primary_language())
        .platform(&profile.platform)
        .build()
        .map_err(DriverError::LaunchFailed)?;
    page.execute(user_agent)
        .await
        .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(profile.screen.width as i64)
        .height(profile.screen.height as i64)
        .device_scale_factor(1.0)
        .mobile(false)
        .screen_width(profile.screen.width as i64)
        .screen_height(profile.screen.height as i64)
        .build()
        .map_err(DriverError::LaunchFailed)?;
    page.execute(metrics)
        .await
        .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

    page.execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
        .await
        .map_err(|e| DriverError::LaunchFailed(e.to_string()))?;

    Ok(())
}

/// One live Chromium page.
struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    nav_settle_timeout: Duration,
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;

        tokio::time::timeout(self.nav_settle_timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| DriverError::Timeout("navigation settle timeout".into()))?
            .map_err(|e| DriverError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::ConnectionLost(e.to_string()))
    }

    async fn query_selector(&self, selector: &str) -> Result<Vec<ElementInfo>, DriverError> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                debug!("Selector {:?} matched nothing: {}", selector, e);
                return Ok(Vec::new());
            }
        };

        let mut infos = Vec::with_capacity(elements.len());
        for element in elements {
            let description = match element.description().await {
                Ok(node) => node,
                Err(e) => {
                    warn!("Failed to describe element for {:?}: {}", selector, e);
                    continue;
                }
            };

            let mut attrs = HashMap::new();
            if let Some(pairs) = description.attributes {
                for chunk in pairs.chunks(2) {
                    if let [name, value] = chunk {
                        attrs.insert(name.clone(), value.clone());
                    }
                }
            }

            let text = element
                .inner_text()
                .await
                .ok()
                .flatten()
                .unwrap_or_default();

            // Detached or zero-sized elements have no clickable point.
            let (center, visible) = match element.clickable_point().await {
                Ok(point) => ((point.x, point.y), true),
                Err(_) => ((0.0, 0.0), false),
            };

            infos.push(ElementInfo {
                tag: description.node_name.to_lowercase(),
                attrs,
                text,
                center,
                visible,
            });
        }
        Ok(infos)
    }

    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(DriverError::DispatchFailed)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| DriverError::DispatchFailed(e.to_string()))?;
        Ok(())
    }

    async fn dispatch_click(&self, x: f64, y: f64) -> Result<(), DriverError> {
        for event_type in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(event_type)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(DriverError::DispatchFailed)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| DriverError::DispatchFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn dispatch_keystroke(&self, key: Keystroke) -> Result<(), DriverError> {
        match key {
            Keystroke::Char(c) => {
                let params = DispatchKeyEventParams::builder()
                    .r#type(DispatchKeyEventType::Char)
                    .text(c.to_string())
                    .build()
                    .map_err(DriverError::DispatchFailed)?;
                self.page
                    .execute(params)
                    .await
                    .map_err(|e| DriverError::DispatchFailed(e.to_string()))?;
            }
            Keystroke::Backspace => self.press_key("Backspace", 8).await?,
            Keystroke::Enter => self.press_key("Enter", 13).await?,
            Keystroke::Tab => self.press_key("Tab", 9).await?,
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| DriverError::ScreenshotFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), DriverError> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("Browser close reported: {}", e);
            }
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        Ok(())
    }
}

impl ChromeSession {
    /// Full key-down/key-up cycle for non-character keys.
    async fn press_key(&self, key: &str, virtual_key_code: i64) -> Result<(), DriverError> {
        for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key)
                .windows_virtual_key_code(virtual_key_code)
                .native_virtual_key_code(virtual_key_code)
                .build()
                .map_err(DriverError::DispatchFailed)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| DriverError::DispatchFailed(e.to_string()))?;
        }
        Ok(())
    }
}
