//! dirpilot
//!
//! Adaptive engine for submitting structured business records into
//! third-party web directory forms: consistent synthetic fingerprints,
//! human-like input synthesis, anti-bot defense classification, per-domain
//! adaptive rate limiting, a cascading form-fill strategy chain, and an
//! append-only evidence log for every attempt.

pub mod behavior;
pub mod defense;
pub mod driver;
pub mod evidence;
pub mod fingerprint;
pub mod form;
pub mod model;
pub mod orchestrator;
pub mod rate;
pub mod stats;

use std::path::PathBuf;

use tracing::{error, info, warn};

use defense::DetectorConfig;
use orchestrator::OrchestratorConfig;
use rate::RateLimiterConfig;

/// Engine configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Directory target catalog file.
    pub targets_path: String,
    /// Business record file.
    pub record_path: String,
    /// Base directory for run evidence.
    pub evidence_dir: String,

    /// External challenge-solver API key; empty means manual-only.
    #[serde(default)]
    pub solver_api_key: String,

    /// Chromium executable path override.
    #[serde(default)]
    pub chrome_path: Option<String>,
    /// Run browsers headless.
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default)]
    pub rate: RateLimiterConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

fn default_headless() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            targets_path: "targets.json".to_string(),
            record_path: "business.json".to_string(),
            evidence_dir: "evidence".to_string(),
            solver_api_key: String::new(),
            chrome_path: None,
            headless: true,
            rate: RateLimiterConfig::default(),
            detector: DetectorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("dirpilot").join("logs"))
}

impl EngineConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dirpilot").join("config.json"))
    }

    /// Load config from file
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Initialize logging: console layer plus a daily-rolling file log when a log
/// directory is available.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "dirpilot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
