//! Fingerprint profile data and the base archetype catalog.

use serde::{Deserialize, Serialize};

/// Reported screen geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
}

/// A consistent synthetic browser identity.
///
/// Immutable once created; the generator is the only constructor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub platform: String,
    pub vendor: String,
    pub languages: Vec<String>,
    pub screen: ScreenGeometry,
    pub hardware_concurrency: u32,
    pub device_memory_gb: u32,
    pub timezone: String,
    /// Seed for deterministic canvas readback noise.
    pub canvas_noise_seed: u64,
    /// Seed for deterministic WebGL parameter noise, independent of canvas.
    pub webgl_noise_seed: u64,
}

impl FingerprintProfile {
    /// Primary Accept-Language value.
    pub fn primary_language(&self) -> &str {
        self.languages.first().map(String::as_str).unwrap_or("en-US")
    }
}

impl std::fmt::Display for FingerprintProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} cores={} tz={}",
            self.platform,
            self.screen.width,
            self.screen.height,
            self.hardware_concurrency,
            self.timezone
        )
    }
}

/// Base OS x browser combination the generator perturbs.
///
/// Locale and timezone live here, on the archetype, so they can never drift
/// apart inside one generated profile.
#[derive(Debug, Clone, Copy)]
pub struct Archetype {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub platform: &'static str,
    pub vendor: &'static str,
    pub languages: &'static [&'static str],
    pub base_screen: (u32, u32),
    pub base_cores: u32,
    pub memory_gb: u32,
    pub timezone: &'static str,
}

/// The archetype catalog. Kept to common desktop configurations: rare
/// combinations are themselves a fingerprinting signal.
pub const ARCHETYPES: &[Archetype] = &[
    Archetype {
        name: "windows-chrome",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Win32",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        base_screen: (1920, 1080),
        base_cores: 8,
        memory_gb: 8,
        timezone: "America/New_York",
    },
    Archetype {
        name: "windows-edge",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        platform: "Win32",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        base_screen: (1920, 1080),
        base_cores: 12,
        memory_gb: 16,
        timezone: "America/Chicago",
    },
    Archetype {
        name: "mac-chrome",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "MacIntel",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        base_screen: (2560, 1600),
        base_cores: 10,
        memory_gb: 16,
        timezone: "America/Los_Angeles",
    },
    Archetype {
        name: "mac-safari",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        platform: "MacIntel",
        vendor: "Apple Computer, Inc.",
        languages: &["en-US", "en"],
        base_screen: (2560, 1600),
        base_cores: 8,
        memory_gb: 16,
        timezone: "America/Denver",
    },
    Archetype {
        name: "linux-chrome",
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        vendor: "Google Inc.",
        languages: &["en-US", "en"],
        base_screen: (1920, 1080),
        base_cores: 8,
        memory_gb: 8,
        timezone: "America/New_York",
    },
];
