//! Defense classification types

use serde::{Deserialize, Serialize};

/// The defense families the detector can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefenseKind {
    None,
    CaptchaRecaptcha,
    CaptchaHCaptcha,
    CaptchaText,
    ChallengeCloudflare,
    Unknown,
}

impl DefenseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefenseKind::None => "none",
            DefenseKind::CaptchaRecaptcha => "recaptcha",
            DefenseKind::CaptchaHCaptcha => "hcaptcha",
            DefenseKind::CaptchaText => "text-captcha",
            DefenseKind::ChallengeCloudflare => "cloudflare-challenge",
            DefenseKind::Unknown => "unknown",
        }
    }
}

/// The result of one page inspection.
///
/// Computed fresh on every inspection; never cached across navigations,
/// because defenses may appear only after interaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefenseVerdict {
    pub kind: DefenseKind,
    /// The defense cleared on its own during the grace recheck.
    pub auto_resolved: bool,
    /// The attempt cannot proceed without human follow-up.
    pub requires_manual: bool,
}

impl DefenseVerdict {
    pub fn clear() -> Self {
        Self {
            kind: DefenseKind::None,
            auto_resolved: false,
            requires_manual: false,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.requires_manual
    }
}
