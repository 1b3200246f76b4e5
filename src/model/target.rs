//! Directory target catalog
//!
//! Read-only configuration describing each third-party directory the engine
//! can submit to, including per-site selector hints for the form filler.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How hostile a directory historically is toward automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A selector hint: either a single CSS selector or an ordered list of
/// fallbacks tried in sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorHint {
    One(String),
    Many(Vec<String>),
}

impl SelectorHint {
    /// All candidate selectors, in priority order.
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            SelectorHint::One(s) => vec![s.as_str()],
            SelectorHint::Many(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

/// One directory site the orchestrator can run against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryTarget {
    pub id: String,
    pub name: String,
    pub url: String,
    pub difficulty: Difficulty,
    pub automatable: bool,
    #[serde(default)]
    pub requires_verification: bool,
    /// Optional explicit field selectors, keyed by canonical field name
    /// ("name", "phone", "street", ...). First strategy in the fill chain.
    #[serde(default)]
    pub selectors: HashMap<String, SelectorHint>,
}

impl DirectoryTarget {
    /// Hostname used as the rate-limiter key.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| {
                warn!("Target {} has unparseable url {:?}", self.id, self.url);
                self.url.clone()
            })
    }
}

/// The full set of configured targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetCatalog {
    pub targets: Vec<DirectoryTarget>,
}

impl TargetCatalog {
    /// Load the catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read target catalog {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse target catalog {}: {}", path.display(), e))
    }

    /// Look up a target by id.
    pub fn find(&self, id: &str) -> Option<&DirectoryTarget> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// All targets marked automatable.
    pub fn automatable(&self) -> Vec<&DirectoryTarget> {
        self.targets.iter().filter(|t| t.automatable).collect()
    }

    /// Automatable targets that are also low-risk: easy difficulty and no
    /// out-of-band verification step.
    pub fn safe_only(&self) -> Vec<&DirectoryTarget> {
        self.targets
            .iter()
            .filter(|t| t.automatable && t.difficulty == Difficulty::Easy && !t.requires_verification)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_hint_accepts_string_or_list() {
        let json = r##"{
            "targets": [{
                "id": "localdir",
                "name": "LocalDir",
                "url": "https://localdir.example/submit",
                "difficulty": "easy",
                "automatable": true,
                "selectors": {
                    "name": "#business-name",
                    "phone": ["#phone", "input[name='tel']"]
                }
            }]
        }"##;

        let catalog: TargetCatalog = serde_json::from_str(json).unwrap();
        let target = catalog.find("localdir").unwrap();
        assert_eq!(target.host(), "localdir.example");
        assert_eq!(target.selectors["name"].candidates(), vec!["#business-name"]);
        assert_eq!(target.selectors["phone"].candidates().len(), 2);
    }

    #[test]
    fn test_safe_only_excludes_hard_and_verified() {
        let mk = |id: &str, difficulty, automatable, verification| DirectoryTarget {
            id: id.to_string(),
            name: id.to_string(),
            url: format!("https://{}.example", id),
            difficulty,
            automatable,
            requires_verification: verification,
            selectors: HashMap::new(),
        };

        let catalog = TargetCatalog {
            targets: vec![
                mk("a", Difficulty::Easy, true, false),
                mk("b", Difficulty::Hard, true, false),
                mk("c", Difficulty::Easy, true, true),
                mk("d", Difficulty::Easy, false, false),
            ],
        };

        let safe: Vec<&str> = catalog.safe_only().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(safe, vec!["a"]);
    }
}
