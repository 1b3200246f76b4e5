//! Canonical business record
//!
//! Read-only input to the orchestrator. The nested shape mirrors the JSON
//! config file: `{business, contact, location}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Core business identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Opening hours keyed by day name, e.g. "monday" -> "09:00-17:00"
    #[serde(default)]
    pub hours: BTreeMap<String, String>,
}

/// Contact channels
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub website: String,
}

/// Street address components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_code: String,
    #[serde(default)]
    pub zip: String,
}

/// Physical location wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub address: Address,
}

/// The complete structured record submitted into directory forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    pub business: Business,
    pub contact: Contact,
    pub location: Location,
}

impl BusinessRecord {
    /// Load a record from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read business record {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse business record {}: {}", path.display(), e))
    }

    /// Count the fields that carry a non-empty value and could end up in a
    /// form (used for reporting expectations, not for fill logic).
    pub fn populated_field_count(&self) -> usize {
        [
            self.business.name.as_str(),
            self.contact.phone.as_str(),
            self.contact.email.as_str(),
            self.contact.website.as_str(),
            self.business.description.as_str(),
            self.location.address.street.as_str(),
            self.location.address.city.as_str(),
            self.location.address.state.as_str(),
            self.location.address.zip.as_str(),
        ]
        .iter()
        .filter(|v| !v.is_empty())
        .count()
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> BusinessRecord {
    BusinessRecord {
        business: Business {
            name: "Acme Plumbing".to_string(),
            description: "Residential plumbing and drain service".to_string(),
            categories: vec!["plumber".to_string(), "home-services".to_string()],
            hours: BTreeMap::new(),
        },
        contact: Contact {
            phone: "555-0142".to_string(),
            email: "office@acmeplumbing.example".to_string(),
            website: "https://acmeplumbing.example".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trips_nested_shape() {
        let json = r#"{
            "business": {"name": "Acme Plumbing", "description": "d", "categories": ["plumber"]},
            "contact": {"phone": "555-0142", "email": "a@b.c", "website": "https://x.example"},
            "location": {"address": {"street": "12 Canal St", "city": "Springfield",
                          "state": "Illinois", "stateCode": "IL", "zip": "62701"}}
        }"#;

        let record: BusinessRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.business.name, "Acme Plumbing");
        assert_eq!(record.location.address.state_code, "IL");
        assert_eq!(record.populated_field_count(), 9);
    }
}
