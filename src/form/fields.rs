//! Canonical form fields and the keyword table
//!
//! Field identity is a real enum rather than duck-typed strings: the
//! text-matching heuristics live here, decoupled from the fill logic that
//! consumes their results.

use serde::{Deserialize, Serialize};

use crate::model::BusinessRecord;

/// The fields a directory form can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Name,
    Phone,
    Street,
    City,
    State,
    Zip,
    Email,
    Website,
    Description,
}

/// Canonical ordering, used by the positional fallback strategy.
pub const FILL_ORDER: [CanonicalField; 9] = [
    CanonicalField::Name,
    CanonicalField::Phone,
    CanonicalField::Street,
    CanonicalField::City,
    CanonicalField::State,
    CanonicalField::Zip,
    CanonicalField::Email,
    CanonicalField::Website,
    CanonicalField::Description,
];

/// Keyword table, most specific patterns first. "email" must precede
/// "address" so that "Email Address" does not land on the street field, and
/// "description" must precede "name" for "Business Description".
const KEYWORDS: &[(&str, CanonicalField)] = &[
    ("e-mail", CanonicalField::Email),
    ("email", CanonicalField::Email),
    ("website", CanonicalField::Website),
    ("web site", CanonicalField::Website),
    ("url", CanonicalField::Website),
    ("homepage", CanonicalField::Website),
    ("phone", CanonicalField::Phone),
    ("telephone", CanonicalField::Phone),
    ("mobile", CanonicalField::Phone),
    ("tel", CanonicalField::Phone),
    ("zip", CanonicalField::Zip),
    ("postal", CanonicalField::Zip),
    ("postcode", CanonicalField::Zip),
    ("city", CanonicalField::City),
    ("town", CanonicalField::City),
    ("state", CanonicalField::State),
    ("province", CanonicalField::State),
    ("region", CanonicalField::State),
    ("street", CanonicalField::Street),
    ("address", CanonicalField::Street),
    ("description", CanonicalField::Description),
    ("about", CanonicalField::Description),
    ("overview", CanonicalField::Description),
    ("business name", CanonicalField::Name),
    ("company", CanonicalField::Name),
    ("listing", CanonicalField::Name),
    ("name", CanonicalField::Name),
];

impl CanonicalField {
    /// Stable key used in target selector-hint maps and reports.
    pub fn key(&self) -> &'static str {
        match self {
            CanonicalField::Name => "name",
            CanonicalField::Phone => "phone",
            CanonicalField::Street => "street",
            CanonicalField::City => "city",
            CanonicalField::State => "state",
            CanonicalField::Zip => "zip",
            CanonicalField::Email => "email",
            CanonicalField::Website => "website",
            CanonicalField::Description => "description",
        }
    }

    /// Resolve a selector-hint key back to a field.
    pub fn from_key(key: &str) -> Option<Self> {
        FILL_ORDER.iter().copied().find(|f| f.key() == key)
    }

    /// Classify free text (label text, placeholder, attribute value) against
    /// the keyword table. First hit wins.
    pub fn match_text(text: &str) -> Option<Self> {
        let normalized = text.to_lowercase();
        let normalized = normalized.trim();
        if normalized.is_empty() {
            return None;
        }
        KEYWORDS
            .iter()
            .find(|(keyword, _)| normalized.contains(keyword))
            .map(|(_, field)| *field)
    }

    /// The record value that belongs in this field.
    pub fn value<'a>(&self, record: &'a BusinessRecord) -> &'a str {
        match self {
            CanonicalField::Name => &record.business.name,
            CanonicalField::Phone => &record.contact.phone,
            CanonicalField::Street => &record.location.address.street,
            CanonicalField::City => &record.location.address.city,
            CanonicalField::State => &record.location.address.state,
            CanonicalField::Zip => &record.location.address.zip,
            CanonicalField::Email => &record.contact.email,
            CanonicalField::Website => &record.contact.website,
            CanonicalField::Description => &record.business.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_collisions_resolve_to_specific_field() {
        assert_eq!(CanonicalField::match_text("Email Address"), Some(CanonicalField::Email));
        assert_eq!(CanonicalField::match_text("Street Address"), Some(CanonicalField::Street));
        assert_eq!(CanonicalField::match_text("Business Description"), Some(CanonicalField::Description));
        assert_eq!(CanonicalField::match_text("Business Name"), Some(CanonicalField::Name));
        assert_eq!(CanonicalField::match_text("ZIP Code"), Some(CanonicalField::Zip));
        assert_eq!(CanonicalField::match_text("Phone Number"), Some(CanonicalField::Phone));
        assert_eq!(CanonicalField::match_text("Website"), Some(CanonicalField::Website));
    }

    #[test]
    fn test_unmatched_text_yields_none() {
        assert_eq!(CanonicalField::match_text("Coupon code"), None);
        assert_eq!(CanonicalField::match_text(""), None);
        assert_eq!(CanonicalField::match_text("   "), None);
    }

    #[test]
    fn test_keys_round_trip() {
        for field in FILL_ORDER {
            assert_eq!(CanonicalField::from_key(field.key()), Some(field));
        }
        assert_eq!(CanonicalField::from_key("fax"), None);
    }
}
