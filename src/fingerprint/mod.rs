//! Synthetic browser identity generation
//!
//! Every browser session owns exactly one [`FingerprintProfile`] for its whole
//! lifetime. Profiles are regenerated per attempt from a small archetype
//! catalog with randomized deltas, so no two sessions present the same
//! identity while each individual identity stays internally consistent
//! (timezone, locale and platform always move together).

mod generator;
mod profile;

pub use generator::FingerprintGenerator;
pub use profile::{Archetype, FingerprintProfile, ScreenGeometry};
