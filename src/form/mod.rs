//! Form field discovery and filling
//!
//! Maps a business record onto arbitrary directory forms through a cascade of
//! discovery strategies, then populates every matched field with synthesized
//! keystrokes.

mod chain;
mod fields;

pub use chain::{FillOutcome, FillStrategy, FormFillStrategyChain};
pub use fields::CanonicalField;

pub(crate) use chain::glide_and_click;
