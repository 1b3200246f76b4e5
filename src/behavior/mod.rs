//! Human-like input synthesis
//!
//! Produces mouse trajectories and keystroke sequences with the timing
//! texture of a real user. All randomness flows through an injectable seeded
//! RNG so tests replay the exact same trajectories while production runs stay
//! non-deterministic.

mod mouse;
mod typing;

pub use mouse::{Easing, MousePath, Point, Waypoint};
pub use typing::{TypingAction, TypingPlan, TypingStep};

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Synthesizer for mouse paths and typing plans.
pub struct BehaviorSynthesizer {
    rng: StdRng,
}

impl BehaviorSynthesizer {
    /// Entropy-seeded synthesizer for production runs.
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Seeded synthesizer for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Build a curved mouse trajectory from `start` to `end`.
    pub fn mouse_path(&mut self, start: Point, end: Point) -> MousePath {
        mouse::build_path(&mut self.rng, start, end)
    }

    /// Build a keystroke sequence that renders exactly `text`, with
    /// occasional typo-then-correct noise at the given rate.
    pub fn typing_plan(&mut self, text: &str, error_rate: f64) -> TypingPlan {
        typing::build_plan(&mut self.rng, text, error_rate)
    }
}

impl Default for BehaviorSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}
