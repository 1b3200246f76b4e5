//! Fingerprint generator
//!
//! Pure function of an injectable RNG stream: seeded for reproducible tests,
//! entropy-seeded in production.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::profile::{FingerprintProfile, ScreenGeometry, ARCHETYPES};

/// Maximum perturbation applied to the archetype screen width, in pixels.
const SCREEN_WIDTH_JITTER: i32 = 100;
/// Maximum perturbation applied to the archetype screen height, in pixels.
const SCREEN_HEIGHT_JITTER: i32 = 50;
/// Maximum perturbation applied to the archetype core count.
const CORE_JITTER: i32 = 2;

/// Generates fresh, internally consistent fingerprint profiles.
pub struct FingerprintGenerator {
    rng: StdRng,
}

impl FingerprintGenerator {
    /// Entropy-seeded generator for production runs.
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Seeded generator for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Generate a new profile: uniform archetype pick, perturbed numeric
    /// fields, independent noise seeds. Device memory is left at the
    /// archetype value because browsers only report power-of-two sizes.
    pub fn generate(&mut self) -> FingerprintProfile {
        let archetype = ARCHETYPES[self.rng.gen_range(0..ARCHETYPES.len())];

        let (base_w, base_h) = archetype.base_screen;
        let width = offset_within(&mut self.rng, base_w, SCREEN_WIDTH_JITTER);
        let height = offset_within(&mut self.rng, base_h, SCREEN_HEIGHT_JITTER);
        let cores = offset_within(&mut self.rng, archetype.base_cores, CORE_JITTER).max(2);

        let profile = FingerprintProfile {
            user_agent: archetype.user_agent.to_string(),
            platform: archetype.platform.to_string(),
            vendor: archetype.vendor.to_string(),
            languages: archetype.languages.iter().map(|l| l.to_string()).collect(),
            screen: ScreenGeometry {
                width,
                height,
                color_depth: 24,
            },
            hardware_concurrency: cores,
            device_memory_gb: archetype.memory_gb,
            timezone: archetype.timezone.to_string(),
            canvas_noise_seed: self.rng.gen(),
            webgl_noise_seed: self.rng.gen(),
        };

        debug!("Generated fingerprint from archetype {}: {}", archetype.name, profile);
        profile
    }
}

impl Default for FingerprintGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniformly perturb `base` by up to +/- `jitter`, never going below 1.
fn offset_within(rng: &mut StdRng, base: u32, jitter: i32) -> u32 {
    let delta = rng.gen_range(-jitter..=jitter);
    (base as i64 + delta as i64).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generator_is_reproducible() {
        let a = FingerprintGenerator::with_seed(7).generate();
        let b = FingerprintGenerator::with_seed(7).generate();
        assert_eq!(a.user_agent, b.user_agent);
        assert_eq!(a.screen, b.screen);
        assert_eq!(a.canvas_noise_seed, b.canvas_noise_seed);
    }

    #[test]
    fn test_consecutive_profiles_diverge() {
        let mut generator = FingerprintGenerator::with_seed(42);
        let first = generator.generate();

        // With +/-100 x +/-50 screen jitter plus independent 64-bit noise
        // seeds, 16 consecutive draws repeating the first identity would mean
        // the RNG stream is broken.
        let mut any_different = false;
        for _ in 0..16 {
            let next = generator.generate();
            if next.screen != first.screen || next.canvas_noise_seed != first.canvas_noise_seed {
                any_different = true;
                break;
            }
        }
        assert!(any_different);
    }

    #[test]
    fn test_timezone_and_locale_stay_paired() {
        let mut generator = FingerprintGenerator::with_seed(3);
        for _ in 0..32 {
            let profile = generator.generate();
            let archetype = ARCHETYPES
                .iter()
                .find(|a| a.user_agent == profile.user_agent && a.timezone == profile.timezone)
                .expect("profile must match a catalog archetype");
            assert_eq!(archetype.languages[0], profile.primary_language());
        }
    }

    #[test]
    fn test_noise_seeds_are_independent() {
        let mut generator = FingerprintGenerator::with_seed(11);
        let profile = generator.generate();
        assert_ne!(profile.canvas_noise_seed, profile.webgl_noise_seed);
    }
}
