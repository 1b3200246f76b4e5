//! Anti-bot defense detection and classification
//!
//! Inspects loaded pages for known CAPTCHA and challenge-page signatures.
//! The engine never solves challenges computationally; verdicts either
//! self-resolve (Cloudflare-style interstitials with a consistent
//! fingerprint), defer to an external token service, or end the attempt for
//! manual follow-up.

mod detector;
mod solver;
mod types;

pub use detector::{DefenseDetector, DetectorConfig};
pub(crate) use detector::extract_site_key;
pub use solver::{
    ChallengeContext, ChallengeSolver, ManualSolver, RemoteSolver, SolverError,
};
pub use types::{DefenseKind, DefenseVerdict};
