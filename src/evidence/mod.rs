//! Durable attempt evidence
//!
//! Append-only record of every submission attempt plus the screenshot
//! artifacts captured along the way, kept for auditing and retry decisions.

mod log;

pub use log::{EvidenceLog, Outcome, OutcomeSummary, SubmissionAttempt};
