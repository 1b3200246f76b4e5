//! Append-only evidence log
//!
//! One JSON line per attempt in `attempts.jsonl`, one PNG per captured
//! screenshot, all under a caller-chosen directory. Entries are never
//! overwritten or merged: re-running a batch against the same path doubles
//! the attempt count.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::defense::DefenseKind;
use crate::form::FillStrategy;

/// Terminal classification of one attempt. Exactly one per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Success,
    Partial,
    Blocked,
    Error,
    ManualRequired,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Partial => "partial",
            Outcome::Blocked => "blocked",
            Outcome::Error => "error",
            Outcome::ManualRequired => "manualRequired",
        }
    }
}

/// One completed submission attempt. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAttempt {
    pub directory_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: Outcome,
    pub fields_filled: u32,
    pub screenshot_refs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Defense classified during the attempt, when one was hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defense: Option<DefenseKind>,
    /// Fill strategy that won, when any field was filled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_strategy: Option<FillStrategy>,
}

/// Counts by outcome folded from the log file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSummary {
    pub total: u64,
    pub success: u64,
    pub partial: u64,
    pub blocked: u64,
    pub error: u64,
    pub manual_required: u64,
}

impl std::fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attempts: {} success, {} partial, {} blocked, {} error, {} manual",
            self.total, self.success, self.partial, self.blocked, self.error, self.manual_required
        )
    }
}

/// Append-only attempt log plus screenshot store.
pub struct EvidenceLog {
    dir: PathBuf,
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl EvidenceLog {
    /// Open (creating if needed) an evidence directory.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log_path: dir.join("attempts.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    /// Directory holding the log and screenshots.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one attempt. Never overwrites prior entries.
    pub fn record(&self, attempt: &SubmissionAttempt) -> std::io::Result<()> {
        let line = serde_json::to_string(attempt)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{}", line)?;

        debug!(
            "Recorded {} attempt for {} ({} fields, {} screenshots)",
            attempt.outcome.as_str(),
            attempt.directory_id,
            attempt.fields_filled,
            attempt.screenshot_refs.len()
        );
        Ok(())
    }

    /// Store screenshot bytes and return the reference recorded in the
    /// attempt. File names are unique across runs sharing one directory.
    pub fn save_screenshot(
        &self,
        directory_id: &str,
        stage: &str,
        png: &[u8],
    ) -> std::io::Result<String> {
        let name = format!("{}-{}-{}.png", directory_id, stage, Uuid::new_v4());
        std::fs::write(self.dir.join(&name), png)?;
        Ok(name)
    }

    /// Fold the log into counts by outcome.
    pub fn summary(&self) -> std::io::Result<OutcomeSummary> {
        let mut summary = OutcomeSummary::default();
        if !self.log_path.exists() {
            return Ok(summary);
        }

        let file = std::fs::File::open(&self.log_path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SubmissionAttempt>(&line) {
                Ok(attempt) => {
                    summary.total += 1;
                    match attempt.outcome {
                        Outcome::Success => summary.success += 1,
                        Outcome::Partial => summary.partial += 1,
                        Outcome::Blocked => summary.blocked += 1,
                        Outcome::Error => summary.error += 1,
                        Outcome::ManualRequired => summary.manual_required += 1,
                    }
                }
                Err(e) => {
                    warn!("Skipping malformed evidence line: {}", e);
                }
            }
        }
        Ok(summary)
    }

    /// Number of recorded attempts.
    pub fn attempt_count(&self) -> std::io::Result<u64> {
        Ok(self.summary()?.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(directory_id: &str, outcome: Outcome) -> SubmissionAttempt {
        SubmissionAttempt {
            directory_id: directory_id.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome,
            fields_filled: 3,
            screenshot_refs: vec![],
            error_detail: None,
            defense: None,
            fill_strategy: Some(FillStrategy::LabelText),
        }
    }

    #[test]
    fn test_record_appends_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvidenceLog::open(dir.path()).unwrap();

        log.record(&attempt("a", Outcome::Success)).unwrap();
        log.record(&attempt("b", Outcome::Blocked)).unwrap();
        assert_eq!(log.attempt_count().unwrap(), 2);

        // A second log against the same path keeps appending.
        let reopened = EvidenceLog::open(dir.path()).unwrap();
        reopened.record(&attempt("a", Outcome::Success)).unwrap();
        reopened.record(&attempt("b", Outcome::Blocked)).unwrap();
        assert_eq!(reopened.attempt_count().unwrap(), 4);
    }

    #[test]
    fn test_summary_counts_by_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvidenceLog::open(dir.path()).unwrap();

        for outcome in [
            Outcome::Success,
            Outcome::Success,
            Outcome::Partial,
            Outcome::Error,
            Outcome::ManualRequired,
        ] {
            log.record(&attempt("dir", outcome)).unwrap();
        }

        let summary = log.summary().unwrap();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.partial, 1);
        assert_eq!(summary.error, 1);
        assert_eq!(summary.manual_required, 1);
        assert_eq!(summary.blocked, 0);
    }

    #[test]
    fn test_screenshots_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let log = EvidenceLog::open(dir.path()).unwrap();

        let a = log.save_screenshot("dir", "terminal", &[1, 2, 3]).unwrap();
        let b = log.save_screenshot("dir", "terminal", &[4, 5, 6]).unwrap();
        assert_ne!(a, b);
        assert!(dir.path().join(&a).exists());
        assert!(dir.path().join(&b).exists());
    }
}
