//! Batch runner
//!
//! Sequences targets one at a time: a target must reach a terminal state
//! before the next starts, with a randomized inter-target delay that grows
//! with the recent failure streak to avoid correlated request bursts.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::SubmissionOrchestrator;
use crate::model::{BusinessRecord, DirectoryTarget};
use crate::stats::RunStatsSnapshot;

/// Failure streaks beyond this no longer stretch the pacing further.
const MAX_DELAY_SCALE: u64 = 4;

impl SubmissionOrchestrator {
    /// Run every target to a terminal outcome, sequentially.
    ///
    /// One bad target never aborts the run: each terminal state is recorded
    /// and the batch moves on. Returns the final outcome counters.
    pub async fn run_batch(
        &self,
        targets: &[DirectoryTarget],
        record: &BusinessRecord,
    ) -> RunStatsSnapshot {
        info!("Batch starting: {} targets", targets.len());

        for (index, target) in targets.iter().enumerate() {
            if self.is_cancelled() {
                warn!("Batch cancelled after {} targets", index);
                break;
            }

            if index > 0 {
                self.inter_target_pause().await;
            }

            let attempt = self.submit_target(target, record).await;
            self.stats.record_outcome(attempt.outcome);

            if let Err(e) = self.evidence.record(&attempt) {
                error!("Failed to record evidence for {}: {}", attempt.directory_id, e);
            }
        }

        let snapshot = self.stats.snapshot();
        info!("Batch finished: {}", snapshot);
        snapshot
    }

    /// Randomized pause between targets, stretched by the failure streak.
    async fn inter_target_pause(&self) {
        let min = self.config.inter_target_delay_min_secs;
        let max = self.config.inter_target_delay_max_secs.max(min);
        let base = rand::thread_rng().gen_range(min..=max);
        let scale = 1 + self.stats.failure_streak().min(MAX_DELAY_SCALE);
        let delay = Duration::from_secs(base * scale);

        info!(
            "Pausing {}s before next target (failure streak {})",
            delay.as_secs(),
            self.stats.failure_streak()
        );
        sleep(delay).await;
    }
}
