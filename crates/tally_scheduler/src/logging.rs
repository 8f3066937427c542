//! Scheduling outcome logging, with stats gated by a cohort sampler.
//!
//! Every outcome goes to `tracing`. The structured stats record is only
//! forwarded when the device is in the logging cohort for the metric.

use crate::resolver::SchedulingOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_sampling::Sampler;
use tracing::{debug, info, warn};

/// Result code reported in scheduling stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingResultCode {
    /// The job was scheduled.
    Successful,
    /// The pending job already matched.
    Skipped,
    /// Scheduling failed.
    Failed,
}

impl From<SchedulingOutcome> for SchedulingResultCode {
    fn from(outcome: SchedulingOutcome) -> Self {
        match outcome {
            SchedulingOutcome::Scheduled => Self::Successful,
            SchedulingOutcome::Skipped => Self::Skipped,
            SchedulingOutcome::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for SchedulingResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Successful => "successful",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        })
    }
}

/// One scheduling stats record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingStats {
    /// Job that was resolved.
    pub job_id: i32,
    /// How resolution ended.
    pub result_code: SchedulingResultCode,
}

/// Destination of scheduling stats records.
pub trait StatsSink: Send + Sync {
    /// Records one stats entry.
    fn log_scheduling_stats(&self, stats: &SchedulingStats);
}

impl<T: StatsSink + ?Sized> StatsSink for std::sync::Arc<T> {
    fn log_scheduling_stats(&self, stats: &SchedulingStats) {
        (**self).log_scheduling_stats(stats);
    }
}

/// Stats sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardStats;

impl StatsSink for DiscardStats {
    fn log_scheduling_stats(&self, _stats: &SchedulingStats) {}
}

/// Logs scheduling outcomes, forwarding stats for sampled devices only.
#[derive(Debug)]
pub struct SchedulingLogger<G, T> {
    gate: G,
    stats: T,
}

impl<G: Sampler, T: StatsSink> SchedulingLogger<G, T> {
    /// Creates a logger gated by `gate`.
    pub const fn new(gate: G, stats: T) -> Self {
        Self { gate, stats }
    }

    /// Logs `outcome` for `job_id`.
    pub async fn record(&self, job_id: i32, outcome: SchedulingOutcome) {
        let result_code = SchedulingResultCode::from(outcome);
        info!(job_id, %result_code, "Job scheduling resolved");

        match self.gate.should_log().await {
            Ok(true) => {
                self.stats.log_scheduling_stats(&SchedulingStats {
                    job_id,
                    result_code,
                });
            }
            Ok(false) => debug!(job_id, "Device not sampled, skipping scheduling stats"),
            Err(err) => warn!(job_id, error = %err, "Dropping scheduling stats"),
        }
    }
}
