//! Job execution logging, with stats gated by a cohort sampler.
//!
//! The start and stop instants of each job's latest run are kept in an
//! [`ExecutionStore`], so the latency of a run and the period since the
//! previous one can be reported when the run ends. A run that started but
//! never reported an end is reported as halted on the next start.

use crate::error::Result;
use crate::logging::DiscardStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tally_sampling::{Clock, Sampler};
use tracing::{debug, error, info, warn};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// How a job reported the end of its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResult {
    /// The run completed.
    Success,
    /// The run failed and asked to be retried.
    FailureWithRetry,
    /// The run failed for good.
    FailureWithoutRetry,
}

/// Result code reported in execution stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionResultCode {
    /// The run completed.
    Successful,
    /// The run failed and will be retried.
    FailedWithRetry,
    /// The run failed and will not be retried.
    FailedWithoutRetry,
    /// The scheduler stopped the run, which will be retried.
    OnStopCalledWithRetry,
    /// The scheduler stopped the run for good.
    OnStopCalledWithoutRetry,
    /// The previous run never reported an end.
    HaltedForUnknownReason,
    /// The run was skipped because the job is switched off.
    SkipForKillSwitchOn,
}

impl From<ExecutionResult> for ExecutionResultCode {
    fn from(result: ExecutionResult) -> Self {
        match result {
            ExecutionResult::Success => Self::Successful,
            ExecutionResult::FailureWithRetry => Self::FailedWithRetry,
            ExecutionResult::FailureWithoutRetry => Self::FailedWithoutRetry,
        }
    }
}

impl fmt::Display for ExecutionResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Successful => "successful",
            Self::FailedWithRetry => "failed with retry",
            Self::FailedWithoutRetry => "failed without retry",
            Self::OnStopCalledWithRetry => "stopped with retry",
            Self::OnStopCalledWithoutRetry => "stopped without retry",
            Self::HaltedForUnknownReason => "halted for unknown reason",
            Self::SkipForKillSwitchOn => "skipped by kill switch",
        })
    }
}

/// Persisted timestamps of a job's latest run, in epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Start of the latest run.
    pub start_ms: Option<i64>,
    /// End of the latest finished run.
    pub stop_ms: Option<i64>,
    /// Time between the two latest starts. `None` after the first run.
    pub period_ms: Option<i64>,
}

/// Persistent storage of [`ExecutionRecord`]s.
pub trait ExecutionStore: Send + Sync {
    /// Returns the record for `job_id`, or an empty record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn execution_record(&self, job_id: i32) -> Result<ExecutionRecord>;

    /// Replaces the record for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is not committed.
    fn store_execution_record(&self, job_id: i32, record: ExecutionRecord) -> Result<()>;
}

impl<E: ExecutionStore + ?Sized> ExecutionStore for std::sync::Arc<E> {
    fn execution_record(&self, job_id: i32) -> Result<ExecutionRecord> {
        (**self).execution_record(job_id)
    }

    fn store_execution_record(&self, job_id: i32, record: ExecutionRecord) -> Result<()> {
        (**self).store_execution_record(job_id, record)
    }
}

/// In-memory execution store.
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    records: Mutex<HashMap<i32, ExecutionRecord>>,
}

impl MemoryExecutionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionStore for MemoryExecutionStore {
    fn execution_record(&self, job_id: i32) -> Result<ExecutionRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&job_id).copied().unwrap_or_default())
    }

    fn store_execution_record(&self, job_id: i32, record: ExecutionRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, record);
        Ok(())
    }
}

/// One execution stats record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Job that ran.
    pub job_id: i32,
    /// Time from start to end of the run. `None` for a halted run.
    pub execution_latency_ms: Option<i32>,
    /// Whole minutes between the two latest starts. Negative periods are kept
    /// as milliseconds. `None` after the first run.
    pub execution_period_minute: Option<i32>,
    /// How the run ended.
    pub result_code: ExecutionResultCode,
    /// Platform stop reason, when the scheduler stopped the run.
    pub stop_reason: Option<i32>,
}

/// Destination of execution stats records.
pub trait ExecutionStatsSink: Send + Sync {
    /// Records one stats entry.
    fn log_execution_stats(&self, stats: &ExecutionStats);
}

impl<T: ExecutionStatsSink + ?Sized> ExecutionStatsSink for std::sync::Arc<T> {
    fn log_execution_stats(&self, stats: &ExecutionStats) {
        (**self).log_execution_stats(stats);
    }
}

impl ExecutionStatsSink for DiscardStats {
    fn log_execution_stats(&self, _stats: &ExecutionStats) {}
}

/// Logs the lifecycle of job runs, forwarding stats for sampled devices only.
///
/// Updates to the store are serialized, so records stay consistent when
/// starts and ends of the same job are logged from different tasks.
#[derive(Debug)]
pub struct JobExecutionLogger<G, T, E, C> {
    gate: G,
    stats: T,
    store: E,
    clock: C,
    sequence: tokio::sync::Mutex<()>,
}

impl<G, T, E, C> JobExecutionLogger<G, T, E, C>
where
    G: Sampler,
    T: ExecutionStatsSink,
    E: ExecutionStore,
    C: Clock,
{
    /// Creates a logger gated by `gate`.
    pub fn new(gate: G, stats: T, store: E, clock: C) -> Self {
        Self {
            gate,
            stats,
            store,
            clock,
            sequence: tokio::sync::Mutex::new(()),
        }
    }

    /// The execution store.
    pub const fn store(&self) -> &E {
        &self.store
    }

    /// Records the start of a run.
    ///
    /// Reports the previous run as halted if it never reported an end.
    pub async fn record_on_start_job(&self, job_id: i32) {
        let start_ms = self.now_ms();
        let _sequence = self.sequence.lock().await;

        let previous = match self.store.execution_record(job_id) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(job_id, error = %err, "Failed to read execution record");
                return;
            }
        };

        let mut period_ms = None;
        if let Some(previous_start) = previous.start_ms {
            if !matches!(previous.stop_ms, Some(stop) if stop >= previous_start) {
                self.log_job_stats(
                    job_id,
                    None,
                    previous.period_ms,
                    ExecutionResultCode::HaltedForUnknownReason,
                    None,
                )
                .await;
            }
            let period = start_ms - previous_start;
            if period < 0 {
                error!(job_id, period_ms = period, "Run started before the previous one");
            }
            period_ms = Some(period);
        }

        let record = ExecutionRecord {
            start_ms: Some(start_ms),
            stop_ms: previous.stop_ms,
            period_ms,
        };
        if let Err(err) = self.store.store_execution_record(job_id, record) {
            error!(job_id, error = %err, "Failed to store execution start");
        }
    }

    /// Records the end of a run reported by the job itself.
    pub async fn record_job_finished(&self, job_id: i32, result: ExecutionResult) {
        self.log_execution_stats(job_id, result.into(), None).await;
    }

    /// Records that the scheduler stopped a run.
    pub async fn record_on_stop_job(&self, job_id: i32, stop_reason: i32, should_retry: bool) {
        let result_code = if should_retry {
            ExecutionResultCode::OnStopCalledWithRetry
        } else {
            ExecutionResultCode::OnStopCalledWithoutRetry
        };
        self.log_execution_stats(job_id, result_code, Some(stop_reason))
            .await;
    }

    /// Records that a run was skipped for `reason`.
    pub async fn record_job_skipped(&self, job_id: i32, reason: ExecutionResultCode) {
        self.log_execution_stats(job_id, reason, None).await;
    }

    async fn log_execution_stats(
        &self,
        job_id: i32,
        result_code: ExecutionResultCode,
        stop_reason: Option<i32>,
    ) {
        let stop_ms = self.now_ms();
        let _sequence = self.sequence.lock().await;

        let record = match self.store.execution_record(job_id) {
            Ok(record) => record,
            Err(err) => {
                warn!(job_id, error = %err, "Failed to read execution record");
                return;
            }
        };
        let Some(start_ms) = record.start_ms.filter(|start| *start <= stop_ms) else {
            error!(
                job_id,
                start_ms = ?record.start_ms,
                stop_ms,
                "Execution stats are invalid, no start precedes this end"
            );
            return;
        };

        let updated = ExecutionRecord {
            stop_ms: Some(stop_ms),
            ..record
        };
        if let Err(err) = self.store.store_execution_record(job_id, updated) {
            error!(job_id, error = %err, "Failed to store execution end");
        }

        self.log_job_stats(
            job_id,
            Some(stop_ms - start_ms),
            record.period_ms,
            result_code,
            stop_reason,
        )
        .await;
    }

    async fn log_job_stats(
        &self,
        job_id: i32,
        latency_ms: Option<i64>,
        period_ms: Option<i64>,
        result_code: ExecutionResultCode,
        stop_reason: Option<i32>,
    ) {
        info!(job_id, %result_code, latency_ms = ?latency_ms, "Job execution ended");

        match self.gate.should_log().await {
            Ok(true) => {}
            Ok(false) => {
                debug!(job_id, "Device not sampled, skipping execution stats");
                return;
            }
            Err(err) => {
                warn!(job_id, error = %err, "Dropping execution stats");
                return;
            }
        }

        self.stats.log_execution_stats(&ExecutionStats {
            job_id,
            execution_latency_ms: latency_ms.map(saturating_i32),
            execution_period_minute: period_ms.map(period_minutes),
            result_code,
            stop_reason,
        });
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

fn period_minutes(period_ms: i64) -> i32 {
    if period_ms >= 0 {
        saturating_i32(period_ms / MILLIS_PER_MINUTE)
    } else {
        saturating_i32(period_ms)
    }
}

fn saturating_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use tally_sampling::AlwaysLog;

    const JOB_ID: i32 = 21;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at_ms(millis: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                DateTime::from_timestamp_millis(millis).unwrap(),
            )))
        }

        fn set_ms(&self, millis: i64) {
            *self.0.lock().unwrap() = DateTime::from_timestamp_millis(millis).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct RecordingStats(Mutex<Vec<ExecutionStats>>);

    impl RecordingStats {
        fn taken(&self) -> Vec<ExecutionStats> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl ExecutionStatsSink for RecordingStats {
        fn log_execution_stats(&self, stats: &ExecutionStats) {
            self.0.lock().unwrap().push(*stats);
        }
    }

    struct NeverSampled;

    impl Sampler for NeverSampled {
        async fn should_log(&self) -> tally_sampling::Result<bool> {
            Ok(false)
        }
    }

    struct ReadOnlyStore;

    impl ExecutionStore for ReadOnlyStore {
        fn execution_record(&self, _job_id: i32) -> Result<ExecutionRecord> {
            Ok(ExecutionRecord {
                start_ms: Some(0),
                ..ExecutionRecord::default()
            })
        }

        fn store_execution_record(&self, _job_id: i32, _record: ExecutionRecord) -> Result<()> {
            Err(Error::Unavailable("storage is read-only".to_string()))
        }
    }

    type TestLogger<G> =
        JobExecutionLogger<G, Arc<RecordingStats>, Arc<MemoryExecutionStore>, Arc<ManualClock>>;

    fn logger<G: Sampler>(gate: G, start_ms: i64) -> (TestLogger<G>, Arc<RecordingStats>, Arc<ManualClock>) {
        let stats = Arc::new(RecordingStats::default());
        let clock = ManualClock::at_ms(start_ms);
        let logger = JobExecutionLogger::new(
            gate,
            Arc::clone(&stats),
            Arc::new(MemoryExecutionStore::new()),
            Arc::clone(&clock),
        );
        (logger, stats, clock)
    }

    #[tokio::test]
    async fn first_run_reports_latency_without_period() {
        let (logger, stats, clock) = logger(AlwaysLog, 1_000);

        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(1_500);
        logger
            .record_job_finished(JOB_ID, ExecutionResult::Success)
            .await;

        assert_eq!(
            stats.taken(),
            vec![ExecutionStats {
                job_id: JOB_ID,
                execution_latency_ms: Some(500),
                execution_period_minute: None,
                result_code: ExecutionResultCode::Successful,
                stop_reason: None,
            }]
        );
        assert_eq!(
            logger.store().execution_record(JOB_ID).unwrap(),
            ExecutionRecord {
                start_ms: Some(1_000),
                stop_ms: Some(1_500),
                period_ms: None,
            }
        );
    }

    #[tokio::test]
    async fn second_run_reports_period_in_minutes() {
        let (logger, stats, clock) = logger(AlwaysLog, 0);

        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(100);
        logger
            .record_job_finished(JOB_ID, ExecutionResult::FailureWithRetry)
            .await;
        stats.taken();

        let second_start = 2_000 * MILLIS_PER_MINUTE;
        clock.set_ms(second_start);
        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(second_start + 250);
        logger.record_on_stop_job(JOB_ID, 7, false).await;

        assert_eq!(
            stats.taken(),
            vec![ExecutionStats {
                job_id: JOB_ID,
                execution_latency_ms: Some(250),
                execution_period_minute: Some(2_000),
                result_code: ExecutionResultCode::OnStopCalledWithoutRetry,
                stop_reason: Some(7),
            }]
        );
    }

    #[tokio::test]
    async fn unfinished_run_is_reported_as_halted() {
        let (logger, stats, clock) = logger(AlwaysLog, 0);

        logger.record_on_start_job(JOB_ID).await;
        assert!(stats.taken().is_empty());

        clock.set_ms(MILLIS_PER_MINUTE);
        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(3 * MILLIS_PER_MINUTE);
        logger.record_on_start_job(JOB_ID).await;

        let halted = |execution_period_minute| ExecutionStats {
            job_id: JOB_ID,
            execution_latency_ms: None,
            execution_period_minute,
            result_code: ExecutionResultCode::HaltedForUnknownReason,
            stop_reason: None,
        };
        assert_eq!(stats.taken(), vec![halted(None), halted(Some(1))]);
        assert_eq!(
            logger.store().execution_record(JOB_ID).unwrap().period_ms,
            Some(2 * MILLIS_PER_MINUTE)
        );
    }

    #[tokio::test]
    async fn end_without_start_is_dropped() {
        let (logger, stats, _clock) = logger(AlwaysLog, 5_000);

        logger
            .record_job_skipped(JOB_ID, ExecutionResultCode::SkipForKillSwitchOn)
            .await;

        assert!(stats.taken().is_empty());
        assert_eq!(
            logger.store().execution_record(JOB_ID).unwrap(),
            ExecutionRecord::default()
        );
    }

    #[tokio::test]
    async fn skipped_run_after_start_is_reported() {
        let (logger, stats, clock) = logger(AlwaysLog, 5_000);

        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(5_020);
        logger
            .record_job_skipped(JOB_ID, ExecutionResultCode::SkipForKillSwitchOn)
            .await;

        let reported = stats.taken();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].result_code, ExecutionResultCode::SkipForKillSwitchOn);
        assert_eq!(reported[0].execution_latency_ms, Some(20));
    }

    #[tokio::test]
    async fn unsampled_device_updates_store_but_drops_stats() {
        let (logger, stats, clock) = logger(NeverSampled, 0);

        logger.record_on_start_job(JOB_ID).await;
        clock.set_ms(40);
        logger
            .record_job_finished(JOB_ID, ExecutionResult::FailureWithoutRetry)
            .await;

        assert!(stats.taken().is_empty());
        assert_eq!(
            logger.store().execution_record(JOB_ID).unwrap().stop_ms,
            Some(40)
        );
    }

    #[tokio::test]
    async fn store_failure_still_reports_stats() {
        let stats = Arc::new(RecordingStats::default());
        let logger = JobExecutionLogger::new(
            AlwaysLog,
            Arc::clone(&stats),
            ReadOnlyStore,
            ManualClock::at_ms(80),
        );

        logger
            .record_job_finished(JOB_ID, ExecutionResult::Success)
            .await;

        assert_eq!(stats.taken()[0].execution_latency_ms, Some(80));
    }

    #[test]
    fn periods_saturate_into_i32() {
        let overflowing = (i64::from(i32::MAX) + 1) * MILLIS_PER_MINUTE;
        assert_eq!(period_minutes(overflowing), i32::MAX);
        assert_eq!(period_minutes(59_999), 0);
        assert_eq!(period_minutes(-5), -5);
        assert_eq!(saturating_i32(i64::MIN), i32::MIN);
    }

    #[test]
    fn results_map_to_codes() {
        assert_eq!(
            ExecutionResultCode::from(ExecutionResult::FailureWithRetry),
            ExecutionResultCode::FailedWithRetry
        );
        assert_eq!(
            ExecutionResultCode::HaltedForUnknownReason.to_string(),
            "halted for unknown reason"
        );
    }
}
