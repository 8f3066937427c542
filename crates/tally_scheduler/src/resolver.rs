//! Skip, schedule or fail: resolving a computed job against the scheduler.
//!
//! Rescheduling an identical pending job resets its timers, so the resolver
//! only calls the scheduler when the job is new, forced, or has changed.

use crate::error::Result;
use crate::logging::{DiscardStats, SchedulingLogger, StatsSink};
use crate::sink::JobSchedulerSink;
use std::fmt;
use std::sync::Arc;
use tally_policy::{apply_policy_to_job_info, merge_two_policies, JobInfo, JobInfoBuilder, JobPolicy};
use tally_sampling::{AlwaysLog, Sampler};
use tracing::{debug, error, info, warn};

/// Why a job is being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleReason {
    /// No job is pending under this id.
    FirstTime,
    /// The caller asked for a reschedule.
    Forced,
    /// The pending job differs from the computed one.
    InfoChanged,
}

impl fmt::Display for ScheduleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FirstTime => "first time",
            Self::Forced => "forced",
            Self::InfoChanged => "info changed",
        })
    }
}

/// What to do with a computed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulingDecision {
    /// The pending job already matches.
    Skip,
    /// Hand the computed job to the scheduler.
    Schedule(ScheduleReason),
}

impl fmt::Display for SchedulingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Schedule(reason) => write!(f, "schedule ({reason})"),
        }
    }
}

/// How resolution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulingOutcome {
    /// Nothing was scheduled; the pending job already matched.
    Skipped,
    /// The scheduler accepted the job.
    Scheduled,
    /// Resolution or scheduling failed.
    Failed,
}

impl fmt::Display for SchedulingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skipped => "skipped",
            Self::Scheduled => "scheduled",
            Self::Failed => "failed",
        })
    }
}

/// Decides whether `computed` must be scheduled.
pub fn decide(computed: &JobInfo, existing: Option<&JobInfo>, force: bool) -> SchedulingDecision {
    match existing {
        None => SchedulingDecision::Schedule(ScheduleReason::FirstTime),
        Some(_) if force => SchedulingDecision::Schedule(ScheduleReason::Forced),
        Some(existing) if existing == computed => SchedulingDecision::Skip,
        Some(_) => SchedulingDecision::Schedule(ScheduleReason::InfoChanged),
    }
}

/// Everything needed to schedule one job from its policies.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    /// Builder carrying the job's compiled-in shape.
    pub builder: JobInfoBuilder,
    /// Compiled-in policy.
    pub default_policy: Option<JobPolicy>,
    /// Server-pushed override.
    pub server_policy: Option<JobPolicy>,
    /// Reschedule even if the pending job matches.
    pub force_reschedule: bool,
}

impl ScheduleRequest {
    /// Creates a request with no policies.
    pub const fn new(builder: JobInfoBuilder) -> Self {
        Self {
            builder,
            default_policy: None,
            server_policy: None,
            force_reschedule: false,
        }
    }

    /// Sets the compiled-in policy.
    #[must_use]
    pub fn with_default_policy(mut self, policy: JobPolicy) -> Self {
        self.default_policy = Some(policy);
        self
    }

    /// Sets the server override.
    #[must_use]
    pub fn with_server_policy(mut self, policy: Option<JobPolicy>) -> Self {
        self.server_policy = policy;
        self
    }

    /// Forces a reschedule.
    #[must_use]
    pub const fn with_force_reschedule(mut self, force: bool) -> Self {
        self.force_reschedule = force;
        self
    }

    /// Merges the request's policies and applies the result to its builder.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Policy`] if the policies cannot be merged or
    /// the merged policy cannot be applied.
    pub fn computed_job(&mut self) -> Result<JobInfo> {
        let merged =
            merge_two_policies(self.default_policy.clone(), self.server_policy.clone())?;
        Ok(apply_policy_to_job_info(&mut self.builder, merged.as_ref())?)
    }
}

/// Resolves computed jobs against a scheduler sink.
#[derive(Debug)]
pub struct JobScheduleResolver<S, G = AlwaysLog, T = DiscardStats> {
    sink: Arc<S>,
    logger: SchedulingLogger<G, T>,
}

impl<S: JobSchedulerSink + 'static> JobScheduleResolver<S> {
    /// Creates a resolver that only logs outcomes through `tracing`.
    pub fn new(sink: Arc<S>) -> Self {
        Self::with_logger(sink, SchedulingLogger::new(AlwaysLog, DiscardStats))
    }
}

impl<S, G, T> JobScheduleResolver<S, G, T>
where
    S: JobSchedulerSink + 'static,
    G: Sampler,
    T: StatsSink,
{
    /// Creates a resolver with a sampled stats logger.
    pub const fn with_logger(sink: Arc<S>, logger: SchedulingLogger<G, T>) -> Self {
        Self { sink, logger }
    }

    /// The scheduler sink.
    pub const fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Applies [`decide`] and, if needed, schedules `computed`.
    ///
    /// Both jobs must carry `job_id`; a mismatch is reported as
    /// [`SchedulingOutcome::Failed`] without touching the scheduler. A
    /// scheduler error is reported the same way and not retried.
    pub fn resolve_scheduling(
        &self,
        job_id: i32,
        computed: &JobInfo,
        existing: Option<&JobInfo>,
        force: bool,
    ) -> SchedulingOutcome {
        if computed.job_id != job_id || existing.is_some_and(|existing| existing.job_id != job_id) {
            warn!(
                job_id,
                computed_job_id = computed.job_id,
                existing_job_id = ?existing.map(|existing| existing.job_id),
                "Job id does not match the jobs being resolved"
            );
            return SchedulingOutcome::Failed;
        }
        resolve_with(self.sink.as_ref(), job_id, computed, existing, force)
    }

    /// Looks up the pending job and resolves `computed` against it.
    pub fn schedule_if_needed(&self, computed: &JobInfo, force: bool) -> SchedulingOutcome {
        lookup_and_resolve(self.sink.as_ref(), computed, force)
    }

    /// Merges, applies and resolves a request on a blocking task, then logs
    /// the outcome.
    ///
    /// A panicked or cancelled task is reported as
    /// [`SchedulingOutcome::Failed`].
    pub async fn schedule_in_background(&self, request: ScheduleRequest) -> SchedulingOutcome {
        let job_id = request.builder.job_id();
        let sink = Arc::clone(&self.sink);

        let outcome =
            match tokio::task::spawn_blocking(move || run_request(sink.as_ref(), request)).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(job_id, error = %err, "Background scheduling task did not complete");
                    SchedulingOutcome::Failed
                }
            };

        self.logger.record(job_id, outcome).await;
        outcome
    }
}

fn run_request<S: JobSchedulerSink + ?Sized>(
    sink: &S,
    mut request: ScheduleRequest,
) -> SchedulingOutcome {
    match request.computed_job() {
        Ok(computed) => lookup_and_resolve(sink, &computed, request.force_reschedule),
        Err(err) => {
            warn!(job_id = request.builder.job_id(), error = %err, "Rejected job policy");
            SchedulingOutcome::Failed
        }
    }
}

fn lookup_and_resolve<S: JobSchedulerSink + ?Sized>(
    sink: &S,
    computed: &JobInfo,
    force: bool,
) -> SchedulingOutcome {
    let job_id = computed.job_id;
    match sink.pending_job(job_id) {
        Ok(existing) => resolve_with(sink, job_id, computed, existing.as_ref(), force),
        Err(err) => {
            warn!(job_id, error = %err, "Failed to look up pending job");
            SchedulingOutcome::Failed
        }
    }
}

fn resolve_with<S: JobSchedulerSink + ?Sized>(
    sink: &S,
    job_id: i32,
    computed: &JobInfo,
    existing: Option<&JobInfo>,
    force: bool,
) -> SchedulingOutcome {
    let decision = decide(computed, existing, force);
    let reason = match decision {
        SchedulingDecision::Skip => {
            debug!(job_id, "Pending job is up to date, skipping");
            return SchedulingOutcome::Skipped;
        }
        SchedulingDecision::Schedule(reason) => reason,
    };

    let fingerprint = computed.fingerprint().ok();
    match sink.schedule(computed.clone()) {
        Ok(()) => {
            info!(job_id, %reason, fingerprint = ?fingerprint, "Scheduled job");
            SchedulingOutcome::Scheduled
        }
        Err(err) => {
            warn!(job_id, %reason, error = %err, "Scheduler rejected job");
            SchedulingOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::logging::{SchedulingResultCode, SchedulingStats};
    use crate::sink::MemoryScheduler;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tally_policy::{BatteryType, JobNetworkType, NetworkType};

    const JOB_ID: i32 = 11;

    fn job() -> JobInfoBuilder {
        JobInfoBuilder::new(JOB_ID, "sync-service")
    }

    fn info(builder: &JobInfoBuilder) -> JobInfo {
        builder.build().unwrap()
    }

    #[derive(Default)]
    struct CountingSink {
        inner: MemoryScheduler,
        schedule_calls: AtomicUsize,
    }

    impl JobSchedulerSink for CountingSink {
        fn pending_job(&self, job_id: i32) -> Result<Option<JobInfo>> {
            self.inner.pending_job(job_id)
        }

        fn schedule(&self, info: JobInfo) -> Result<()> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.schedule(info)
        }
    }

    struct UnreachableSink;

    impl JobSchedulerSink for UnreachableSink {
        fn pending_job(&self, _job_id: i32) -> Result<Option<JobInfo>> {
            Err(Error::Unavailable("scheduler service not bound".to_string()))
        }

        fn schedule(&self, _info: JobInfo) -> Result<()> {
            Err(Error::Unavailable("scheduler service not bound".to_string()))
        }
    }

    #[test]
    fn decision_table() {
        let computed = info(&job());
        let mut changed = job();
        changed.set_persisted(true);
        let changed = info(&changed);

        assert_eq!(
            decide(&computed, None, false),
            SchedulingDecision::Schedule(ScheduleReason::FirstTime)
        );
        assert_eq!(
            decide(&computed, None, true),
            SchedulingDecision::Schedule(ScheduleReason::FirstTime)
        );
        assert_eq!(
            decide(&computed, Some(&computed), true),
            SchedulingDecision::Schedule(ScheduleReason::Forced)
        );
        assert_eq!(decide(&computed, Some(&computed), false), SchedulingDecision::Skip);
        assert_eq!(
            decide(&computed, Some(&changed), false),
            SchedulingDecision::Schedule(ScheduleReason::InfoChanged)
        );
    }

    #[test]
    fn extras_difference_triggers_reschedule() {
        let mut pending = job();
        pending.set_extra("generation", 1_i64);
        let mut computed = job();
        computed.set_extra("generation", 2_i64);

        assert_eq!(
            decide(&info(&computed), Some(&info(&pending)), false),
            SchedulingDecision::Schedule(ScheduleReason::InfoChanged)
        );
    }

    #[test]
    fn skip_unless_forced() {
        let sink = Arc::new(CountingSink::default());
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));
        let computed = info(&job());

        assert_eq!(
            resolver.schedule_if_needed(&computed, false),
            SchedulingOutcome::Scheduled
        );
        assert_eq!(
            resolver.schedule_if_needed(&computed, false),
            SchedulingOutcome::Skipped
        );
        assert_eq!(
            resolver.schedule_if_needed(&computed, true),
            SchedulingOutcome::Scheduled
        );
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolve_scheduling_uses_given_existing_job() {
        let sink = Arc::new(CountingSink::default());
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));
        let computed = info(&job());

        assert_eq!(
            resolver.resolve_scheduling(JOB_ID, &computed, Some(&computed), false),
            SchedulingOutcome::Skipped
        );
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mismatched_job_id_is_rejected() {
        let sink = Arc::new(CountingSink::default());
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));
        let computed = info(&job());
        let other = info(&JobInfoBuilder::new(JOB_ID + 1, "sync-service"));

        assert_eq!(
            resolver.resolve_scheduling(JOB_ID + 1, &computed, None, false),
            SchedulingOutcome::Failed
        );
        assert_eq!(
            resolver.resolve_scheduling(JOB_ID, &computed, Some(&other), true),
            SchedulingOutcome::Failed
        );
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 0);
        assert!(sink.inner.is_empty());
    }

    #[test]
    fn sink_failure_is_failed_outcome() {
        let sink = Arc::new(MemoryScheduler::new());
        sink.reject_with("quota exceeded");
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));

        assert_eq!(
            resolver.resolve_scheduling(JOB_ID, &info(&job()), None, false),
            SchedulingOutcome::Failed
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn lookup_failure_is_failed_outcome() {
        let resolver = JobScheduleResolver::new(Arc::new(UnreachableSink));
        assert_eq!(
            resolver.schedule_if_needed(&info(&job()), false),
            SchedulingOutcome::Failed
        );
    }

    #[tokio::test]
    async fn background_request_merges_and_applies_policies() {
        let sink = Arc::new(MemoryScheduler::new());
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));

        let request = ScheduleRequest::new(job())
            .with_default_policy(
                JobPolicy::for_job(JOB_ID)
                    .with_network_type(NetworkType::Any)
                    .with_battery_type(BatteryType::RequireNotLow),
            )
            .with_server_policy(Some(
                JobPolicy::for_job(JOB_ID).with_network_type(NetworkType::Cellular),
            ));

        assert_eq!(
            resolver.schedule_in_background(request.clone()).await,
            SchedulingOutcome::Scheduled
        );
        let pending = sink.pending_job(JOB_ID).unwrap().unwrap();
        assert_eq!(pending.network_type, JobNetworkType::Cellular);
        assert!(pending.requires_battery_not_low);

        assert_eq!(
            resolver.schedule_in_background(request.clone()).await,
            SchedulingOutcome::Skipped
        );
        assert_eq!(
            resolver
                .schedule_in_background(request.with_force_reschedule(true))
                .await,
            SchedulingOutcome::Scheduled
        );
    }

    #[tokio::test]
    async fn invalid_merged_policy_fails_without_scheduling() {
        let sink = Arc::new(MemoryScheduler::new());
        let resolver = JobScheduleResolver::new(Arc::clone(&sink));

        let request = ScheduleRequest::new(job())
            .with_default_policy(JobPolicy::for_job(JOB_ID).with_require_device_idle(true))
            .with_server_policy(Some(
                JobPolicy::for_job(JOB_ID).with_battery_type(BatteryType::RequireCharging),
            ));

        assert_eq!(
            resolver.schedule_in_background(request).await,
            SchedulingOutcome::Failed
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn policy_errors_surface_as_policy_error() {
        let mut request = ScheduleRequest::new(job())
            .with_default_policy(JobPolicy::for_job(JOB_ID))
            .with_server_policy(Some(JobPolicy::for_job(JOB_ID + 1)));
        let err = request.computed_job().unwrap_err();
        assert!(matches!(err, Error::Policy(ref inner) if inner.is_invalid_argument()));

        let mut request = ScheduleRequest::new(job()).with_server_policy(Some(
            JobPolicy::for_job(JOB_ID).with_network_type(NetworkType::Unrecognized(9)),
        ));
        assert!(matches!(
            request.computed_job(),
            Err(Error::Policy(tally_policy::Error::UnrecognizedNetworkType { code: 9 }))
        ));
    }

    #[test]
    fn computed_job_applies_merged_policy() {
        let mut request = ScheduleRequest::new(job())
            .with_server_policy(Some(JobPolicy::for_job(JOB_ID).with_is_persisted(true)));
        let computed = request.computed_job().unwrap();
        assert!(computed.persisted);
        assert_eq!(computed.job_id, JOB_ID);
    }

    #[tokio::test]
    async fn unrecognized_network_type_fails() {
        let resolver = JobScheduleResolver::new(Arc::new(MemoryScheduler::new()));
        let request = ScheduleRequest::new(job()).with_server_policy(Some(
            JobPolicy::for_job(JOB_ID).with_network_type(NetworkType::Unrecognized(9)),
        ));
        assert_eq!(
            resolver.schedule_in_background(request).await,
            SchedulingOutcome::Failed
        );
    }

    #[tokio::test]
    async fn background_outcome_reaches_stats() {
        #[derive(Default)]
        struct RecordingStats(Mutex<Vec<SchedulingStats>>);

        impl StatsSink for RecordingStats {
            fn log_scheduling_stats(&self, stats: &SchedulingStats) {
                self.0.lock().unwrap().push(*stats);
            }
        }

        let stats = Arc::new(RecordingStats::default());
        let resolver = JobScheduleResolver::with_logger(
            Arc::new(MemoryScheduler::new()),
            SchedulingLogger::new(AlwaysLog, Arc::clone(&stats)),
        );

        resolver
            .schedule_in_background(ScheduleRequest::new(job()))
            .await;

        assert_eq!(
            *stats.0.lock().unwrap(),
            vec![SchedulingStats {
                job_id: JOB_ID,
                result_code: SchedulingResultCode::Successful,
            }]
        );
    }

    proptest! {
        #[test]
        fn matching_pending_job_is_only_rescheduled_when_forced(
            persisted in any::<bool>(),
            generation in any::<i64>(),
            force in any::<bool>(),
        ) {
            let mut builder = job();
            builder.set_persisted(persisted).set_extra("generation", generation);
            let computed = info(&builder);

            let expected = if force {
                SchedulingDecision::Schedule(ScheduleReason::Forced)
            } else {
                SchedulingDecision::Skip
            };
            prop_assert_eq!(decide(&computed, Some(&computed.clone()), force), expected);
        }
    }
}
