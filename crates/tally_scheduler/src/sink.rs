//! The platform scheduler, as seen by the resolver.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tally_policy::JobInfo;

/// Blocking handle to the platform job scheduler.
///
/// Calls may block, so the resolver only invokes them from a blocking task
/// when running in the background.
pub trait JobSchedulerSink: Send + Sync {
    /// Returns the job currently pending under `job_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot be queried.
    fn pending_job(&self, job_id: i32) -> Result<Option<JobInfo>>;

    /// Schedules `info`, replacing any pending job with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler rejects the job.
    fn schedule(&self, info: JobInfo) -> Result<()>;
}

impl<T: JobSchedulerSink + ?Sized> JobSchedulerSink for Arc<T> {
    fn pending_job(&self, job_id: i32) -> Result<Option<JobInfo>> {
        (**self).pending_job(job_id)
    }

    fn schedule(&self, info: JobInfo) -> Result<()> {
        (**self).schedule(info)
    }
}

/// In-process scheduler keeping pending jobs in a map.
#[derive(Debug, Default)]
pub struct MemoryScheduler {
    jobs: Mutex<HashMap<i32, JobInfo>>,
    rejecting: Mutex<Option<String>>,
}

impl MemoryScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `schedule` call fail with `reason`.
    pub fn reject_with(&self, reason: impl Into<String>) {
        *self.rejecting.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if no job is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobSchedulerSink for MemoryScheduler {
    fn pending_job(&self, job_id: i32) -> Result<Option<JobInfo>> {
        Ok(self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .cloned())
    }

    fn schedule(&self, info: JobInfo) -> Result<()> {
        if let Some(reason) = self
            .rejecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(Error::Unavailable(reason));
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.job_id, info);
        Ok(())
    }
}
