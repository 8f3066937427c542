//! Scheduling resolution for Tally.
//!
//! This crate provides:
//! - The skip/schedule decision for a computed job against the pending one
//! - A resolver that merges policies, applies them and schedules off the
//!   async runtime
//! - Outcome logging with stats gated by a cohort sampler
//! - Job execution logging (latency, period between runs, halted runs) gated
//!   by the same sampler
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_scheduler::{JobScheduleResolver, ScheduleRequest};
//!
//! let resolver = JobScheduleResolver::new(Arc::new(platform_scheduler));
//! let request = ScheduleRequest::new(builder)
//!     .with_default_policy(defaults)
//!     .with_server_policy(module.policy_for(job_id).cloned());
//! let outcome = resolver.schedule_in_background(request).await;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod execution;
pub mod logging;
pub mod resolver;
pub mod sink;

pub use error::{Error, Result};
pub use execution::{
    ExecutionRecord, ExecutionResult, ExecutionResultCode, ExecutionStats, ExecutionStatsSink,
    ExecutionStore, JobExecutionLogger, MemoryExecutionStore,
};
pub use logging::{DiscardStats, SchedulingLogger, SchedulingResultCode, SchedulingStats, StatsSink};
pub use resolver::{
    decide, JobScheduleResolver, ScheduleReason, ScheduleRequest, SchedulingDecision,
    SchedulingOutcome,
};
pub use sink::{JobSchedulerSink, MemoryScheduler};
