//! Job scheduling policies for Tally.
//!
//! This crate provides:
//! - A typed, all-optional job policy model
//! - Merging of a compiled-in default policy with a server override
//! - Validity checks for constraint combinations the scheduler rejects
//! - Application of a merged policy to a concrete [`JobInfo`]
//! - YAML/JSON policy documents and a Markdown policy report
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_policy::{apply_policy_to_job_info, merge_two_policies, JobInfoBuilder};
//!
//! let merged = merge_two_policies(Some(defaults), server_override)?;
//! let mut builder = JobInfoBuilder::new(7, "sync-service");
//! let info = apply_policy_to_job_info(&mut builder, merged.as_ref())?;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod apply;
pub mod error;
pub mod job_info;
pub mod merge;
pub mod model;
pub mod parser;
pub mod report;

pub use apply::{apply_policy_to_job_info, convert_network_type};
pub use error::{Error, Result};
pub use job_info::{
    ExtraValue, JobInfo, JobInfoBuilder, JobNetworkType, PeriodicTiming, TriggerContentUri,
    FLAG_NOTIFY_FOR_DESCENDANTS,
};
pub use merge::{enforce_validity, merge_two_policies};
pub use model::{
    BatteryType, JobParams, JobPolicy, ModuleJobPolicy, NetworkType, OneOffParams,
    PeriodicParams, TriggerContentParams,
};
pub use parser::{parse_job_policy, parse_module_job_policy, DocumentFormat};
pub use report::describe_policy;
