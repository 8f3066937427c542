//! Deterministic device cohort selection for Tally.
//!
//! This crate provides:
//! - Staggered rotation period math ([`compute_period_info`])
//! - The murmur3-based cohort decision ([`should_select`])
//! - A per-metric sampler that caches its decision until the current stagger
//!   period ends ([`PerDeviceSampler`])
//! - One-time resolution of the persisted device selection id
//!
//! # Example
//!
//! ```rust,ignore
//! use tally_sampling::{PerDeviceSampler, SamplingConfig, SelectionIdProvider, SystemClock};
//!
//! let config = SamplingConfig::from_yaml(&std::fs::read_to_string("sampling.yaml")?)?;
//! let ids = SelectionIdProvider::new(store, SystemClock);
//! let sampler = PerDeviceSampler::new("job-execution", Some(config), SystemClock, ids);
//!
//! if sampler.should_log().await? {
//!     upload(record);
//! }
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod sampler;
pub mod selection;

pub use clock::{Clock, SystemClock};
pub use config::{SamplingConfig, SamplingConfigDocument};
pub use error::{Error, Result};
pub use identity::{generate_selection_id, IdentifierStore, SelectionIdProvider, SelectionIdSource};
pub use sampler::{AlwaysLog, CachedDecision, PerDeviceSampler, Sampler, SamplerOptions};
pub use selection::{
    cohort_hash, compute_period_info, select, selection_threshold, shift_period, should_select,
    stagger_frequency, stagger_group, PeriodInfo, Selection,
};
