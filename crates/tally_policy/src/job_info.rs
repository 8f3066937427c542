//! Concrete job descriptors handed to the platform scheduler.
//!
//! A [`JobInfo`] is what actually gets scheduled. Two descriptors compare
//! equal only if every field matches, extras included, which is what the
//! scheduler uses to decide whether a pending job must be replaced.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Flag asking the scheduler to also observe descendants of a content URI.
pub const FLAG_NOTIFY_FOR_DESCENDANTS: u32 = 1;

/// Network requirement understood by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobNetworkType {
    /// No network needed.
    #[default]
    None,
    /// Any connection.
    Any,
    /// Unmetered connection.
    Unmetered,
    /// Connection that is not roaming.
    NotRoaming,
    /// Cellular connection.
    Cellular,
}

impl fmt::Display for JobNetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Any => "any",
            Self::Unmetered => "unmetered",
            Self::NotRoaming => "not_roaming",
            Self::Cellular => "cellular",
        })
    }
}

/// A content URI the job observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerContentUri {
    /// Observed URI.
    pub uri: String,
    /// Observation flags.
    pub flags: u32,
}

impl TriggerContentUri {
    /// Creates a trigger URI.
    pub fn new(uri: impl Into<String>, flags: u32) -> Self {
        Self {
            uri: uri.into(),
            flags,
        }
    }
}

/// Interval and flex window of a periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodicTiming {
    /// Interval between runs.
    pub interval_ms: u64,
    /// Flex window at the end of each interval, never longer than it.
    pub flex_ms: u64,
}

/// Opaque value stored in a job's extras.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    /// Boolean extra.
    Bool(bool),
    /// Integer extra.
    Int(i64),
    /// String extra.
    Str(String),
}

impl From<bool> for ExtraValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ExtraValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ExtraValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A fully-specified job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobInfo {
    /// Job id.
    pub job_id: i32,
    /// Service that runs the job.
    pub service: String,
    /// Network requirement.
    #[serde(default)]
    pub network_type: JobNetworkType,
    /// Run only while charging.
    #[serde(default)]
    pub requires_charging: bool,
    /// Run only while the battery is not low.
    #[serde(default)]
    pub requires_battery_not_low: bool,
    /// Run only while the device is idle.
    #[serde(default)]
    pub requires_device_idle: bool,
    /// Run only while storage is not low.
    #[serde(default)]
    pub requires_storage_not_low: bool,
    /// Keep the job across reboots.
    #[serde(default)]
    pub persisted: bool,
    /// Periodic timing, if the job recurs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic: Option<PeriodicTiming>,
    /// Earliest start after scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_latency_ms: Option<u64>,
    /// Latest start after scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_deadline_ms: Option<u64>,
    /// Observed content URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_content_uris: Vec<TriggerContentUri>,
    /// Delay after the last content change before running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_content_update_delay_ms: Option<u64>,
    /// Maximum delay after the first content change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_content_max_delay_ms: Option<u64>,
    /// Opaque key/value payload passed to the job.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, ExtraValue>,
}

impl JobInfo {
    /// Stable digest of the descriptor, as 16 hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the descriptor cannot be encoded.
    pub fn fingerprint(&self) -> Result<String> {
        let encoded = serde_json::to_vec(self)?;
        Ok(format!("{:016x}", xxh64(&encoded, 0)))
    }

    /// Returns true if the job observes content URIs.
    pub fn is_content_triggered(&self) -> bool {
        !self.trigger_content_uris.is_empty()
    }
}

/// Mutable builder for [`JobInfo`].
///
/// Builders outlive a single [`build`](JobInfoBuilder::build): applying
/// several policies to one builder accumulates their effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfoBuilder {
    info: JobInfo,
}

impl JobInfoBuilder {
    /// Starts a job with default constraints.
    pub fn new(job_id: i32, service: impl Into<String>) -> Self {
        Self {
            info: JobInfo {
                job_id,
                service: service.into(),
                network_type: JobNetworkType::None,
                requires_charging: false,
                requires_battery_not_low: false,
                requires_device_idle: false,
                requires_storage_not_low: false,
                persisted: false,
                periodic: None,
                min_latency_ms: None,
                override_deadline_ms: None,
                trigger_content_uris: Vec::new(),
                trigger_content_update_delay_ms: None,
                trigger_content_max_delay_ms: None,
                extras: BTreeMap::new(),
            },
        }
    }

    /// Job id being built.
    pub const fn job_id(&self) -> i32 {
        self.info.job_id
    }

    /// Current periodic timing, if set.
    pub const fn periodic(&self) -> Option<PeriodicTiming> {
        self.info.periodic
    }

    /// Sets the network requirement.
    pub fn set_network_type(&mut self, network_type: JobNetworkType) -> &mut Self {
        self.info.network_type = network_type;
        self
    }

    /// Sets the charging requirement.
    pub fn set_requires_charging(&mut self, value: bool) -> &mut Self {
        self.info.requires_charging = value;
        self
    }

    /// Sets the battery-not-low requirement.
    pub fn set_requires_battery_not_low(&mut self, value: bool) -> &mut Self {
        self.info.requires_battery_not_low = value;
        self
    }

    /// Sets the device-idle requirement.
    pub fn set_requires_device_idle(&mut self, value: bool) -> &mut Self {
        self.info.requires_device_idle = value;
        self
    }

    /// Sets the storage-not-low requirement.
    pub fn set_requires_storage_not_low(&mut self, value: bool) -> &mut Self {
        self.info.requires_storage_not_low = value;
        self
    }

    /// Sets persistence across reboots.
    pub fn set_persisted(&mut self, value: bool) -> &mut Self {
        self.info.persisted = value;
        self
    }

    /// Makes the job periodic with a flex window equal to the interval.
    pub fn set_periodic(&mut self, interval_ms: u64) -> &mut Self {
        self.set_periodic_with_flex(interval_ms, interval_ms)
    }

    /// Makes the job periodic. The flex window is clamped to the interval.
    pub fn set_periodic_with_flex(&mut self, interval_ms: u64, flex_ms: u64) -> &mut Self {
        self.info.periodic = Some(PeriodicTiming {
            interval_ms,
            flex_ms: flex_ms.min(interval_ms),
        });
        self
    }

    /// Sets the minimum latency.
    pub fn set_minimum_latency(&mut self, latency_ms: u64) -> &mut Self {
        self.info.min_latency_ms = Some(latency_ms);
        self
    }

    /// Sets the override deadline.
    pub fn set_override_deadline(&mut self, deadline_ms: u64) -> &mut Self {
        self.info.override_deadline_ms = Some(deadline_ms);
        self
    }

    /// Adds an observed content URI.
    pub fn add_trigger_content_uri(&mut self, uri: TriggerContentUri) -> &mut Self {
        self.info.trigger_content_uris.push(uri);
        self
    }

    /// Sets the content update delay.
    pub fn set_trigger_content_update_delay(&mut self, delay_ms: u64) -> &mut Self {
        self.info.trigger_content_update_delay_ms = Some(delay_ms);
        self
    }

    /// Sets the content maximum delay.
    pub fn set_trigger_content_max_delay(&mut self, delay_ms: u64) -> &mut Self {
        self.info.trigger_content_max_delay_ms = Some(delay_ms);
        self
    }

    /// Stores an extra.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<ExtraValue>) -> &mut Self {
        self.info.extras.insert(key.into(), value.into());
        self
    }

    /// Builds the descriptor, leaving the builder usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for combinations the scheduler
    /// refuses: periodic jobs with a latency, deadline or content trigger, and
    /// persisted content-triggered jobs.
    pub fn build(&self) -> Result<JobInfo> {
        let info = &self.info;
        if info.periodic.is_some() {
            if info.min_latency_ms.is_some() || info.override_deadline_ms.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "job {}: periodic jobs cannot have a minimum latency or override deadline",
                    info.job_id
                )));
            }
            if info.is_content_triggered() {
                return Err(Error::InvalidArgument(format!(
                    "job {}: content-triggered jobs cannot be periodic",
                    info.job_id
                )));
            }
        }
        if info.persisted && info.is_content_triggered() {
            return Err(Error::InvalidArgument(format!(
                "job {}: content-triggered jobs cannot be persisted",
                info.job_id
            )));
        }
        Ok(info.clone())
    }
}
