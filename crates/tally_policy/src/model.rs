//! Typed job policy model.
//!
//! Every field of a [`JobPolicy`] is optional: a policy only states what it
//! wants to override. Timing parameters are a one-of, so a policy can never be
//! both periodic and one-off.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A partially-specified scheduling policy for one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobPolicy {
    /// Job the policy applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i32>,
    /// Required network connectivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<NetworkType>,
    /// Battery constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_type: Option<BatteryType>,
    /// Run only while the device is idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_device_idle: Option<bool>,
    /// Run only while storage is not low.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_storage_not_low: Option<bool>,
    /// Keep the job across reboots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_persisted: Option<bool>,
    /// Timing parameters, written as a single-key map such as
    /// `params: { periodic: {...} }`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map"
    )]
    pub params: Option<JobParams>,
}

/// Network requirement as carried by a policy document.
///
/// Codes outside the known set are preserved rather than rejected, so a
/// server may push values newer than this build understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "NetworkTypeRepr", into = "NetworkTypeRepr")]
pub enum NetworkType {
    /// No network needed.
    None,
    /// Any connection.
    Any,
    /// Unmetered connection.
    Unmetered,
    /// Connection that is not roaming.
    NotRoaming,
    /// Cellular connection.
    Cellular,
    /// A code this build does not know.
    Unrecognized(i32),
}

/// Serialized form of a [`NetworkType`]: a name, or a raw code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkTypeRepr {
    /// Known name such as `cellular`.
    Name(String),
    /// Numeric wire code.
    Code(i32),
}

impl NetworkType {
    /// Maps a wire code to a network type.
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Any,
            2 => Self::Unmetered,
            3 => Self::NotRoaming,
            4 => Self::Cellular,
            other => Self::Unrecognized(other),
        }
    }

    /// Wire code of the network type.
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Any => 1,
            Self::Unmetered => 2,
            Self::NotRoaming => 3,
            Self::Cellular => 4,
            Self::Unrecognized(code) => code,
        }
    }

    /// Document name, if the type is known.
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::None => Some("none"),
            Self::Any => Some("any"),
            Self::Unmetered => Some("unmetered"),
            Self::NotRoaming => Some("not_roaming"),
            Self::Cellular => Some("cellular"),
            Self::Unrecognized(_) => None,
        }
    }

    /// Parses a document name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::None),
            "any" => Ok(Self::Any),
            "unmetered" => Ok(Self::Unmetered),
            "not_roaming" => Ok(Self::NotRoaming),
            "cellular" => Ok(Self::Cellular),
            other => Err(Error::InvalidArgument(format!(
                "unknown network type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "unrecognized({})", self.code()),
        }
    }
}

impl TryFrom<NetworkTypeRepr> for NetworkType {
    type Error = Error;

    fn try_from(repr: NetworkTypeRepr) -> Result<Self> {
        match repr {
            NetworkTypeRepr::Name(name) => Self::from_name(&name),
            NetworkTypeRepr::Code(code) => Ok(Self::from_code(code)),
        }
    }
}

impl From<NetworkType> for NetworkTypeRepr {
    fn from(network: NetworkType) -> Self {
        match network.name() {
            Some(name) => Self::Name(name.to_string()),
            None => Self::Code(network.code()),
        }
    }
}

/// Battery constraint. The three values are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryType {
    /// No battery requirement.
    RequireNone,
    /// Device must be charging.
    RequireCharging,
    /// Battery must not be low.
    RequireNotLow,
}

impl fmt::Display for BatteryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RequireNone => "require_none",
            Self::RequireCharging => "require_charging",
            Self::RequireNotLow => "require_not_low",
        })
    }
}

/// Timing parameters of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobParams {
    /// Recurring job.
    Periodic(PeriodicParams),
    /// Job that runs once.
    OneOff(OneOffParams),
    /// Job triggered by content changes.
    TriggerContent(TriggerContentParams),
}

impl JobParams {
    /// Short name of the parameter kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Periodic(_) => "periodic",
            Self::OneOff(_) => "one_off",
            Self::TriggerContent(_) => "trigger_content",
        }
    }
}

/// Parameters of a periodic job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodicParams {
    /// Interval between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic_interval_ms: Option<u64>,
    /// Flex window at the end of each interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex_interval_ms: Option<u64>,
}

/// Parameters of a one-off job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneOffParams {
    /// Earliest start after scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_latency_ms: Option<u64>,
    /// Latest start after scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_deadline_ms: Option<u64>,
}

/// Parameters of a content-triggered job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerContentParams {
    /// Content URIs to observe.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trigger_content_uris: Vec<String>,
    /// Maximum delay before running after the first change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_content_max_delay_ms: Option<u64>,
    /// Delay after the last change before running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_content_update_delay_ms: Option<u64>,
}

/// Server-pushed bundle of job policies for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleJobPolicy {
    /// Per-job overrides.
    #[serde(default)]
    pub job_policies: Vec<JobPolicy>,
}

impl JobPolicy {
    /// Creates an empty policy for a job.
    #[must_use]
    pub fn for_job(job_id: i32) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::default()
        }
    }

    /// Sets the network type.
    #[must_use]
    pub const fn with_network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = Some(network_type);
        self
    }

    /// Sets the battery constraint.
    #[must_use]
    pub const fn with_battery_type(mut self, battery_type: BatteryType) -> Self {
        self.battery_type = Some(battery_type);
        self
    }

    /// Sets the device-idle requirement.
    #[must_use]
    pub const fn with_require_device_idle(mut self, value: bool) -> Self {
        self.require_device_idle = Some(value);
        self
    }

    /// Sets the storage-not-low requirement.
    #[must_use]
    pub const fn with_require_storage_not_low(mut self, value: bool) -> Self {
        self.require_storage_not_low = Some(value);
        self
    }

    /// Sets persistence.
    #[must_use]
    pub const fn with_is_persisted(mut self, value: bool) -> Self {
        self.is_persisted = Some(value);
        self
    }

    /// Sets the timing parameters.
    #[must_use]
    pub fn with_params(mut self, params: JobParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Returns true if the policy overrides nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl ModuleJobPolicy {
    /// Returns the first policy for `job_id`, if any.
    pub fn policy_for(&self, job_id: i32) -> Option<&JobPolicy> {
        self.job_policies
            .iter()
            .find(|policy| policy.job_id == Some(job_id))
    }
}
