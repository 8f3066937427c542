//! Sampling configuration.
//!
//! A [`SamplingConfig`] is built once from a configuration source and never
//! mutated. Construction validates every field, so a config that exists is a
//! config the selection engine can use.

use crate::error::{Error, Result};
use crate::selection::duration_millis;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable cohort sampling configuration for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SamplingConfigDocument", into = "SamplingConfigDocument")]
pub struct SamplingConfig {
    sampling_rate: f64,
    rotation_period: Duration,
    staggering_period: Duration,
    group_name: String,
}

/// Serialized form of a [`SamplingConfig`], with millisecond durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfigDocument {
    /// Fraction of devices to select, in `[0, 1]`.
    pub sampling_rate: f64,
    /// Length of a full rotation, in milliseconds.
    pub rotation_period_ms: u64,
    /// Offset between stagger groups, in milliseconds.
    pub staggering_period_ms: u64,
    /// Hash salt shared by metrics that rotate together.
    #[serde(default)]
    pub group_name: String,
}

impl SamplingConfig {
    /// Creates a validated sampling configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if:
    /// - `sampling_rate` is not within `[0, 1]`
    /// - either period is zero at millisecond resolution
    /// - `staggering_period` is longer than `rotation_period`
    pub fn new(
        sampling_rate: f64,
        rotation_period: Duration,
        staggering_period: Duration,
        group_name: impl Into<String>,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&sampling_rate) {
            return Err(Error::InvalidArgument(format!(
                "sampling rate must be within [0, 1], got {sampling_rate}"
            )));
        }
        let rotation_ms = duration_millis(rotation_period, "rotation period")?;
        let staggering_ms = duration_millis(staggering_period, "staggering period")?;
        if rotation_ms < staggering_ms {
            return Err(Error::InvalidArgument(format!(
                "rotation period ({rotation_ms}ms) must not be shorter than staggering period ({staggering_ms}ms)"
            )));
        }

        Ok(Self {
            sampling_rate,
            rotation_period,
            staggering_period,
            group_name: group_name.into(),
        })
    }

    /// Parses a configuration from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let document: SamplingConfigDocument = serde_yaml::from_str(input)?;
        Self::try_from(document)
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json(input: &str) -> Result<Self> {
        let document: SamplingConfigDocument = serde_json::from_str(input)?;
        Self::try_from(document)
    }

    /// Fraction of devices selected per rotation period.
    pub const fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Full rotation length.
    pub const fn rotation_period(&self) -> Duration {
        self.rotation_period
    }

    /// Offset between consecutive stagger groups.
    pub const fn staggering_period(&self) -> Duration {
        self.staggering_period
    }

    /// Hash salt.
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// True if every device is selected.
    #[allow(clippy::float_cmp)]
    pub fn selects_all(&self) -> bool {
        self.sampling_rate == 1.0
    }

    /// True if no device is selected.
    #[allow(clippy::float_cmp)]
    pub fn selects_none(&self) -> bool {
        self.sampling_rate == 0.0
    }
}

impl TryFrom<SamplingConfigDocument> for SamplingConfig {
    type Error = Error;

    fn try_from(document: SamplingConfigDocument) -> Result<Self> {
        Self::new(
            document.sampling_rate,
            Duration::from_millis(document.rotation_period_ms),
            Duration::from_millis(document.staggering_period_ms),
            document.group_name,
        )
    }
}

impl From<SamplingConfig> for SamplingConfigDocument {
    #[allow(clippy::cast_possible_truncation)]
    fn from(config: SamplingConfig) -> Self {
        // Validated periods fit in i64 millis, so they fit in u64 too.
        Self {
            sampling_rate: config.sampling_rate,
            rotation_period_ms: config.rotation_period.as_millis() as u64,
            staggering_period_ms: config.staggering_period.as_millis() as u64,
            group_name: config.group_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn accepts_valid_config() {
        let config = SamplingConfig::new(0.25, DAY * 7, DAY, "metrics").unwrap();
        assert!((config.sampling_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.rotation_period(), DAY * 7);
        assert_eq!(config.staggering_period(), DAY);
        assert_eq!(config.group_name(), "metrics");
        assert!(!config.selects_all());
        assert!(!config.selects_none());
    }

    #[test]
    fn rejects_out_of_range_rate() {
        for rate in [-0.1, 1.5, f64::NAN] {
            let err = SamplingConfig::new(rate, DAY, DAY, "g").unwrap_err();
            assert!(err.is_invalid_argument(), "rate {rate} should be rejected");
        }
    }

    #[test]
    fn rejects_zero_periods() {
        assert!(SamplingConfig::new(0.5, Duration::ZERO, DAY, "g").is_err());
        assert!(SamplingConfig::new(0.5, DAY, Duration::ZERO, "g").is_err());
        assert!(SamplingConfig::new(0.5, DAY, Duration::from_micros(10), "g").is_err());
    }

    #[test]
    fn rejects_rotation_shorter_than_staggering() {
        let err = SamplingConfig::new(0.5, DAY, DAY * 2, "g").unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid argument: rotation period (86400000ms) must not be shorter than staggering period (172800000ms)"
        );
    }

    #[test]
    fn parses_yaml_document() {
        let config = SamplingConfig::from_yaml(
            "sampling_rate: 0.1\nrotation_period_ms: 604800000\nstaggering_period_ms: 86400000\ngroup_name: background-jobs\n",
        )
        .unwrap();
        assert_eq!(config.rotation_period(), DAY * 7);
        assert_eq!(config.group_name(), "background-jobs");
    }

    #[test]
    fn yaml_document_is_validated() {
        let err = SamplingConfig::from_yaml(
            "sampling_rate: 2.0\nrotation_period_ms: 1000\nstaggering_period_ms: 1000\n",
        )
        .unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn json_roundtrip_keeps_millis() {
        let config = SamplingConfig::new(1.0, DAY * 7, DAY, "g").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"rotation_period_ms\":604800000"));
        assert_eq!(SamplingConfig::from_json(&json).unwrap(), config);
    }
}
