//! Staggered rotation math and the per-period cohort decision.
//!
//! Devices are split into `rotation / staggering` stagger groups by their
//! selection id. Each group's rotation schedule is shifted by
//! `staggering * group`, so cohort membership changes for one group at a time
//! instead of for the whole population at once.
//!
//! Everything here is a pure function of its arguments: no clock reads, no
//! shared state.

use crate::config::SamplingConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

/// Seed of the cohort hash.
const COHORT_HASH_SEED: u32 = 0;

/// Rotation period a device currently falls in, and when that stops being true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodInfo {
    /// Index of the (shifted) rotation period since the UNIX epoch.
    pub period_number: i64,
    /// Instant at which a decision made for this period becomes stale.
    pub stagger_period_end_time: DateTime<Utc>,
}

/// A cohort decision together with the period it was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Whether the device is in the cohort.
    pub selected: bool,
    /// Period the decision applies to.
    pub period: PeriodInfo,
}

/// Validated pair of periods in epoch milliseconds.
#[derive(Debug, Clone, Copy)]
struct Periods {
    staggering_ms: i64,
    rotation_ms: i64,
}

impl Periods {
    fn new(staggering_period: Duration, rotation_period: Duration) -> Result<Self> {
        let staggering_ms = duration_millis(staggering_period, "staggering period")?;
        let rotation_ms = duration_millis(rotation_period, "rotation period")?;
        if rotation_ms < staggering_ms {
            return Err(Error::InvalidArgument(format!(
                "rotation period ({rotation_ms}ms) must not be shorter than staggering period ({staggering_ms}ms)"
            )));
        }
        Ok(Self {
            staggering_ms,
            rotation_ms,
        })
    }

    const fn frequency(self) -> i64 {
        self.rotation_ms / self.staggering_ms
    }

    const fn group(self, selection_id: i64) -> i64 {
        // The remainder is strictly smaller than the frequency in magnitude,
        // so `abs` cannot overflow even for i64::MIN.
        (selection_id % self.frequency()).abs()
    }

    const fn shift_ms(self, selection_id: i64) -> i64 {
        self.staggering_ms * self.group(selection_id)
    }
}

/// Converts a period to whole milliseconds, rejecting zero and oversized values.
pub(crate) fn duration_millis(period: Duration, what: &str) -> Result<i64> {
    let millis = i64::try_from(period.as_millis())
        .map_err(|_| Error::InvalidArgument(format!("{what} is too long: {period:?}")))?;
    if millis <= 0 {
        return Err(Error::InvalidArgument(format!(
            "{what} must be at least 1ms, got {period:?}"
        )));
    }
    Ok(millis)
}

fn out_of_range(event_time: DateTime<Utc>) -> Error {
    Error::InvalidArgument(format!("event time {event_time} is out of range"))
}

/// Number of stagger groups: `floor(rotation / staggering)`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the periods are invalid.
pub fn stagger_frequency(staggering_period: Duration, rotation_period: Duration) -> Result<i64> {
    Ok(Periods::new(staggering_period, rotation_period)?.frequency())
}

/// Stagger group of a device: `abs(selection_id mod frequency)`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the periods are invalid.
pub fn stagger_group(
    selection_id: i64,
    staggering_period: Duration,
    rotation_period: Duration,
) -> Result<i64> {
    Ok(Periods::new(staggering_period, rotation_period)?.group(selection_id))
}

/// Offset applied to a device's rotation schedule, in `[0, rotation)`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the periods are invalid.
#[allow(clippy::cast_sign_loss)]
pub fn shift_period(
    selection_id: i64,
    staggering_period: Duration,
    rotation_period: Duration,
) -> Result<Duration> {
    let shift_ms = Periods::new(staggering_period, rotation_period)?.shift_ms(selection_id);
    // The group is never negative, so neither is the shift.
    Ok(Duration::from_millis(shift_ms as u64))
}

/// Computes the rotation period `event_time` falls in for `selection_id`, and
/// the end of the current stagger period.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if either period is zero, the rotation
/// period is shorter than the staggering period, or the computation leaves
/// the representable time range.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use std::time::Duration;
/// use tally_sampling::compute_period_info;
///
/// let day = Duration::from_secs(86_400);
/// let info = compute_period_info(Utc.timestamp_opt(0, 0).unwrap(), 5, day, day * 7).unwrap();
/// assert_eq!(info.period_number, 0);
/// ```
pub fn compute_period_info(
    event_time: DateTime<Utc>,
    selection_id: i64,
    staggering_period: Duration,
    rotation_period: Duration,
) -> Result<PeriodInfo> {
    let periods = Periods::new(staggering_period, rotation_period)?;
    let rotation = periods.rotation_ms;
    let shift = periods.shift_ms(selection_id);
    let event_ms = event_time.timestamp_millis();

    let period_number = event_ms
        .checked_add(shift)
        .ok_or_else(|| out_of_range(event_time))?
        .div_euclid(rotation);

    // Start of the current stagger period: the shifted boundary inside the
    // unshifted period, moved back one rotation if it has not started yet.
    let mut start = event_ms
        .div_euclid(rotation)
        .checked_mul(rotation)
        .and_then(|boundary| boundary.checked_add(shift))
        .ok_or_else(|| out_of_range(event_time))?;
    if start > event_ms {
        start = start
            .checked_sub(rotation)
            .ok_or_else(|| out_of_range(event_time))?;
    }

    let end_ms = start
        .checked_add(rotation)
        .ok_or_else(|| out_of_range(event_time))?;
    let stagger_period_end_time = Utc
        .timestamp_millis_opt(end_ms)
        .single()
        .ok_or_else(|| out_of_range(event_time))?;

    Ok(PeriodInfo {
        period_number,
        stagger_period_end_time,
    })
}

/// Cohort hash: the low 64 bits of `murmur3_x64_128` over the little-endian
/// selection id, the little-endian period number and the UTF-8 group name.
///
/// # Errors
///
/// Returns [`Error::Hash`] if the hasher fails to read its input.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn cohort_hash(selection_id: i64, period_number: i64, group_name: &str) -> Result<i64> {
    let mut input = Vec::with_capacity(16 + group_name.len());
    input.extend_from_slice(&selection_id.to_le_bytes());
    input.extend_from_slice(&period_number.to_le_bytes());
    input.extend_from_slice(group_name.as_bytes());

    let hash = murmur3::murmur3_x64_128(&mut Cursor::new(input), COHORT_HASH_SEED)?;
    Ok(hash as u64 as i64)
}

/// Largest hash magnitude (exclusive) that is still selected at `sampling_rate`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn selection_threshold(sampling_rate: f64) -> i64 {
    (i64::MAX as f64 * sampling_rate) as i64
}

/// Decides whether a device is in the cohort for a period.
///
/// A rate of 1.0 selects without hashing; a rate of 0.0 never selects.
///
/// # Errors
///
/// Returns [`Error::Hash`] if hashing fails.
pub fn should_select(
    selection_id: i64,
    period_number: i64,
    config: &SamplingConfig,
) -> Result<bool> {
    if config.selects_all() {
        return Ok(true);
    }
    if config.selects_none() {
        return Ok(false);
    }
    let hash = cohort_hash(selection_id, period_number, config.group_name())?;
    // i64::MIN keeps its sign under wrapping_abs and is therefore selected.
    Ok(hash.wrapping_abs() < selection_threshold(config.sampling_rate()))
}

/// Computes the period for `event_time` and the cohort decision for it.
///
/// # Errors
///
/// Propagates errors from [`compute_period_info`] and [`should_select`].
pub fn select(
    event_time: DateTime<Utc>,
    selection_id: i64,
    config: &SamplingConfig,
) -> Result<Selection> {
    let period = compute_period_info(
        event_time,
        selection_id,
        config.staggering_period(),
        config.rotation_period(),
    )?;
    let selected = should_select(selection_id, period.period_number, config)?;
    Ok(Selection { selected, period })
}
