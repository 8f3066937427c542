//! Applying a merged policy to a job builder.

use crate::error::{Error, Result};
use crate::job_info::{
    JobInfo, JobInfoBuilder, JobNetworkType, TriggerContentUri, FLAG_NOTIFY_FOR_DESCENDANTS,
};
use crate::model::{BatteryType, JobParams, JobPolicy, NetworkType};
use tracing::debug;

/// Maps a policy network type onto the scheduler's closed set.
///
/// # Errors
///
/// Returns [`Error::UnrecognizedNetworkType`] for codes outside the set.
pub const fn convert_network_type(network_type: NetworkType) -> Result<JobNetworkType> {
    match network_type {
        NetworkType::None => Ok(JobNetworkType::None),
        NetworkType::Any => Ok(JobNetworkType::Any),
        NetworkType::Unmetered => Ok(JobNetworkType::Unmetered),
        NetworkType::NotRoaming => Ok(JobNetworkType::NotRoaming),
        NetworkType::Cellular => Ok(JobNetworkType::Cellular),
        NetworkType::Unrecognized(code) => Err(Error::UnrecognizedNetworkType { code }),
    }
}

/// Overrides `builder` with every field set in `policy` and builds the job.
///
/// On success the builder keeps the applied overrides, so trigger URIs from
/// successive calls accumulate. On error the builder is left untouched. A
/// `None` policy builds the job unchanged.
///
/// # Errors
///
/// Returns [`Error::UnrecognizedNetworkType`] for an unknown network code,
/// [`Error::InvalidArgument`] for periodic params without any interval, and
/// any error from [`JobInfoBuilder::build`].
pub fn apply_policy_to_job_info(
    builder: &mut JobInfoBuilder,
    policy: Option<&JobPolicy>,
) -> Result<JobInfo> {
    let Some(policy) = policy else {
        return builder.build();
    };

    let mut staged = builder.clone();
    apply_overrides(&mut staged, policy)?;
    let info = staged.build()?;
    *builder = staged;

    debug!(job_id = info.job_id, "Applied job policy");
    Ok(info)
}

fn apply_overrides(builder: &mut JobInfoBuilder, policy: &JobPolicy) -> Result<()> {
    if let Some(network_type) = policy.network_type {
        builder.set_network_type(convert_network_type(network_type)?);
    }
    if let Some(battery_type) = policy.battery_type {
        let (charging, not_low) = match battery_type {
            BatteryType::RequireNone => (false, false),
            BatteryType::RequireCharging => (true, false),
            BatteryType::RequireNotLow => (false, true),
        };
        builder
            .set_requires_charging(charging)
            .set_requires_battery_not_low(not_low);
    }
    if let Some(idle) = policy.require_device_idle {
        builder.set_requires_device_idle(idle);
    }
    if let Some(storage_not_low) = policy.require_storage_not_low {
        builder.set_requires_storage_not_low(storage_not_low);
    }
    if let Some(persisted) = policy.is_persisted {
        builder.set_persisted(persisted);
    }

    match &policy.params {
        Some(JobParams::Periodic(params)) => {
            let interval_ms = params
                .periodic_interval_ms
                .or_else(|| builder.periodic().map(|timing| timing.interval_ms))
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "job {}: periodic params carry no interval",
                        builder.job_id()
                    ))
                })?;
            builder.set_periodic_with_flex(
                interval_ms,
                params.flex_interval_ms.unwrap_or(interval_ms),
            );
        }
        Some(JobParams::OneOff(params)) => {
            if let Some(latency_ms) = params.minimum_latency_ms {
                builder.set_minimum_latency(latency_ms);
            }
            if let Some(deadline_ms) = params.override_deadline_ms {
                builder.set_override_deadline(deadline_ms);
            }
        }
        Some(JobParams::TriggerContent(params)) => {
            for uri in &params.trigger_content_uris {
                builder.add_trigger_content_uri(TriggerContentUri::new(
                    uri.as_str(),
                    FLAG_NOTIFY_FOR_DESCENDANTS,
                ));
            }
            if let Some(delay_ms) = params.trigger_content_max_delay_ms {
                builder.set_trigger_content_max_delay(delay_ms);
            }
            if let Some(delay_ms) = params.trigger_content_update_delay_ms {
                builder.set_trigger_content_update_delay(delay_ms);
            }
        }
        None => {}
    }
    Ok(())
}
