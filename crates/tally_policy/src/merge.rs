//! Merging of default and server-pushed job policies.
//!
//! The server policy wins field by field. Fields it leaves unset keep the
//! default's value, and repeated fields are concatenated.

use crate::error::{Error, Result};
use crate::model::{
    BatteryType, JobParams, JobPolicy, OneOffParams, PeriodicParams, TriggerContentParams,
};
use tracing::{debug, warn};

/// Rejection message for policies whose job ids are missing or differ.
pub const MISMATCHED_JOB_ID_MESSAGE: &str =
    "job policies must carry the same job id to be merged";

/// Rejection message for policies requiring both charging and device idle.
pub const CHARGING_IDLE_MESSAGE: &str =
    "a job policy cannot require both charging and device idle";

/// Merges `overlay` onto `base`.
///
/// - Both absent: `None`.
/// - One absent: the other, after validation.
/// - Both present: every field set in `overlay` replaces the one in `base`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if both policies are present but their
/// job ids are missing or unequal, or if the result fails
/// [`enforce_validity`].
///
/// # Example
///
/// ```rust
/// use tally_policy::{merge_two_policies, JobPolicy, NetworkType};
///
/// let defaults = JobPolicy::for_job(7).with_network_type(NetworkType::Any);
/// let server = JobPolicy::for_job(7).with_network_type(NetworkType::Cellular);
///
/// let merged = merge_two_policies(Some(defaults), Some(server)).unwrap().unwrap();
/// assert_eq!(merged.network_type, Some(NetworkType::Cellular));
/// ```
pub fn merge_two_policies(
    base: Option<JobPolicy>,
    overlay: Option<JobPolicy>,
) -> Result<Option<JobPolicy>> {
    let merged = match (base, overlay) {
        (None, None) => return Ok(None),
        (Some(policy), None) | (None, Some(policy)) => policy,
        (Some(base), Some(overlay)) => {
            match (base.job_id, overlay.job_id) {
                (Some(left), Some(right)) if left == right => {}
                (left, right) => {
                    warn!(?left, ?right, "Refusing to merge policies of different jobs");
                    return Err(Error::InvalidArgument(MISMATCHED_JOB_ID_MESSAGE.to_string()));
                }
            }
            merge_fields(base, overlay)
        }
    };

    enforce_validity(&merged)?;
    debug!(job_id = ?merged.job_id, "Merged job policy");
    Ok(Some(merged))
}

/// Checks constraints the scheduler would reject.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] if the policy requires both charging and
/// device idle.
pub fn enforce_validity(policy: &JobPolicy) -> Result<()> {
    if policy.require_device_idle == Some(true)
        && policy.battery_type == Some(BatteryType::RequireCharging)
    {
        warn!(job_id = ?policy.job_id, "Job policy requires charging and idle");
        return Err(Error::InvalidArgument(CHARGING_IDLE_MESSAGE.to_string()));
    }
    Ok(())
}

fn merge_fields(base: JobPolicy, overlay: JobPolicy) -> JobPolicy {
    JobPolicy {
        job_id: overlay.job_id.or(base.job_id),
        network_type: overlay.network_type.or(base.network_type),
        battery_type: overlay.battery_type.or(base.battery_type),
        require_device_idle: overlay.require_device_idle.or(base.require_device_idle),
        require_storage_not_low: overlay
            .require_storage_not_low
            .or(base.require_storage_not_low),
        is_persisted: overlay.is_persisted.or(base.is_persisted),
        params: merge_params(base.params, overlay.params),
    }
}

fn merge_params(base: Option<JobParams>, overlay: Option<JobParams>) -> Option<JobParams> {
    match (base, overlay) {
        (base, None) => base,
        (Some(JobParams::Periodic(base)), Some(JobParams::Periodic(overlay))) => {
            Some(JobParams::Periodic(PeriodicParams {
                periodic_interval_ms: overlay.periodic_interval_ms.or(base.periodic_interval_ms),
                flex_interval_ms: overlay.flex_interval_ms.or(base.flex_interval_ms),
            }))
        }
        (Some(JobParams::OneOff(base)), Some(JobParams::OneOff(overlay))) => {
            Some(JobParams::OneOff(OneOffParams {
                minimum_latency_ms: overlay.minimum_latency_ms.or(base.minimum_latency_ms),
                override_deadline_ms: overlay.override_deadline_ms.or(base.override_deadline_ms),
            }))
        }
        (Some(JobParams::TriggerContent(base)), Some(JobParams::TriggerContent(overlay))) => {
            let mut trigger_content_uris = base.trigger_content_uris;
            trigger_content_uris.extend(overlay.trigger_content_uris);
            Some(JobParams::TriggerContent(TriggerContentParams {
                trigger_content_uris,
                trigger_content_max_delay_ms: overlay
                    .trigger_content_max_delay_ms
                    .or(base.trigger_content_max_delay_ms),
                trigger_content_update_delay_ms: overlay
                    .trigger_content_update_delay_ms
                    .or(base.trigger_content_update_delay_ms),
            }))
        }
        // A different kind replaces the base one entirely.
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NetworkType;
    use proptest::prelude::*;

    const JOB_ID: i32 = 1;

    fn periodic(interval: u64) -> JobParams {
        JobParams::Periodic(PeriodicParams {
            periodic_interval_ms: Some(interval),
            flex_interval_ms: None,
        })
    }

    fn trigger(uri: &str, max_delay: u64) -> JobParams {
        JobParams::TriggerContent(TriggerContentParams {
            trigger_content_uris: vec![uri.to_string()],
            trigger_content_max_delay_ms: Some(max_delay),
            trigger_content_update_delay_ms: None,
        })
    }

    #[test]
    fn keeps_fields_only_in_base() {
        let base = JobPolicy::for_job(JOB_ID)
            .with_network_type(NetworkType::None)
            .with_params(periodic(1_000_000));
        let overlay = JobPolicy::for_job(JOB_ID);

        let merged = merge_two_policies(Some(base.clone()), Some(overlay))
            .unwrap()
            .unwrap();

        assert_eq!(merged, base);
    }

    #[test]
    fn takes_fields_only_in_overlay() {
        let base = JobPolicy::for_job(JOB_ID);
        let overlay = JobPolicy::for_job(JOB_ID)
            .with_require_storage_not_low(false)
            .with_params(JobParams::OneOff(OneOffParams {
                minimum_latency_ms: None,
                override_deadline_ms: Some(1_000_000),
            }));

        let merged = merge_two_policies(Some(base), Some(overlay.clone()))
            .unwrap()
            .unwrap();

        assert_eq!(merged, overlay);
    }

    #[test]
    fn overlay_wins_when_both_set() {
        let base = JobPolicy::for_job(JOB_ID)
            .with_is_persisted(true)
            .with_battery_type(BatteryType::RequireCharging)
            .with_params(trigger("content://base", 1_000_000));
        let overlay = JobPolicy::for_job(JOB_ID)
            .with_is_persisted(false)
            .with_battery_type(BatteryType::RequireNotLow)
            .with_params(trigger("content://server", 2_000_000));

        let merged = merge_two_policies(Some(base), Some(overlay))
            .unwrap()
            .unwrap();

        assert_eq!(merged.is_persisted, Some(false));
        assert_eq!(merged.battery_type, Some(BatteryType::RequireNotLow));
        let Some(JobParams::TriggerContent(params)) = merged.params else {
            panic!("expected trigger content params");
        };
        assert_eq!(
            params.trigger_content_uris,
            vec!["content://base".to_string(), "content://server".to_string()]
        );
        assert_eq!(params.trigger_content_max_delay_ms, Some(2_000_000));
    }

    #[test]
    fn overlay_network_type_wins() {
        let base = JobPolicy::for_job(JOB_ID).with_network_type(NetworkType::Any);
        let overlay = JobPolicy::for_job(JOB_ID).with_network_type(NetworkType::Cellular);

        let merged = merge_two_policies(Some(base), Some(overlay))
            .unwrap()
            .unwrap();

        assert_eq!(merged.network_type, Some(NetworkType::Cellular));
    }

    #[test]
    fn same_kind_params_merge_field_wise() {
        let base = JobPolicy::for_job(JOB_ID).with_params(JobParams::Periodic(PeriodicParams {
            periodic_interval_ms: Some(3_600_000),
            flex_interval_ms: Some(600_000),
        }));
        let overlay = JobPolicy::for_job(JOB_ID).with_params(periodic(7_200_000));

        let merged = merge_two_policies(Some(base), Some(overlay))
            .unwrap()
            .unwrap();

        assert_eq!(
            merged.params,
            Some(JobParams::Periodic(PeriodicParams {
                periodic_interval_ms: Some(7_200_000),
                flex_interval_ms: Some(600_000),
            }))
        );
    }

    #[test]
    fn different_kind_params_are_replaced() {
        let base = JobPolicy::for_job(JOB_ID).with_params(periodic(3_600_000));
        let overlay = JobPolicy::for_job(JOB_ID).with_params(trigger("content://x", 10));

        let merged = merge_two_policies(Some(base), Some(overlay.clone()))
            .unwrap()
            .unwrap();

        assert_eq!(merged.params, overlay.params);
    }

    #[test]
    fn single_policy_is_validated() {
        let invalid = JobPolicy::for_job(JOB_ID)
            .with_require_device_idle(true)
            .with_battery_type(BatteryType::RequireCharging);

        let err = merge_two_policies(Some(invalid.clone()), None).unwrap_err();
        assert!(err.is_invalid_argument());
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid argument: a job policy cannot require both charging and device idle"
        );

        assert!(merge_two_policies(None, Some(invalid)).is_err());
    }

    #[test]
    fn merged_result_is_validated() {
        let base = JobPolicy::for_job(JOB_ID).with_require_device_idle(true);
        let overlay = JobPolicy::for_job(JOB_ID).with_battery_type(BatteryType::RequireCharging);

        assert!(merge_two_policies(Some(base), Some(overlay)).is_err());
    }

    #[test]
    fn rejects_mismatched_job_ids() {
        let err = merge_two_policies(
            Some(JobPolicy::for_job(JOB_ID)),
            Some(JobPolicy::for_job(JOB_ID * 2)),
        )
        .unwrap_err();

        assert!(err.to_string().contains(MISMATCHED_JOB_ID_MESSAGE));
    }

    #[test]
    fn rejects_missing_job_id() {
        let anonymous = JobPolicy::default().with_is_persisted(true);
        assert!(merge_two_policies(Some(JobPolicy::for_job(JOB_ID)), Some(anonymous)).is_err());
    }

    #[test]
    fn both_absent_is_none() {
        assert!(merge_two_policies(None, None).unwrap().is_none());
    }

    #[test]
    fn idle_without_charging_is_valid() {
        let policy = JobPolicy::for_job(JOB_ID)
            .with_require_device_idle(true)
            .with_battery_type(BatteryType::RequireNotLow);
        assert!(enforce_validity(&policy).is_ok());
    }

    fn arb_network() -> impl Strategy<Value = NetworkType> {
        (0..6i32).prop_map(NetworkType::from_code)
    }

    fn arb_battery() -> impl Strategy<Value = BatteryType> {
        prop_oneof![
            Just(BatteryType::RequireNone),
            Just(BatteryType::RequireCharging),
            Just(BatteryType::RequireNotLow),
        ]
    }

    fn arb_params() -> impl Strategy<Value = JobParams> {
        prop_oneof![
            (proptest::option::of(1u64..10_000_000), proptest::option::of(1u64..10_000_000))
                .prop_map(|(interval, flex)| JobParams::Periodic(PeriodicParams {
                    periodic_interval_ms: interval,
                    flex_interval_ms: flex,
                })),
            (proptest::option::of(0u64..10_000), proptest::option::of(0u64..10_000)).prop_map(
                |(latency, deadline)| JobParams::OneOff(OneOffParams {
                    minimum_latency_ms: latency,
                    override_deadline_ms: deadline,
                })
            ),
        ]
    }

    prop_compose! {
        // Policies without repeated fields and without the idle + charging conflict.
        fn arb_policy()(
            network in proptest::option::of(arb_network()),
            battery in proptest::option::of(arb_battery()),
            storage in proptest::option::of(any::<bool>()),
            persisted in proptest::option::of(any::<bool>()),
            params in proptest::option::of(arb_params()),
        ) -> JobPolicy {
            JobPolicy {
                job_id: Some(JOB_ID),
                network_type: network,
                battery_type: battery,
                require_device_idle: None,
                require_storage_not_low: storage,
                is_persisted: persisted,
                params,
            }
        }
    }

    proptest! {
        #[test]
        fn merge_with_itself_is_identity(policy in arb_policy()) {
            let merged = merge_two_policies(Some(policy.clone()), Some(policy.clone()))
                .unwrap()
                .unwrap();
            prop_assert_eq!(merged, policy);
        }

        #[test]
        fn overlay_fields_always_win(base in arb_policy(), overlay in arb_policy()) {
            let merged = merge_two_policies(Some(base.clone()), Some(overlay.clone()))
                .unwrap()
                .unwrap();
            if overlay.network_type.is_some() {
                prop_assert_eq!(merged.network_type, overlay.network_type);
            } else {
                prop_assert_eq!(merged.network_type, base.network_type);
            }
            if overlay.battery_type.is_some() {
                prop_assert_eq!(merged.battery_type, overlay.battery_type);
            } else {
                prop_assert_eq!(merged.battery_type, base.battery_type);
            }
        }
    }
}
