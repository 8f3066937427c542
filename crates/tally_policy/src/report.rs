//! Policy report generation.
//!
//! Explains what a (merged) job policy will do to a job, for humans reviewing
//! a server push.

use crate::model::{BatteryType, JobParams, JobPolicy, NetworkType};
use std::fmt::Write;

/// Generates a Markdown explanation of a policy.
///
/// The report includes:
/// - Constraint overrides
/// - Timing parameters
/// - The fields left to the job's defaults
#[must_use]
pub fn describe_policy(policy: &JobPolicy) -> String {
    let mut report = String::new();

    match policy.job_id {
        Some(job_id) => {
            let _ = writeln!(report, "# Job Policy: job {job_id}\n");
        }
        None => report.push_str("# Job Policy: unassigned job\n\n"),
    }

    report.push_str("## Constraints\n\n");
    let mut inherited = Vec::new();
    push_field(
        &mut report,
        &mut inherited,
        "Network",
        policy.network_type.map(describe_network),
    );
    push_field(
        &mut report,
        &mut inherited,
        "Battery",
        policy.battery_type.map(describe_battery),
    );
    push_field(
        &mut report,
        &mut inherited,
        "Device idle",
        policy.require_device_idle.map(describe_flag),
    );
    push_field(
        &mut report,
        &mut inherited,
        "Storage not low",
        policy.require_storage_not_low.map(describe_flag),
    );
    push_field(
        &mut report,
        &mut inherited,
        "Persisted",
        policy.is_persisted.map(describe_flag),
    );
    report.push('\n');

    report.push_str("## Timing\n\n");
    match &policy.params {
        Some(JobParams::Periodic(params)) => {
            report.push_str("- **Kind**: periodic\n");
            if let Some(interval) = params.periodic_interval_ms {
                let _ = writeln!(report, "- **Interval**: {}", format_millis(interval));
            }
            if let Some(flex) = params.flex_interval_ms {
                let _ = writeln!(report, "- **Flex**: {}", format_millis(flex));
            }
        }
        Some(JobParams::OneOff(params)) => {
            report.push_str("- **Kind**: one-off\n");
            if let Some(latency) = params.minimum_latency_ms {
                let _ = writeln!(report, "- **Minimum latency**: {}", format_millis(latency));
            }
            if let Some(deadline) = params.override_deadline_ms {
                let _ = writeln!(report, "- **Deadline**: {}", format_millis(deadline));
            }
        }
        Some(JobParams::TriggerContent(params)) => {
            report.push_str("- **Kind**: content trigger\n");
            for uri in &params.trigger_content_uris {
                let _ = writeln!(report, "- **Observes**: `{uri}` (and descendants)");
            }
            if let Some(delay) = params.trigger_content_update_delay_ms {
                let _ = writeln!(report, "- **Update delay**: {}", format_millis(delay));
            }
            if let Some(delay) = params.trigger_content_max_delay_ms {
                let _ = writeln!(report, "- **Max delay**: {}", format_millis(delay));
            }
        }
        None => report.push_str("Timing is left to the job's defaults.\n"),
    }
    report.push('\n');

    report.push_str("## Summary\n\n");
    if inherited.is_empty() {
        report.push_str("**Every constraint is overridden.**\n");
    } else {
        let _ = writeln!(report, "**Kept from job defaults**: {}", inherited.join(", "));
    }

    report
}

fn push_field(
    report: &mut String,
    inherited: &mut Vec<&'static str>,
    label: &'static str,
    value: Option<String>,
) {
    match value {
        Some(value) => {
            let _ = writeln!(report, "- **{label}**: {value}");
        }
        None => inherited.push(label),
    }
}

fn describe_network(network: NetworkType) -> String {
    match network {
        NetworkType::Unrecognized(code) => format!("unrecognized code {code} (will be rejected)"),
        known => known.to_string(),
    }
}

fn describe_battery(battery: BatteryType) -> String {
    match battery {
        BatteryType::RequireNone => "no requirement".to_string(),
        BatteryType::RequireCharging => "charging".to_string(),
        BatteryType::RequireNotLow => "not low".to_string(),
    }
}

fn describe_flag(flag: bool) -> String {
    let text = if flag { "required" } else { "not required" };
    text.to_string()
}

fn format_millis(millis: u64) -> String {
    const SECOND: u64 = 1_000;
    const MINUTE: u64 = 60 * SECOND;
    const HOUR: u64 = 60 * MINUTE;

    if millis >= HOUR && millis % HOUR == 0 {
        format!("{}h", millis / HOUR)
    } else if millis >= MINUTE && millis % MINUTE == 0 {
        format!("{}m", millis / MINUTE)
    } else if millis >= SECOND && millis % SECOND == 0 {
        format!("{}s", millis / SECOND)
    } else {
        format!("{millis}ms")
    }
}
