//! Explain command implementation.

use super::read_document;
use anyhow::{Context, Result};
use std::fs;
use tally_policy::{describe_policy, enforce_validity, JobPolicy};
use tracing::{info, warn};

/// Runs the explain command.
pub fn run(policy_path: &str, output_path: Option<&str>) -> Result<()> {
    info!("Generating policy report for: {}", policy_path);

    let policy: JobPolicy = read_document(policy_path)?;
    if let Err(err) = enforce_validity(&policy) {
        warn!("Policy would be rejected: {err}");
    }

    let report = describe_policy(&policy);

    match output_path {
        Some(output_path) => {
            fs::write(output_path, &report)
                .with_context(|| format!("Failed to write output file: {output_path}"))?;
            info!("Policy report written to: {}", output_path);
        }
        None => print!("{report}"),
    }
    Ok(())
}
