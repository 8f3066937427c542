//! Merge command implementation.

use super::{output_format, read_document};
use anyhow::{Context, Result};
use tally_policy::{merge_two_policies, JobPolicy};
use tracing::info;

/// Runs the merge command.
pub fn run(default_path: &str, server_path: Option<&str>, format: &str) -> Result<()> {
    info!("Merging job policy: {}", default_path);
    let output_format = output_format(format)?;

    let default_policy: JobPolicy = read_document(default_path)?;
    let server_policy: Option<JobPolicy> = server_path.map(read_document).transpose()?;

    let merged = merge_two_policies(Some(default_policy), server_policy)
        .with_context(|| "Failed to merge policies")?;

    match merged {
        Some(policy) => {
            let output = tally_policy::parser::serialize(&policy, output_format)
                .with_context(|| "Failed to serialize merged policy")?;
            print!("{output}");
        }
        None => println!("no policy"),
    }
    Ok(())
}
