//! Apply command implementation.

use super::read_document;
use anyhow::{Context, Result};
use tally_policy::{apply_policy_to_job_info, DocumentFormat, JobInfoBuilder, JobPolicy};
use tracing::info;

/// Runs the apply command.
pub fn run(policy_path: &str, job_id: i32, service: &str) -> Result<()> {
    info!("Applying policy {} to job {}", policy_path, job_id);

    let policy: JobPolicy = read_document(policy_path)?;
    if let Some(policy_job_id) = policy.job_id {
        if policy_job_id != job_id {
            anyhow::bail!("Policy targets job {policy_job_id}, not job {job_id}");
        }
    }

    let mut builder = JobInfoBuilder::new(job_id, service);
    let info = apply_policy_to_job_info(&mut builder, Some(&policy))
        .with_context(|| "Failed to apply policy")?;

    let output = tally_policy::parser::serialize(&info, DocumentFormat::Yaml)?;
    print!("{output}");
    println!("# fingerprint: {}", info.fingerprint()?);
    Ok(())
}
