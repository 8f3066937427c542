//! Plan command implementation.

use super::read_document;
use anyhow::Result;
use tally_policy::JobInfo;
use tally_scheduler::decide;
use tracing::info;

/// Runs the plan command.
pub fn run(computed_path: &str, existing_path: Option<&str>, force: bool) -> Result<()> {
    info!("Planning job: {}", computed_path);

    let computed: JobInfo = read_document(computed_path)?;
    let existing: Option<JobInfo> = existing_path.map(read_document).transpose()?;

    if let Some(existing) = &existing {
        if existing.job_id != computed.job_id {
            anyhow::bail!(
                "Pending job {} does not match computed job {}",
                existing.job_id,
                computed.job_id
            );
        }
    }

    let decision = decide(&computed, existing.as_ref(), force);
    println!("job {}: {decision}", computed.job_id);
    println!("computed fingerprint: {}", computed.fingerprint()?);
    if let Some(existing) = &existing {
        println!("pending fingerprint:  {}", existing.fingerprint()?);
    }
    Ok(())
}
