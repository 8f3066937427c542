//! Sample command implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tally_policy::DocumentFormat;
use tally_sampling::{
    compute_period_info, stagger_group, Clock, PerDeviceSampler, SamplingConfig,
    SelectionIdSource,
};
use tracing::info;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct GivenSelectionId(i64);

impl SelectionIdSource for GivenSelectionId {
    async fn selection_id(&self) -> tally_sampling::Result<i64> {
        Ok(self.0)
    }
}

/// Runs the sample command.
pub async fn run(config_path: &str, selection_id: i64, at: Option<&str>) -> Result<()> {
    info!("Evaluating sampling config: {}", config_path);

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {config_path}"))?;
    let config = match DocumentFormat::from_path(Path::new(config_path)) {
        DocumentFormat::Json => SamplingConfig::from_json(&content),
        DocumentFormat::Yaml => SamplingConfig::from_yaml(&content),
    }
    .with_context(|| "Failed to load sampling config")?;

    let at = match at {
        Some(text) => DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid timestamp: {text}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let period = compute_period_info(
        at,
        selection_id,
        config.staggering_period(),
        config.rotation_period(),
    )
    .with_context(|| "Failed to compute rotation period")?;
    let group = stagger_group(
        selection_id,
        config.staggering_period(),
        config.rotation_period(),
    )?;

    let sampler = PerDeviceSampler::new(
        config.group_name(),
        Some(config.clone()),
        FixedClock(at),
        GivenSelectionId(selection_id),
    );
    let selected = sampler
        .should_log()
        .await
        .with_context(|| "Failed to compute cohort decision")?;

    println!("at:             {}", at.to_rfc3339());
    println!("stagger group:  {group}");
    println!("period number:  {}", period.period_number);
    println!("valid until:    {}", period.stagger_period_end_time.to_rfc3339());
    println!("sampling rate:  {}", config.sampling_rate());
    println!("selected:       {selected}");

    Ok(())
}
