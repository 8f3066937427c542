//! Subcommand implementations.

pub mod apply;
pub mod explain;
pub mod merge;
pub mod plan;
pub mod sample;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tally_policy::DocumentFormat;

/// Reads a YAML or JSON document, picking the format from the extension.
pub fn read_document<T: DeserializeOwned>(path: &str) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;
    let format = DocumentFormat::from_path(Path::new(path));
    tally_policy::parser::parse(&content, format)
        .with_context(|| format!("Failed to parse document: {path}"))
}

/// Parses an output format flag.
pub fn output_format(format: &str) -> Result<DocumentFormat> {
    match format.to_lowercase().as_str() {
        "json" => Ok(DocumentFormat::Json),
        "yaml" | "yml" => Ok(DocumentFormat::Yaml),
        _ => anyhow::bail!("Unknown output format: {format}. Use 'yaml' or 'json'."),
    }
}
