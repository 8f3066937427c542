//! Policy document parsing.
//!
//! Policies are plain serde documents in YAML or JSON:
//!
//! ```yaml
//! job_id: 7
//! network_type: unmetered
//! battery_type: require_not_low
//! params:
//!   periodic:
//!     periodic_interval_ms: 3600000
//!     flex_interval_ms: 600000
//! ```

use crate::error::Result;
use crate::model::{JobPolicy, ModuleJobPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Encoding of a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// YAML (also accepts plain JSON).
    #[default]
    Yaml,
    /// JSON.
    Json,
}

impl DocumentFormat {
    /// Picks the format from a file extension. Anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Parses any document type in the given format.
///
/// # Errors
///
/// Returns [`crate::Error::Yaml`] or [`crate::Error::Json`] for malformed
/// documents.
pub fn parse<T: DeserializeOwned>(input: &str, format: DocumentFormat) -> Result<T> {
    match format {
        DocumentFormat::Yaml => Ok(serde_yaml::from_str(input)?),
        DocumentFormat::Json => Ok(serde_json::from_str(input)?),
    }
}

/// Serializes any document type in the given format.
///
/// # Errors
///
/// Returns an encoding error if the value cannot be represented.
pub fn serialize<T: Serialize>(value: &T, format: DocumentFormat) -> Result<String> {
    match format {
        DocumentFormat::Yaml => Ok(serde_yaml::to_string(value)?),
        DocumentFormat::Json => Ok(serde_json::to_string_pretty(value)?),
    }
}

/// Parses a single job policy.
///
/// # Errors
///
/// Returns an error for malformed documents or unknown fields.
///
/// # Example
///
/// ```rust
/// use tally_policy::{parse_job_policy, DocumentFormat, NetworkType};
///
/// let policy = parse_job_policy("job_id: 7\nnetwork_type: cellular\n", DocumentFormat::Yaml).unwrap();
/// assert_eq!(policy.network_type, Some(NetworkType::Cellular));
/// ```
pub fn parse_job_policy(input: &str, format: DocumentFormat) -> Result<JobPolicy> {
    parse(input, format)
}

/// Parses a module bundle of job policies.
///
/// # Errors
///
/// Returns an error for malformed documents or unknown fields.
pub fn parse_module_job_policy(input: &str, format: DocumentFormat) -> Result<ModuleJobPolicy> {
    parse(input, format)
}
