//! Error types for job policy merging and application.

use thiserror::Error;

/// Errors that can occur while merging, validating or applying job policies.
#[derive(Debug, Error)]
pub enum Error {
    /// Policy content violates a merge or validity rule.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Network type code outside the set the scheduler understands.
    #[error("unrecognized network type: {code}")]
    UnrecognizedNetworkType {
        /// The raw code carried by the policy.
        code: i32,
    },

    /// YAML document error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON document error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true for errors caused by invalid policy content.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::UnrecognizedNetworkType { .. }
        )
    }
}

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, Error>;
