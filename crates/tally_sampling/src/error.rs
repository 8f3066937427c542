//! Error types for cohort selection and sampling.

use thiserror::Error;

/// Errors that can occur while computing or caching a sampling decision.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed sampling configuration or out-of-range input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device identifier could not be resolved (including timeouts).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Failed to hash the selection input.
    #[error("hash error: {0}")]
    Hash(#[from] std::io::Error),

    /// YAML configuration error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON configuration error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if the error was caused by an invalid input.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result type alias for sampling operations.
pub type Result<T> = std::result::Result<T, Error>;
