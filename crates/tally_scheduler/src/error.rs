//! Error types for scheduling resolution.

use thiserror::Error;

/// Errors surfaced by scheduler sinks and the resolver.
#[derive(Debug, Error)]
pub enum Error {
    /// The platform scheduler could not be reached or refused the call.
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),

    /// The job's policy could not be merged or applied.
    #[error(transparent)]
    Policy(#[from] tally_policy::Error),
}

/// Result type alias for scheduling operations.
pub type Result<T> = std::result::Result<T, Error>;
