//! Error types for the upload pipeline.
//!
//! Only validation and persistence failures leave the pipeline. Device-side
//! failures are contained and reported through [`TaskOutcome`](crate::TaskOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can fail an upload request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A request field violates its constraints.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A media payload is not well-formed base64.
    #[error("invalid base64 data in {filename}: {source}")]
    InvalidBase64 {
        filename: String,
        #[source]
        source: base64::DecodeError,
    },

    /// The target instant is not in the future.
    #[error("task time {timestamp} has already passed (now {now}); only future tasks can be scheduled")]
    StaleInstant { timestamp: i64, now: i64 },

    /// Writing the staging area failed.
    #[error("failed to {operation} {}: {source}", path.display())]
    Persistence {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn persistence(
        operation: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Persistence {
            operation,
            path,
            source,
        }
    }

    /// Whether the request was rejected before any side effect.
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Persistence { .. })
    }
}
