//! Error types for device operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when talking to a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The control channel ran the command but reported failure.
    ///
    /// Carries the raw diagnostic text (stderr, falling back to stdout).
    #[error("channel command `{command}` failed: {diagnostic}")]
    Channel { command: String, diagnostic: String },

    /// The command did not finish within its bound.
    #[error("channel command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The control-channel binary could not be started.
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading the registry file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid registry contents.
    #[error("invalid device registry: {0}")]
    InvalidRegistry(String),
}

impl DeviceError {
    /// Whether this error is a timeout rather than a reported failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
