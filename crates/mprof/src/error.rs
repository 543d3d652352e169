#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Error types for the memory sampler and profile reader

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for profiling operations
pub type Result<T> = std::result::Result<T, ProfilingError>;

/// Errors that can occur while recording or analysing a memory profile
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfilingError {
    /// Target command could not be started
    #[error("failed to launch command: {0}")]
    LaunchError(String),

    /// Process vanished between being listed and being read
    #[error("process {0} not found")]
    NotFound(u32),

    /// Failed to parse a memory value reported by the OS
    #[error("failed to parse memory value: {0}")]
    MetricsParseError(String),

    /// Failed to append to the profile log
    #[error("failed to write profile log: {0}")]
    LogWriteFailed(String),

    /// No profile file matched the request
    #[error("no input file found: {0}")]
    NoInputFound(String),

    /// Profile has no main-process samples to anchor the time axis
    #[error("profile {} has no main-process samples", .0.display())]
    EmptyMainSeries(PathBuf),

    /// Rendering backend cannot produce the requested output
    #[error("renderer unavailable: {0}")]
    RenderUnavailable(String),

    /// Process status could not be determined
    #[error("profiled process error: {0}")]
    ProcessTerminated(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(String),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    SerializationError(String),
}

impl ProfilingError {
    /// Whether the sampler should skip the reading and keep polling
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for ProfilingError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ProfilingError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
