#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Configuration for a recording session

use crate::error::{ProfilingError, Result};
use crate::locator::profile_filename;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time between samples
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for one recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    /// Interval between memory readings
    sampling_interval: Duration,

    /// Log file the session appends to
    output_path: PathBuf,

    /// Command to profile, program first
    argv: Vec<String>,

    /// Working directory for the command
    working_dir: Option<PathBuf>,

    /// Whether descendants are sampled too
    include_children: bool,

    /// Stop sampling and kill the target after this long
    timeout: Option<Duration>,
}

impl ProfilingConfig {
    /// Create a new session configuration with validation
    ///
    /// # Arguments
    ///
    /// * `sampling_interval` - How often to sample (must be non-zero)
    /// * `output_path` - Log file to append to; `None` picks a
    ///   `mprofile_<timestamp>.dat` name in the current directory
    /// * `argv` - The command to profile, program first
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The command is empty
    /// - Sampling interval is zero
    /// - Output path is empty
    ///
    /// # Examples
    ///
    /// ```
    /// # use mprof::ProfilingConfig;
    /// # use std::time::Duration;
    /// let config = ProfilingConfig::new(
    ///     Duration::from_millis(100),
    ///     None,
    ///     vec!["python".to_string(), "job.py".to_string()],
    /// );
    /// assert!(config.is_ok());
    /// ```
    pub fn new(
        sampling_interval: Duration,
        output_path: Option<PathBuf>,
        argv: Vec<String>,
    ) -> Result<Self> {
        let output_path =
            output_path.unwrap_or_else(|| PathBuf::from(profile_filename(Utc::now())));

        Self::validate_argv(&argv)?;
        Self::validate_sampling_interval(sampling_interval)?;
        Self::validate_output_path(&output_path)?;

        Ok(Self {
            sampling_interval,
            output_path,
            argv,
            working_dir: None,
            include_children: true,
            timeout: None,
        })
    }

    /// Configuration with the default 0.1s interval and a generated file name
    ///
    /// # Errors
    ///
    /// Returns error if configuration validation fails
    pub fn with_defaults(argv: Vec<String>) -> Result<Self> {
        Self::new(DEFAULT_INTERVAL, None, argv)
    }

    /// Set the working directory for the profiled command
    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Choose whether descendants are sampled
    #[must_use]
    pub const fn with_children(mut self, include: bool) -> Self {
        self.include_children = include;
        self
    }

    /// Bound the session length
    ///
    /// # Errors
    ///
    /// Returns error if the timeout is zero
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ProfilingError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Get the sampling interval
    #[must_use]
    pub const fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Get the output path
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Get the command, program first
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Get the working directory (if set)
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    #[must_use]
    pub const fn include_children(&self) -> bool {
        self.include_children
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn validate_argv(argv: &[String]) -> Result<()> {
        match argv.first() {
            Some(program) if !program.is_empty() => Ok(()),
            _ => Err(ProfilingError::InvalidConfig(
                "a command to profile is required".to_string(),
            )),
        }
    }

    fn validate_sampling_interval(interval: Duration) -> Result<()> {
        if interval.is_zero() {
            Err(ProfilingError::InvalidConfig(
                "sampling interval must be greater than 0".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn validate_output_path(path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            Err(ProfilingError::InvalidConfig(
                "output path cannot be empty".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}
