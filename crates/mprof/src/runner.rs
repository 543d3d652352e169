#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Launches a command and records its memory profile

use crate::collector::{MemoryCollector, default_collector};
use crate::config::ProfilingConfig;
use crate::error::Result;
use crate::process::{ProfiledProcess, Tracked};
use crate::sampler::{Sampler, SessionStats, StopReason};
use crate::writer::LogWriter;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Owns one recording session end to end
pub struct ProfilingRunner {
    config: ProfilingConfig,
}

impl ProfilingRunner {
    /// Create a new profiling runner
    #[must_use]
    pub const fn new(config: ProfilingConfig) -> Self {
        Self { config }
    }

    /// Run the session with the platform collector
    ///
    /// # Errors
    ///
    /// See [`ProfilingRunner::run_with`]
    pub fn run(self) -> Result<RunSummary> {
        self.run_with(default_collector())
    }

    /// Run the session
    ///
    /// This will:
    /// 1. Spawn the command
    /// 2. Append a `CMDLINE` header to the output file
    /// 3. Sample the command and its descendants every `sampling_interval`
    /// 4. Stop when the command exits (or kill it when the timeout elapses)
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The command cannot be launched (`LaunchError`)
    /// - The output file cannot be opened or written
    /// - The process status cannot be checked
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use mprof::{ProfilingConfig, ProfilingRunner};
    /// let config = ProfilingConfig::with_defaults(vec!["./my-app".to_string()])?;
    /// let summary = ProfilingRunner::new(config).run()?;
    /// println!("{summary}");
    /// # Ok::<(), mprof::ProfilingError>(())
    /// ```
    pub fn run_with<C: MemoryCollector>(self, collector: C) -> Result<RunSummary> {
        let config = self.config;
        let mut process = ProfiledProcess::spawn(config.argv(), config.working_dir())?;

        let mut writer = match LogWriter::append_to(config.output_path()) {
            Ok(writer) => writer,
            Err(e) => {
                let _ = process.kill();
                return Err(e);
            }
        };

        let mut sampler = Sampler::new(collector, config.sampling_interval())
            .with_children(config.include_children())
            .with_timeout(config.timeout());

        let recorded = sampler.record(&mut process, config.argv(), &mut writer);
        let finished = writer.finish();

        // never leave the command running untracked, whatever went wrong
        if !matches!(process.has_exited(), Ok(true)) {
            if matches!(&recorded, Ok(stats) if stats.stop == StopReason::TimedOut) {
                warn!("timeout reached, terminating profiled command");
            }
            // the command may exit on its own between the check and the kill
            let _ = process.kill();
        }

        let stats = recorded?;
        finished?;

        let summary = RunSummary {
            output_path: config.output_path().to_path_buf(),
            interval: config.sampling_interval(),
            stats,
        };
        info!(path = %summary.output_path.display(), "profile written");
        Ok(summary)
    }
}

/// Launch `argv`, sample it every `interval`, and append to `output_path`
/// (or a fresh `mprofile_<timestamp>.dat`)
///
/// # Errors
///
/// Returns `LaunchError` if the command cannot be started, or a configuration
/// or IO error
pub fn run(argv: Vec<String>, interval: Duration, output_path: Option<PathBuf>) -> Result<RunSummary> {
    let config = ProfilingConfig::new(interval, output_path, argv)?;
    ProfilingRunner::new(config).run()
}

/// Outcome of a recording session
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    output_path: PathBuf,
    interval: Duration,
    stats: SessionStats,
}

impl RunSummary {
    /// File the session was written to
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sampled every {:.3}s for {} ticks (peak {:.2} MiB); profile written to {}",
            self.interval.as_secs_f64(),
            self.stats.ticks,
            self.stats.max_main_mib,
            self.output_path.display()
        )
    }
}
