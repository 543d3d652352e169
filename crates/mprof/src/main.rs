//! # mprof
//!
//! Records the memory usage of a command and the processes it spawns, and
//! summarises recorded profiles.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mprof::{ProfilingConfig, ProfilingRunner, ReportRenderer, locator, plot};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            interval,
            output,
            no_children,
            timeout,
            argv,
        } => {
            let mut config = ProfilingConfig::new(seconds(interval)?, output, argv)?
                .with_children(!no_children);
            if let Some(limit) = timeout {
                config = config.with_timeout(seconds(limit)?)?;
            }

            println!(
                "mprof: sampling memory every {interval}s into {}",
                config.output_path().display()
            );
            let summary = ProfilingRunner::new(config)
                .run()
                .context("recording session failed")?;
            println!("{summary}");
        }
        Commands::Plot {
            profiles,
            title,
            output,
            dir,
        } => {
            let mut renderer = ReportRenderer::stdout();
            let count = plot(
                &profiles,
                title.as_deref(),
                output.as_deref(),
                &dir,
                &mut renderer,
            )
            .context("cannot plot profiles")?;
            info!(count, "profiles plotted");
            if let Some(path) = output {
                println!("plotted {count} profile(s) to {}", path.display());
            }
        }
        Commands::List { dir } => list(&dir)?,
        Commands::Clean { dir } => {
            let removed = locator::clean_profiles(&dir)?;
            println!("removed {removed} profile(s)");
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value <= 0.0 {
        bail!("expected a positive number of seconds, got {value}");
    }
    Duration::try_from_secs_f64(value).context("duration out of range")
}

fn list(dir: &Path) -> Result<()> {
    let profiles = locator::list_profiles(dir)?;
    if profiles.is_empty() {
        bail!("no profiles in {}", dir.display());
    }
    for (index, path) in profiles.iter().enumerate() {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        println!("{index} {name}");
    }
    Ok(())
}
