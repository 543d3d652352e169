#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Plot delivery: profile discovery, aggregation and rendering

use crate::aggregate::{Peak, PlotData, aggregate};
use crate::error::{ProfilingError, Result};
use crate::format::Sample;
use crate::locator::resolve_inputs;
use crate::reader::read_profile;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

const DEFAULT_TITLE: &str = "memory usage";

/// Draws aggregated profiles
pub trait Renderer {
    /// Persist to `output` when given, otherwise display
    ///
    /// # Errors
    ///
    /// Returns `RenderUnavailable` when the backend cannot produce the output
    fn render(&mut self, plots: &[PlotData], title: &str, output: Option<&Path>) -> Result<()>;
}

/// Text report on a terminal, JSON document on disk
pub struct ReportRenderer<W: Write> {
    terminal: W,
}

impl ReportRenderer<std::io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ReportRenderer<W> {
    #[must_use]
    pub const fn new(terminal: W) -> Self {
        Self { terminal }
    }

    /// Hand back the terminal sink
    pub fn into_inner(self) -> W {
        self.terminal
    }

    fn write_report(&mut self, plots: &[PlotData], title: &str) -> std::io::Result<()> {
        let out = &mut self.terminal;
        writeln!(out, "{title}")?;
        for plot in plots {
            writeln!(out, "  {}", plot.label)?;
            for (identity, samples) in &plot.series {
                let max = samples.iter().map(|s| s.value).fold(0.0, f64::max);
                let span = samples.last().map_or(0.0, |s| s.timestamp);
                writeln!(
                    out,
                    "    {:<10} {:>6} samples  {:>9.2}s  max {:>10.2} MiB",
                    identity.to_string(),
                    samples.len(),
                    span,
                    max
                )?;
            }
            writeln!(
                out,
                "    peak {:.2} MiB at {:.2}s ({})",
                plot.peak.value, plot.peak.timestamp, plot.peak.identity
            )?;
        }
        out.flush()
    }
}

#[derive(Serialize)]
struct Document<'a> {
    title: &'a str,
    profiles: Vec<ProfileDocument<'a>>,
}

#[derive(Serialize)]
struct ProfileDocument<'a> {
    label: &'a str,
    origin: f64,
    duration: f64,
    peak: &'a Peak,
    series: Vec<SeriesDocument<'a>>,
}

#[derive(Serialize)]
struct SeriesDocument<'a> {
    identity: String,
    samples: &'a [Sample],
}

fn document<'a>(plots: &'a [PlotData], title: &'a str) -> Document<'a> {
    Document {
        title,
        profiles: plots
            .iter()
            .map(|plot| ProfileDocument {
                label: &plot.label,
                origin: plot.origin,
                duration: plot.duration(),
                peak: &plot.peak,
                series: plot
                    .series
                    .iter()
                    .map(|(identity, samples)| SeriesDocument {
                        identity: identity.to_string(),
                        samples,
                    })
                    .collect(),
            })
            .collect(),
    }
}

impl<W: Write> Renderer for ReportRenderer<W> {
    fn render(&mut self, plots: &[PlotData], title: &str, output: Option<&Path>) -> Result<()> {
        let Some(path) = output else {
            return self
                .write_report(plots, title)
                .map_err(|e| ProfilingError::RenderUnavailable(format!("terminal: {e}")));
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(ProfilingError::RenderUnavailable(format!(
                "no backend for {} (supported: .json)",
                path.display()
            )));
        }

        let file = File::create(path)
            .map_err(|e| ProfilingError::RenderUnavailable(format!("{}: {e}", path.display())))?;
        let mut out = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut out, &document(plots, title))?;
        out.flush()?;
        info!(path = %path.display(), "plot data written");
        Ok(())
    }
}

/// Read, aggregate and render profiles
///
/// `inputs` are file paths or profile indices; when empty the latest
/// profile in `search_dir` is used. The title defaults to the recorded
/// command of a single profile.
///
/// # Errors
///
/// Returns `NoInputFound`, `EmptyMainSeries` or `RenderUnavailable`
pub fn plot<R: Renderer>(
    inputs: &[String],
    title: Option<&str>,
    output: Option<&Path>,
    search_dir: &Path,
    renderer: &mut R,
) -> Result<usize> {
    let plots = resolve_inputs(inputs, search_dir)?
        .iter()
        .map(|path| read_profile(path).and_then(|profile| aggregate(&profile)))
        .collect::<Result<Vec<_>>>()?;

    let title = match (title, plots.as_slice()) {
        (Some(title), _) => title,
        (None, [only]) => only.label.as_str(),
        (None, _) => DEFAULT_TITLE,
    };

    renderer.render(&plots, title, output)?;
    Ok(plots.len())
}
