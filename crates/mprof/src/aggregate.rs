#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Time normalisation and peak detection for plotting

use crate::error::{ProfilingError, Result};
use crate::format::{Identity, Sample};
use crate::reader::{Profile, Series};
use serde::Serialize;
use std::collections::BTreeMap;

/// Highest sample across all series of a profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Peak {
    pub identity: Identity,
    /// Seconds since the first main sample
    pub timestamp: f64,
    pub value: f64,
}

/// Renderer input for one profile
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    pub label: String,
    /// Absolute timestamp every series was shifted by
    pub origin: f64,
    pub series: BTreeMap<Identity, Series>,
    pub peak: Peak,
}

impl PlotData {
    /// Elapsed seconds between the first and last normalised sample
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.series
            .values()
            .flat_map(|series| series.iter().map(|s| s.timestamp))
            .fold(0.0, f64::max)
    }
}

/// Shift every series so the first main sample sits at zero and find the peak
///
/// Series are scanned `Main` first, then children by index, and samples in
/// file order; on equal values the first one seen is the peak.
///
/// # Errors
///
/// Returns `EmptyMainSeries` if the profile has no main samples
pub fn aggregate(profile: &Profile) -> Result<PlotData> {
    let origin = profile
        .get(Identity::Main)
        .and_then(|main| main.first())
        .map(|first| first.timestamp)
        .ok_or_else(|| ProfilingError::EmptyMainSeries(profile.source().to_path_buf()))?;

    let series: BTreeMap<Identity, Series> = profile
        .series()
        .iter()
        .map(|(&identity, samples)| {
            let shifted = samples
                .iter()
                .map(|s| Sample::new(s.value, s.timestamp - origin))
                .collect();
            (identity, shifted)
        })
        .collect();

    let peak = series
        .iter()
        .flat_map(|(&identity, samples)| samples.iter().map(move |s| (identity, *s)))
        .fold(None::<Peak>, |best, (identity, s)| match best {
            Some(best) if best.value >= s.value => Some(best),
            _ => Some(Peak {
                identity,
                timestamp: s.timestamp,
                value: s.value,
            }),
        })
        .ok_or_else(|| ProfilingError::EmptyMainSeries(profile.source().to_path_buf()))?;

    let label = profile.command().map_or_else(
        || profile.source().display().to_string(),
        ToString::to_string,
    );

    Ok(PlotData {
        label,
        origin,
        series,
        peak,
    })
}
