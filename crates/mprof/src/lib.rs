#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Memory-over-time profiling for a command and the processes it spawns
//!
//! A recording session launches a command, samples the resident memory of
//! the command and each of its descendants on a fixed interval, and appends
//! the readings to a line-oriented log. Logs are replayed into per-process
//! series, normalised against the first main-process sample, and handed to
//! a [`Renderer`] together with the peak reading.

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod error;
pub mod format;
pub mod locator;
pub mod process;
pub mod reader;
pub mod render;
pub mod runner;
pub mod sampler;
pub mod writer;

pub use aggregate::{Peak, PlotData, aggregate};
pub use collector::{
    ChildReadings, MemoryCollector, ProcCollector, SysinfoCollector, default_collector,
};
pub use config::ProfilingConfig;
pub use error::{ProfilingError, Result};
pub use format::{Identity, LogRecord, Sample};
pub use reader::{Profile, read_profile};
pub use render::{Renderer, ReportRenderer, plot};
pub use runner::{ProfilingRunner, RunSummary, run};
