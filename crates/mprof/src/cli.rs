//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Record and inspect memory usage of a command over time
#[derive(Parser, Debug)]
#[command(name = "mprof")]
#[command(version)]
pub struct Cli {
    /// Log debug detail to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command and record its memory usage
    Run {
        /// Seconds between samples
        #[arg(short, long, default_value_t = 0.1)]
        interval: f64,

        /// Profile file to append to (default: mprofile_<timestamp>.dat)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample the command only, not the processes it spawns
        #[arg(long, default_value_t = false)]
        no_children: bool,

        /// Stop sampling and kill the command after this many seconds
        #[arg(short = 'T', long)]
        timeout: Option<f64>,

        /// Command to profile followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },

    /// Summarise one or more recorded profiles
    Plot {
        /// Profile files or indices (default: latest profile)
        #[arg(allow_negative_numbers = true)]
        profiles: Vec<String>,

        /// Plot title
        #[arg(short, long)]
        title: Option<String>,

        /// Write plot data here instead of displaying it
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory searched for profiles
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// List recorded profiles, oldest first
    List {
        /// Directory searched for profiles
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Delete every recorded profile
    Clean {
        /// Directory searched for profiles
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}
