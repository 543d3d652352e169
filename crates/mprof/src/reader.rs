#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Replays a profile log into per-process time series

use crate::error::{ProfilingError, Result};
use crate::format::{Identity, LogRecord, Sample};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Samples for one identity in file order
pub type Series = Vec<Sample>;

/// Everything recorded in one profile file
///
/// When a file holds several concatenated sessions, the last `CMDLINE`
/// wins and series from all sessions are merged under the same keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    source: PathBuf,
    command: Option<String>,
    sessions: usize,
    series: BTreeMap<Identity, Series>,
}

impl Profile {
    /// Empty profile attributed to `source`
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Apply one decoded record
    pub fn apply(&mut self, record: LogRecord) {
        match record {
            LogRecord::Command(text) => {
                self.command = Some(text);
                self.sessions = self.sessions.saturating_add(1);
            }
            LogRecord::MainSample(sample) => {
                self.series.entry(Identity::Main).or_default().push(sample);
            }
            LogRecord::ChildSample(index, sample) => {
                self.series
                    .entry(Identity::Child(index))
                    .or_default()
                    .push(sample);
            }
        }
    }

    /// File the profile was read from
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Last recorded command line, if any
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Number of `CMDLINE` records seen
    #[must_use]
    pub const fn sessions(&self) -> usize {
        self.sessions
    }

    /// All series, `Main` first then children by index
    #[must_use]
    pub const fn series(&self) -> &BTreeMap<Identity, Series> {
        &self.series
    }

    /// Series for one identity
    #[must_use]
    pub fn get(&self, identity: Identity) -> Option<&Series> {
        self.series.get(&identity)
    }
}

/// Read and replay a profile file
///
/// # Errors
///
/// Returns `NoInputFound` if the file does not exist, or an IO error if it
/// cannot be read. Malformed lines are never an error.
pub fn read_profile(path: &Path) -> Result<Profile> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ProfilingError::NoInputFound(path.display().to_string())
        } else {
            ProfilingError::IoError(format!("{}: {e}", path.display()))
        }
    })?;
    parse_profile(BufReader::new(file), path)
}

/// Replay log lines from any buffered reader
///
/// Lines that match no grammar are dropped. A final line without a
/// terminating newline is treated as the tail of an interrupted write and
/// dropped too.
///
/// # Errors
///
/// Returns error only if the underlying reader fails
pub fn parse_profile<R: BufRead>(mut reader: R, source: &Path) -> Result<Profile> {
    let mut profile = Profile::new(source);
    let mut buf = Vec::new();
    let mut line_no = 0_u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no = line_no.saturating_add(1);

        let Some(body) = buf.strip_suffix(b"\n") else {
            debug!(line = line_no, "dropping truncated final line");
            break;
        };
        let body = body.strip_suffix(b"\r").unwrap_or(body);
        let text = String::from_utf8_lossy(body);

        match LogRecord::decode(&text) {
            Some(record) => profile.apply(record),
            None => trace!(line = line_no, "discarding unrecognised line"),
        }
    }

    Ok(profile)
}
