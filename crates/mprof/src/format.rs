#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Line grammar shared by the profile writer and reader
//!
//! One record per line, fields separated by spaces:
//!
//! ```text
//! CMDLINE <text>
//! MEM <value> <timestamp>
//! CHLD<N> <value> <timestamp>
//! ```
//!
//! Values are MiB, timestamps are seconds since the Unix epoch. Both are
//! unsigned decimal text, optionally in scientific notation.

use serde::{Deserialize, Serialize};
use std::fmt;

const COMMAND_TAG: &str = "CMDLINE";
const MAIN_TAG: &str = "MEM";
const CHILD_TAG: &str = "CHLD";

/// A single memory reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Resident memory in MiB
    pub value: f64,

    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl Sample {
    #[must_use]
    pub const fn new(value: f64, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// Which process a series belongs to
///
/// `Child` carries the position of the process in one tick's enumeration,
/// not a stable process id; the same index may name different processes
/// across ticks. Ordering is `Main` first, then children by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    Main,
    Child(usize),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Child(index) => write!(f, "child {index}"),
        }
    }
}

/// Wire form of one log line
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Command(String),
    MainSample(Sample),
    ChildSample(usize, Sample),
}

impl LogRecord {
    /// Series key for sample records, `None` for the command header
    #[must_use]
    pub const fn identity(&self) -> Option<Identity> {
        match self {
            Self::Command(_) => None,
            Self::MainSample(_) => Some(Identity::Main),
            Self::ChildSample(index, _) => Some(Identity::Child(*index)),
        }
    }

    /// Render the record as a single line without the trailing newline
    ///
    /// Line breaks inside a command are folded to spaces so the record
    /// stays on one line.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Command(text) => {
                let folded: String = text
                    .chars()
                    .map(|c| if matches!(c, '\n' | '\r') { ' ' } else { c })
                    .collect();
                format!("{COMMAND_TAG} {folded}")
            }
            Self::MainSample(s) => format!("{MAIN_TAG} {} {}", s.value, s.timestamp),
            Self::ChildSample(index, s) => {
                format!("{CHILD_TAG}{index} {} {}", s.value, s.timestamp)
            }
        }
    }

    /// Classify a line, or `None` when it matches no grammar
    ///
    /// Matchers are tried child first, then main, then command.
    #[must_use]
    pub fn decode(line: &str) -> Option<Self> {
        MATCHERS.iter().find_map(|matcher| matcher(line))
    }
}

type Matcher = fn(&str) -> Option<LogRecord>;

const MATCHERS: [Matcher; 3] = [match_child, match_main, match_command];

fn match_child(line: &str) -> Option<LogRecord> {
    let mut fields = line.split_whitespace();
    let index = fields
        .next()?
        .strip_prefix(CHILD_TAG)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))?
        .parse::<usize>()
        .ok()?;
    let sample = sample_fields(fields)?;
    Some(LogRecord::ChildSample(index, sample))
}

fn match_main(line: &str) -> Option<LogRecord> {
    let mut fields = line.split_whitespace();
    if fields.next()? != MAIN_TAG {
        return None;
    }
    sample_fields(fields).map(LogRecord::MainSample)
}

fn match_command(line: &str) -> Option<LogRecord> {
    line.strip_prefix(COMMAND_TAG)?
        .strip_prefix(' ')
        .map(|text| LogRecord::Command(text.to_string()))
}

/// Exactly two trailing numeric fields: value then timestamp
fn sample_fields<'a>(mut fields: impl Iterator<Item = &'a str>) -> Option<Sample> {
    let value = parse_number(fields.next()?)?;
    let timestamp = parse_number(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }
    Some(Sample::new(value, timestamp))
}

/// Unsigned decimal with optional fraction and exponent
///
/// Signs are only allowed inside the exponent, so negative values, `inf`
/// and `nan` never parse.
fn parse_number(text: &str) -> Option<f64> {
    let first = text.bytes().next()?;
    if !(first.is_ascii_digit() || first == b'.') {
        return None;
    }
    if !text
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rebuild a shell-like command line from argv
///
/// Tokens containing whitespace are wrapped in single quotes; the rest are
/// left bare. Tokens are joined by single spaces.
#[must_use]
pub fn quote_command<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|token| {
            let token = token.as_ref();
            if token.chars().any(char::is_whitespace) {
                format!("'{token}'")
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
