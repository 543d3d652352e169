#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Buffered, append-only profile log

use crate::error::{ProfilingError, Result};
use crate::format::LogRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::trace;

/// Sample lines between forced syncs to durable storage
pub const FLUSH_EVERY: u64 = 50;

/// A byte sink that can be forced to durable storage
pub trait Durable: Write {
    /// Push written bytes past the OS cache
    ///
    /// # Errors
    ///
    /// Returns error if the underlying sync fails
    fn sync(&mut self) -> std::io::Result<()>;
}

impl Durable for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }
}

impl Durable for Vec<u8> {
    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Appends encoded records, syncing every [`FLUSH_EVERY`] sample lines
///
/// The `CMDLINE` header does not count toward the cadence.
pub struct LogWriter<W: Durable> {
    out: BufWriter<W>,
    sample_lines: u64,
}

impl LogWriter<File> {
    /// Open `path` for appending, creating it if missing
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProfilingError::LogWriteFailed(format!("{}: {e}", path.display())))?;
        Ok(Self::new(file))
    }
}

impl<W: Durable> LogWriter<W> {
    #[must_use]
    pub fn new(inner: W) -> Self {
        Self {
            out: BufWriter::new(inner),
            sample_lines: 0,
        }
    }

    /// Append one record as a line
    ///
    /// # Errors
    ///
    /// Returns error if writing or syncing fails
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        writeln!(self.out, "{}", record.encode())
            .map_err(|e| ProfilingError::LogWriteFailed(e.to_string()))?;

        if record.identity().is_some() {
            self.sample_lines = self.sample_lines.saturating_add(1);
            if self.sample_lines % FLUSH_EVERY == 0 {
                trace!(lines = self.sample_lines, "syncing profile log");
                self.sync()?;
            }
        }
        Ok(())
    }

    /// Number of sample lines appended so far
    #[must_use]
    pub const fn sample_lines(&self) -> u64 {
        self.sample_lines
    }

    /// Flush buffered lines and sync them to storage
    ///
    /// # Errors
    ///
    /// Returns error if flushing or syncing fails
    pub fn sync(&mut self) -> Result<()> {
        self.out
            .flush()
            .and_then(|()| self.out.get_mut().sync())
            .map_err(|e| ProfilingError::LogWriteFailed(e.to_string()))
    }

    /// Sync and hand back the underlying sink
    ///
    /// # Errors
    ///
    /// Returns error if the final flush fails
    pub fn finish(mut self) -> Result<W> {
        self.sync()?;
        self.out
            .into_inner()
            .map_err(|e| ProfilingError::LogWriteFailed(e.error().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Sample;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Sink that records how many lines had reached it at each sync
    #[derive(Default)]
    struct CountingSink {
        bytes: Vec<u8>,
        syncs: Rc<Cell<u32>>,
        lines_at_last_sync: Rc<Cell<usize>>,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Durable for CountingSink {
        fn sync(&mut self) -> std::io::Result<()> {
            self.syncs.set(self.syncs.get() + 1);
            self.lines_at_last_sync
                .set(self.bytes.iter().filter(|&&b| b == b'\n').count());
            Ok(())
        }
    }

    fn sample(i: u32) -> LogRecord {
        LogRecord::MainSample(Sample::new(f64::from(i), f64::from(i)))
    }

    #[test]
    fn test_sync_on_fiftieth_sample_line() {
        let sink = CountingSink::default();
        let syncs = Rc::clone(&sink.syncs);
        let lines_at_sync = Rc::clone(&sink.lines_at_last_sync);
        let mut writer = LogWriter::new(sink);

        assert!(writer.append(&LogRecord::Command("app".to_string())).is_ok());
        for i in 0..49 {
            assert!(writer.append(&sample(i)).is_ok());
        }
        assert_eq!(syncs.get(), 0);

        assert!(writer.append(&sample(49)).is_ok());
        assert_eq!(syncs.get(), 1);
        // header plus fifty samples were on the sink when it synced
        assert_eq!(lines_at_sync.get(), 51);

        assert!(writer.append(&LogRecord::ChildSample(0, Sample::new(1.0, 1.0))).is_ok());
        assert_eq!(syncs.get(), 1);

        for i in 0..49 {
            assert!(writer.append(&sample(i)).is_ok());
        }
        assert_eq!(syncs.get(), 2);
        assert_eq!(writer.sample_lines(), 100);
    }

    #[test]
    fn test_finish_flushes_remaining_lines() {
        let mut writer = LogWriter::new(Vec::new());
        assert!(writer.append(&LogRecord::Command("app --flag".to_string())).is_ok());
        assert!(writer.append(&sample(7)).is_ok());

        let text = writer
            .finish()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        assert_eq!(text, Ok("CMDLINE app --flag\nMEM 7 7\n".to_string()));
    }

    #[test]
    fn test_append_mode_keeps_earlier_sessions() {
        let dir = tempfile::TempDir::new().ok();
        if let Some(dir) = dir {
            let path = dir.path().join("mprofile_20230101000000.dat");
            for session in ["first", "second"] {
                let writer = LogWriter::append_to(&path);
                assert!(writer.is_ok());
                if let Ok(mut writer) = writer {
                    assert!(writer.append(&LogRecord::Command(session.to_string())).is_ok());
                    assert!(writer.finish().is_ok());
                }
            }
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            assert_eq!(text, "CMDLINE first\nCMDLINE second\n");
        }
    }
}
