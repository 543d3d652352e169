#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Fixed-interval polling loop for one recording session

use crate::collector::MemoryCollector;
use crate::error::Result;
use crate::format::{LogRecord, Sample, quote_command};
use crate::process::Tracked;
use crate::writer::{Durable, LogWriter};
use chrono::Utc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sample timestamps for one session
///
/// The wall clock is read once; every later stamp adds monotonic elapsed
/// time to it, so stamps never go backwards if the system clock is stepped.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_start: f64,
    started: Instant,
}

impl SessionClock {
    /// Anchor at the current wall-clock time
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn start() -> Self {
        Self::anchored(
            Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            Instant::now(),
        )
    }

    /// Anchor `started` at `wall_start` seconds since the Unix epoch
    #[must_use]
    pub const fn anchored(wall_start: f64, started: Instant) -> Self {
        Self {
            wall_start,
            started,
        }
    }

    /// Time since the anchor
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Seconds since the Unix epoch for a point `elapsed` after the anchor
    #[must_use]
    pub fn stamp(&self, elapsed: Duration) -> f64 {
        self.wall_start + elapsed.as_secs_f64()
    }

    /// Seconds since the Unix epoch, now
    #[must_use]
    pub fn now(&self) -> f64 {
        self.stamp(self.elapsed())
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The target process exited
    Exited,
    /// The configured timeout elapsed while the target was still running
    TimedOut,
}

/// Counters from one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    /// Loop iterations that took measurements
    pub ticks: u64,
    pub main_samples: u64,
    pub child_samples: u64,
    /// Readings lost because the target or a descendant vanished mid-tick
    pub skipped: u64,
    /// Highest main-process reading in MiB
    pub max_main_mib: f64,
    pub stop: StopReason,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            ticks: 0,
            main_samples: 0,
            child_samples: 0,
            skipped: 0,
            max_main_mib: 0.0,
            stop: StopReason::Exited,
        }
    }
}

/// Drives the collector on a fixed cadence and records what it sees
pub struct Sampler<C: MemoryCollector> {
    collector: C,
    interval: Duration,
    include_children: bool,
    timeout: Option<Duration>,
}

impl<C: MemoryCollector> Sampler<C> {
    #[must_use]
    pub const fn new(collector: C, interval: Duration) -> Self {
        Self {
            collector,
            interval,
            include_children: true,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_children(mut self, include: bool) -> Self {
        self.include_children = include;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record a session until the target exits or the timeout elapses
    ///
    /// Writes the `CMDLINE` header, then per tick: stop if the target has
    /// exited, otherwise one `MEM` line and one `CHLD<i>` line per live
    /// descendant, then sleep. A process that vanishes mid-tick only loses
    /// its own line.
    ///
    /// # Errors
    ///
    /// Returns error if the target's status cannot be checked or the log
    /// cannot be written
    pub fn record<T: Tracked, W: Durable>(
        &mut self,
        target: &mut T,
        argv: &[String],
        writer: &mut LogWriter<W>,
    ) -> Result<SessionStats> {
        writer.append(&LogRecord::Command(quote_command(argv)))?;

        let clock = SessionClock::start();
        let mut stats = SessionStats::default();
        info!(pid = target.pid(), interval = ?self.interval, "sampling started");

        loop {
            if target.has_exited()? {
                stats.stop = StopReason::Exited;
                break;
            }
            if self.timeout.is_some_and(|limit| clock.elapsed() >= limit) {
                stats.stop = StopReason::TimedOut;
                break;
            }

            self.tick(target.pid(), &clock, writer, &mut stats)?;
            thread::sleep(self.interval);
        }

        info!(
            ticks = stats.ticks,
            samples = stats.main_samples + stats.child_samples,
            stop = ?stats.stop,
            "sampling finished"
        );
        Ok(stats)
    }

    /// Take one round of measurements
    fn tick<W: Durable>(
        &mut self,
        pid: u32,
        clock: &SessionClock,
        writer: &mut LogWriter<W>,
        stats: &mut SessionStats,
    ) -> Result<()> {
        stats.ticks += 1;

        match self.collector.memory_of(pid) {
            Ok(value) => {
                writer.append(&LogRecord::MainSample(Sample::new(value, clock.now())))?;
                stats.main_samples += 1;
                stats.max_main_mib = stats.max_main_mib.max(value);
            }
            Err(e) if e.is_transient() => {
                debug!(pid, "target vanished before it could be read");
                stats.skipped += 1;
            }
            Err(e) => {
                warn!(pid, error = %e, "skipping unreadable target sample");
                stats.skipped += 1;
            }
        }

        if self.include_children {
            let children = self.collector.read_children(pid);
            stats.skipped += children.missed;
            for (index, (_, value)) in children.readings.into_iter().enumerate() {
                writer.append(&LogRecord::ChildSample(
                    index,
                    Sample::new(value, clock.now()),
                ))?;
                stats.child_samples += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfilingError;
    use crate::format::Identity;
    use crate::reader::parse_profile;
    use std::collections::{HashMap, VecDeque};
    use std::path::Path;

    /// Target that reports exit after a fixed number of checks
    struct CountdownTarget {
        pid: u32,
        checks_left: u32,
    }

    impl Tracked for CountdownTarget {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn has_exited(&mut self) -> Result<bool> {
            if self.checks_left == 0 {
                return Ok(true);
            }
            self.checks_left -= 1;
            Ok(false)
        }
    }

    /// Collector replaying scripted readings; a missing entry is `NotFound`
    #[derive(Default)]
    struct ScriptedCollector {
        memory: HashMap<u32, VecDeque<f64>>,
        descendants: VecDeque<Vec<u32>>,
    }

    impl MemoryCollector for ScriptedCollector {
        fn memory_of(&mut self, pid: u32) -> Result<f64> {
            self.memory
                .get_mut(&pid)
                .and_then(VecDeque::pop_front)
                .ok_or(ProfilingError::NotFound(pid))
        }

        fn descendants_of(&mut self, _pid: u32) -> Result<Vec<u32>> {
            Ok(self.descendants.pop_front().unwrap_or_default())
        }
    }

    fn record(collector: ScriptedCollector, ticks: u32) -> (SessionStats, String) {
        let mut sampler = Sampler::new(collector, Duration::from_millis(1));
        let mut target = CountdownTarget {
            pid: 10,
            checks_left: ticks,
        };
        let mut writer = LogWriter::new(Vec::new());
        let argv = vec!["python".to_string(), "my job.py".to_string()];
        let stats = sampler.record(&mut target, &argv, &mut writer);
        let text = writer
            .finish()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        (stats.unwrap_or_default(), text)
    }

    #[test]
    fn test_header_then_main_samples() {
        let collector = ScriptedCollector {
            memory: HashMap::from([(10, VecDeque::from([5.0, 6.0, 7.0]))]),
            ..ScriptedCollector::default()
        };
        let (stats, text) = record(collector, 3);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.first(), Some(&"CMDLINE python 'my job.py'"));
        assert!(lines.iter().skip(1).all(|l| l.starts_with("MEM ")));
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.main_samples, 3);
        assert!((stats.max_main_mib - 7.0).abs() < f64::EPSILON);
        assert_eq!(stats.stop, StopReason::Exited);
    }

    #[test]
    fn test_exited_target_takes_no_samples() {
        let (stats, text) = record(ScriptedCollector::default(), 0);
        assert_eq!(stats.ticks, 0);
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_vanished_processes_are_skipped() {
        // tick 1: main readable, descendants 22 (already gone) and 20
        // tick 2: main gone, descendant 21 only
        let collector = ScriptedCollector {
            memory: HashMap::from([
                (10, VecDeque::from([5.0])),
                (20, VecDeque::from([1.0])),
                (21, VecDeque::from([2.0])),
            ]),
            descendants: VecDeque::from([vec![22, 20], vec![21]]),
        };
        let (stats, text) = record(collector, 2);
        // main on tick 2 and descendant 22 on tick 1
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.child_samples, 2);

        let profile = parse_profile(text.as_bytes(), Path::new("t.dat")).unwrap_or_default();
        assert_eq!(profile.get(Identity::Main).map(Vec::len), Some(1));
        // indices are positions within each tick, not pids
        let child0: Vec<f64> = profile
            .get(Identity::Child(0))
            .map(|s| s.iter().map(|x| x.value).collect())
            .unwrap_or_default();
        assert_eq!(child0, vec![1.0, 2.0]);
        assert_eq!(profile.get(Identity::Child(1)), None);
    }

    #[test]
    fn test_children_can_be_disabled() {
        let collector = ScriptedCollector {
            memory: HashMap::from([(10, VecDeque::from([5.0])), (20, VecDeque::from([1.0]))]),
            descendants: VecDeque::from([vec![20]]),
        };
        let mut sampler = Sampler::new(collector, Duration::from_millis(1)).with_children(false);
        let mut target = CountdownTarget {
            pid: 10,
            checks_left: 1,
        };
        let mut writer = LogWriter::new(Vec::new());
        let stats = sampler.record(&mut target, &["app".to_string()], &mut writer);
        assert_eq!(stats.map(|s| (s.main_samples, s.child_samples)), Ok((1, 0)));
    }

    #[test]
    fn test_timeout_stops_running_target() {
        let collector = ScriptedCollector::default();
        let mut sampler = Sampler::new(collector, Duration::from_millis(5))
            .with_timeout(Some(Duration::from_millis(20)));
        let mut target = CountdownTarget {
            pid: 10,
            checks_left: u32::MAX,
        };
        let mut writer = LogWriter::new(Vec::new());
        let stats = sampler.record(&mut target, &["app".to_string()], &mut writer);
        assert_eq!(stats.map(|s| s.stop), Ok(StopReason::TimedOut));
    }

    #[test]
    fn test_stamps_are_anchor_plus_elapsed() {
        let clock = SessionClock::anchored(1_700_000_000.0, Instant::now());
        let stamp = clock.stamp(Duration::from_millis(1500));
        assert!((stamp - 1_700_000_001.5).abs() < 1e-6);

        let first = clock.now();
        let second = clock.now();
        assert!(first >= 1_700_000_000.0);
        assert!(second >= first);
    }

    #[test]
    fn test_session_stamps_share_one_anchor() {
        let collector = ScriptedCollector {
            memory: HashMap::from([(10, VecDeque::from(vec![1.0; 5]))]),
            ..ScriptedCollector::default()
        };
        let before = SessionClock::start().now();
        let (_, text) = record(collector, 5);
        let profile = parse_profile(text.as_bytes(), Path::new("t.dat")).unwrap_or_default();
        let stamps: Vec<f64> = profile
            .get(Identity::Main)
            .map(|s| s.iter().map(|x| x.timestamp).collect())
            .unwrap_or_default();
        assert_eq!(stamps.len(), 5);
        // five ticks a millisecond apart stay within a second of the anchor
        assert!(stamps.iter().all(|&t| t >= before - 1.0 && t < before + 1.0));
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let collector = ScriptedCollector {
            memory: HashMap::from([(10, VecDeque::from(vec![1.0; 20]))]),
            ..ScriptedCollector::default()
        };
        let (_, text) = record(collector, 20);
        let profile = parse_profile(text.as_bytes(), Path::new("t.dat")).unwrap_or_default();
        let main = profile.get(Identity::Main).cloned().unwrap_or_default();
        assert_eq!(main.len(), 20);
        assert!(main.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
