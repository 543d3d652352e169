#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Resident memory readings for a process and its descendants

use crate::error::{ProfilingError, Result};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io;
use std::path::PathBuf;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

const KIB_PER_MIB: f64 = 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// `ESRCH`: reading `/proc` of a process that exited mid-read
const ESRCH: i32 = 3;

/// Source of memory readings, evaluated at the instant of the call
///
/// A [`ProfilingError::NotFound`] means the process went away and is never
/// fatal for the caller.
pub trait MemoryCollector {
    /// Resident memory of `pid` in MiB
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the process no longer exists
    fn memory_of(&mut self, pid: u32) -> Result<f64>;

    /// Live descendants of `pid` (children, grandchildren, ...) in collector order
    ///
    /// # Errors
    ///
    /// Returns error if the process table cannot be read
    fn descendants_of(&mut self, pid: u32) -> Result<Vec<u32>>;

    /// Memory of every live descendant, skipping processes that vanish
    /// between listing and reading
    fn children_of(&mut self, pid: u32) -> Vec<(u32, f64)> {
        self.read_children(pid).readings
    }

    /// Like [`MemoryCollector::children_of`], also counting the descendants
    /// that were listed but could not be read
    fn read_children(&mut self, pid: u32) -> ChildReadings {
        let descendants = match self.descendants_of(pid) {
            Ok(pids) => pids,
            Err(e) => {
                debug!(pid, error = %e, "cannot enumerate descendants");
                return ChildReadings::default();
            }
        };

        let mut children = ChildReadings::default();
        for child in descendants {
            match self.memory_of(child) {
                Ok(mib) => children.readings.push((child, mib)),
                Err(e) if e.is_transient() => {
                    debug!(pid = child, "descendant exited before it could be read");
                    children.missed += 1;
                }
                Err(e) => {
                    warn!(pid = child, error = %e, "skipping unreadable descendant");
                    children.missed += 1;
                }
            }
        }
        children
    }
}

/// Descendant readings from one enumeration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildReadings {
    /// `(pid, MiB)` in collector order
    pub readings: Vec<(u32, f64)>,
    /// Listed descendants whose memory could not be read
    pub missed: u64,
}

impl<C: MemoryCollector + ?Sized> MemoryCollector for Box<C> {
    fn memory_of(&mut self, pid: u32) -> Result<f64> {
        (**self).memory_of(pid)
    }

    fn descendants_of(&mut self, pid: u32) -> Result<Vec<u32>> {
        (**self).descendants_of(pid)
    }
}

/// Collector for the current platform
#[must_use]
pub fn default_collector() -> Box<dyn MemoryCollector> {
    #[cfg(target_os = "linux")]
    {
        Box::new(ProcCollector::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(SysinfoCollector::new())
    }
}

/// Breadth-first walk of a parent -> children map starting below `root`
fn walk_descendants(root: u32, children: &BTreeMap<u32, Vec<u32>>) -> Vec<u32> {
    let mut found = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(parent) = queue.pop_front() {
        if let Some(kids) = children.get(&parent) {
            for &kid in kids {
                // pid reuse can make a parent chain loop back
                if kid != root && !found.contains(&kid) {
                    found.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }
    found
}

/// Reads `/proc/[pid]/status` and `/proc/[pid]/stat` (Linux)
#[derive(Debug, Clone)]
pub struct ProcCollector {
    root: PathBuf,
}

impl Default for ProcCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcCollector {
    /// Collector over the live `/proc` filesystem
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/proc"))
    }

    /// Collector over a procfs-shaped directory tree
    #[must_use]
    pub const fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    fn read_pid_file(&self, pid: u32, name: &str) -> Result<String> {
        let path = self.root.join(pid.to_string()).join(name);
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(ESRCH) {
                ProfilingError::NotFound(pid)
            } else {
                ProfilingError::IoError(format!("{}: {e}", path.display()))
            }
        })
    }

    /// Value of `VmRSS:` in kilobytes
    ///
    /// Zombies have no `VmRSS` line; they count as gone.
    fn parse_vm_rss(status: &str, pid: u32) -> Result<u64> {
        let line = status
            .lines()
            .find(|line| line.starts_with("VmRSS:"))
            .ok_or(ProfilingError::NotFound(pid))?;

        line.split_whitespace()
            .nth(1)
            .ok_or_else(|| {
                ProfilingError::MetricsParseError(format!("missing value in line: {line}"))
            })?
            .parse::<u64>()
            .map_err(|e| {
                ProfilingError::MetricsParseError(format!("failed to parse value in '{line}': {e}"))
            })
    }

    /// Parent pid from a `stat` line; the command name may contain spaces
    /// and parentheses, so fields are read after the last `)`
    fn parse_ppid(stat: &str) -> Option<u32> {
        let (_, rest) = stat.rsplit_once(')')?;
        rest.split_whitespace().nth(1)?.parse().ok()
    }

    fn process_table(&self) -> Result<BTreeMap<u32, Vec<u32>>> {
        let mut pids: Vec<u32> = fs::read_dir(&self.root)?
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .collect();
        pids.sort_unstable();

        let mut children: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for pid in pids {
            // processes exiting during the scan are simply absent
            let Ok(stat) = self.read_pid_file(pid, "stat") else {
                continue;
            };
            if let Some(ppid) = Self::parse_ppid(&stat) {
                children.entry(ppid).or_default().push(pid);
            }
        }
        Ok(children)
    }
}

impl MemoryCollector for ProcCollector {
    #[allow(clippy::cast_precision_loss)]
    fn memory_of(&mut self, pid: u32) -> Result<f64> {
        let status = self.read_pid_file(pid, "status")?;
        Self::parse_vm_rss(&status, pid).map(|kib| kib as f64 / KIB_PER_MIB)
    }

    fn descendants_of(&mut self, pid: u32) -> Result<Vec<u32>> {
        let table = self.process_table()?;
        Ok(walk_descendants(pid, &table))
    }
}

/// Portable collector backed by `sysinfo`
pub struct SysinfoCollector {
    system: System,
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl MemoryCollector for SysinfoCollector {
    #[allow(clippy::cast_precision_loss)]
    fn memory_of(&mut self, pid: u32) -> Result<f64> {
        let target = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        self.system
            .process(target)
            .map(|process| process.memory() as f64 / BYTES_PER_MIB)
            .ok_or(ProfilingError::NotFound(pid))
    }

    fn descendants_of(&mut self, pid: u32) -> Result<Vec<u32>> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let mut table: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for (child, process) in self.system.processes() {
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                table.entry(parent.as_u32()).or_default().push(child.as_u32());
            }
        }
        table.values_mut().for_each(|kids| kids.sort_unstable());

        Ok(walk_descendants(pid, &table))
    }
}
