#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Process management for the profiled command

use crate::error::{ProfilingError, Result};
use std::path::Path;
use std::process::{Child, Command};

/// A process the sampler can poll without blocking
pub trait Tracked {
    /// Process ID of the target
    fn pid(&self) -> u32;

    /// Non-blocking check whether the target has exited
    ///
    /// # Errors
    ///
    /// Returns error if the process status cannot be determined
    fn has_exited(&mut self) -> Result<bool>;
}

/// Wrapper for managing a profiled process
pub struct ProfiledProcess {
    /// The child process handle
    child: Child,

    /// Process ID
    pid: u32,
}

impl ProfiledProcess {
    /// Spawn the command described by `argv` (program first)
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` if `argv` is empty or the executable cannot be started
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use mprof::process::ProfiledProcess;
    /// let process = ProfiledProcess::spawn(&["python".to_string(), "job.py".to_string()], None);
    /// ```
    pub fn spawn(argv: &[String], working_dir: Option<&Path>) -> Result<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProfilingError::LaunchError("no command given".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| ProfilingError::LaunchError(format!("{program}: {e}")))?;

        let pid = child.id();

        Ok(Self { child, pid })
    }

    /// Kill the process
    ///
    /// # Errors
    ///
    /// Returns error if kill signal fails
    pub fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| ProfilingError::ProcessTerminated(format!("kill failed: {e}")))?;
        // reap so the pid does not linger as a zombie
        self.child
            .wait()
            .map_err(|e| ProfilingError::ProcessTerminated(format!("wait failed: {e}")))?;
        Ok(())
    }
}

impl Tracked for ProfiledProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&mut self) -> Result<bool> {
        match self.child.try_wait() {
            Ok(None) => Ok(false),
            Ok(Some(_)) => Ok(true),
            Err(e) => Err(ProfilingError::ProcessTerminated(format!(
                "failed to check process status: {e}"
            ))),
        }
    }
}
