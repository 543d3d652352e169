#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! Discovery of timestamped profile files
//!
//! Files are named `mprofile_<YYYYMMDDHHMMSS>.dat` with a zero-padded UTC
//! stamp, so sorting names sorts them by time.

use crate::error::{ProfilingError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const PREFIX: &str = "mprofile_";
const SUFFIX: &str = ".dat";
const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_DIGITS: usize = 14;

/// File name for a session started at `at`
#[must_use]
pub fn profile_filename(at: DateTime<Utc>) -> String {
    format!("{PREFIX}{}{SUFFIX}", at.format(STAMP_FORMAT))
}

/// Profiles in `dir`, oldest first
///
/// # Errors
///
/// Returns error if the search pattern cannot be built
pub fn list_profiles(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{PREFIX}{}{SUFFIX}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        "[0-9]".repeat(STAMP_DIGITS)
    );

    let mut found: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| ProfilingError::InvalidConfig(format!("bad profile pattern: {e}")))?
        .filter_map(std::result::Result::ok)
        .filter(|path| path.is_file())
        .collect();
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}

/// Most recent profile in `dir`
///
/// # Errors
///
/// Returns `NoInputFound` if `dir` holds no profile
pub fn latest_profile(dir: &Path) -> Result<PathBuf> {
    list_profiles(dir)?.pop().ok_or_else(|| {
        ProfilingError::NoInputFound(format!(
            "no {PREFIX}*{SUFFIX} file in {}",
            dir.display()
        ))
    })
}

/// Turn user arguments into profile paths
///
/// With no arguments the latest profile in `dir` is used. An argument naming
/// an existing file selects that file; otherwise an integer selects a profile
/// from [`list_profiles`] by position (negative counts from the newest).
/// Duplicates are dropped.
///
/// # Errors
///
/// Returns `NoInputFound` for an unknown index or a missing file
pub fn resolve_inputs(args: &[String], dir: &Path) -> Result<Vec<PathBuf>> {
    if args.is_empty() {
        return latest_profile(dir).map(|path| vec![path]);
    }

    let mut listed: Option<Vec<PathBuf>> = None;
    let mut resolved: Vec<PathBuf> = Vec::new();

    for arg in args {
        let given = PathBuf::from(arg);
        let path = if given.is_file() {
            given
        } else if let Ok(index) = arg.parse::<isize>() {
            let profiles = match listed.take() {
                Some(profiles) => profiles,
                None => list_profiles(dir)?,
            };
            let picked = pick(&profiles, index)
                .cloned()
                .ok_or_else(|| ProfilingError::NoInputFound(format!("no profile at index {arg}")));
            listed = Some(profiles);
            picked?
        } else {
            return Err(ProfilingError::NoInputFound(arg.clone()));
        };

        if resolved.contains(&path) {
            debug!(path = %path.display(), "ignoring repeated input");
        } else {
            resolved.push(path);
        }
    }
    Ok(resolved)
}

fn pick(profiles: &[PathBuf], index: isize) -> Option<&PathBuf> {
    let position = if index < 0 {
        profiles.len().checked_sub(index.unsigned_abs())?
    } else {
        index.unsigned_abs()
    };
    profiles.get(position)
}

/// Delete every profile in `dir`, returning how many were removed
///
/// # Errors
///
/// Returns error if a file cannot be deleted
pub fn clean_profiles(dir: &Path) -> Result<usize> {
    let profiles = list_profiles(dir)?;
    for path in &profiles {
        fs::remove_file(path)
            .map_err(|e| ProfilingError::IoError(format!("{}: {e}", path.display())))?;
    }
    Ok(profiles.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let _ = fs::write(&path, "CMDLINE app\n");
        path
    }

    #[test]
    fn test_filename_is_zero_padded() {
        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).single();
        assert_eq!(
            at.map(profile_filename),
            Some("mprofile_20230102030405.dat".to_string())
        );
    }

    #[test]
    fn test_latest_is_lexicographically_last() {
        if let Ok(dir) = TempDir::new() {
            touch(dir.path(), "mprofile_20230601000000.dat");
            touch(dir.path(), "mprofile_20230101000000.dat");
            let latest = latest_profile(dir.path());
            assert_eq!(
                latest.ok().and_then(|p| p.file_name().map(|n| n.to_os_string())),
                Some("mprofile_20230601000000.dat".into())
            );
        }
    }

    #[test]
    fn test_non_matching_names_ignored() {
        if let Ok(dir) = TempDir::new() {
            touch(dir.path(), "mprofile_2023.dat");
            touch(dir.path(), "mprofile_20230101000000.txt");
            touch(dir.path(), "other_20230101000000.dat");
            assert!(matches!(
                latest_profile(dir.path()),
                Err(ProfilingError::NoInputFound(_))
            ));
        }
    }

    #[test]
    fn test_resolve_by_index_and_name() {
        if let Ok(dir) = TempDir::new() {
            let old = touch(dir.path(), "mprofile_20230101000000.dat");
            let new = touch(dir.path(), "mprofile_20230601000000.dat");
            let args = vec![
                "-1".to_string(),
                "0".to_string(),
                old.display().to_string(),
            ];
            let resolved = resolve_inputs(&args, dir.path());
            assert_eq!(resolved, Ok(vec![new, old]));

            let bad = resolve_inputs(&["5".to_string()], dir.path());
            assert!(matches!(bad, Err(ProfilingError::NoInputFound(_))));
        }
    }

    /// Removes a file in the working directory when dropped
    struct RemoveOnDrop(PathBuf);

    impl Drop for RemoveOnDrop {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_existing_file_wins_over_index() {
        if let Ok(dir) = TempDir::new() {
            touch(dir.path(), "mprofile_20230101000000.dat");

            // a relative name that also parses as an out-of-range index
            let name = format!("{}", 900_000_000 + std::process::id());
            let numeric = RemoveOnDrop(PathBuf::from(&name));
            let _ = fs::write(&numeric.0, "MEM 1.0 1.0\n");

            assert_eq!(
                resolve_inputs(&[name], dir.path()),
                Ok(vec![numeric.0.clone()])
            );
        }
    }

    #[test]
    fn test_missing_explicit_path() {
        let result = resolve_inputs(&["/nonexistent/profile.dat".to_string()], Path::new("."));
        assert!(matches!(result, Err(ProfilingError::NoInputFound(_))));
    }

    #[test]
    fn test_clean_removes_profiles_only() {
        if let Ok(dir) = TempDir::new() {
            touch(dir.path(), "mprofile_20230101000000.dat");
            touch(dir.path(), "mprofile_20230601000000.dat");
            let keep = touch(dir.path(), "notes.dat");
            assert_eq!(clean_profiles(dir.path()), Ok(2));
            assert!(keep.exists());
            assert_eq!(list_profiles(dir.path()), Ok(Vec::new()));
        }
    }
}
