//! Log sink preparation at startup
//!
//! The previous run's log is moved aside to `<file>.1`, and rotated files
//! older than the retention window are removed from the log directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Rotated logs are kept for a week
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What startup rotation did, reported once logging is up
#[derive(Debug, Default)]
pub struct LogSinkPreparation {
    pub rotated_to: Option<PathBuf>,
    pub pruned: Vec<PathBuf>,
    /// Non-fatal problems encountered along the way
    pub errors: Vec<String>,
}

/// Rotate the current log file and prune old rotations.
///
/// Never fails: opening the sink afterwards is what decides whether startup
/// can continue.
pub fn prepare_log_sink(path: &Path, retention: Duration) -> LogSinkPreparation {
    let mut prep = LogSinkPreparation::default();

    match rotate(path) {
        Ok(rotated) => prep.rotated_to = rotated,
        Err(e) => prep
            .errors
            .push(format!("failed to rotate {}: {}", path.display(), e)),
    }

    match prune(path, retention, SystemTime::now()) {
        Ok(pruned) => prep.pruned = pruned,
        Err(e) => prep
            .errors
            .push(format!("failed to prune rotated logs of {}: {}", path.display(), e)),
    }

    prep
}

/// Rename `path` to `path.1` if it exists
pub fn rotate(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".1");
    let rotated = PathBuf::from(rotated);

    fs::rename(path, &rotated)?;
    Ok(Some(rotated))
}

/// Remove `<file>.*` siblings whose modification time is before `now - retention`
pub fn prune(path: &Path, retention: Duration, now: SystemTime) -> io::Result<Vec<PathBuf>> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{file_name}.");
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut pruned = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(&prefix) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age > retention && fs::remove_file(entry.path()).is_ok() {
            pruned.push(entry.path());
        }
    }

    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_moves_existing_log() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gpu_idle_monitor.log");
        fs::write(&log, "previous run\n").unwrap();

        let rotated = rotate(&log).unwrap().unwrap();

        assert!(!log.exists());
        assert_eq!(rotated, dir.path().join("gpu_idle_monitor.log.1"));
        assert_eq!(fs::read_to_string(rotated).unwrap(), "previous run\n");
    }

    #[test]
    fn test_rotate_without_existing_log() {
        let dir = TempDir::new().unwrap();
        assert!(rotate(&dir.path().join("missing.log")).unwrap().is_none());
    }

    #[test]
    fn test_prune_only_old_rotations() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gpu_idle_monitor.log");
        fs::write(dir.path().join("gpu_idle_monitor.log.1"), "old").unwrap();
        fs::write(dir.path().join("gpu_idle_monitor.log.2"), "old").unwrap();
        fs::write(dir.path().join("other.log.1"), "unrelated").unwrap();
        fs::write(&log, "current").unwrap();

        // Pretend eight days have passed
        let now = SystemTime::now() + Duration::from_secs(8 * 24 * 60 * 60);
        let mut pruned = prune(&log, DEFAULT_RETENTION, now).unwrap();
        pruned.sort();

        assert_eq!(
            pruned,
            vec![
                dir.path().join("gpu_idle_monitor.log.1"),
                dir.path().join("gpu_idle_monitor.log.2"),
            ]
        );
        assert!(log.exists());
        assert!(dir.path().join("other.log.1").exists());
    }

    #[test]
    fn test_prune_keeps_recent_rotations() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("gpu_idle_monitor.log");
        fs::write(dir.path().join("gpu_idle_monitor.log.1"), "recent").unwrap();

        let pruned = prune(&log, DEFAULT_RETENTION, SystemTime::now()).unwrap();

        assert!(pruned.is_empty());
        assert!(dir.path().join("gpu_idle_monitor.log.1").exists());
    }

    #[test]
    fn test_prepare_reports_missing_directory() {
        let prep = prepare_log_sink(Path::new("/nonexistent-dir/monitor.log"), DEFAULT_RETENTION);

        assert!(prep.rotated_to.is_none());
        assert_eq!(prep.errors.len(), 1);
    }
}
