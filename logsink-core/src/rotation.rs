//! Size-based rotation.
//!
//! Before each append the destination's size is checked. A file at or above
//! the threshold is renamed to `{unix_timestamp}-{basename}` in the same
//! directory, so the next append starts a fresh file at the original path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// What the rotation check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Nothing at the path yet.
    Missing,
    /// File exists and is below the threshold.
    BelowThreshold { size: u64 },
    /// File was renamed to `backup`.
    Rotated { backup: PathBuf },
    /// Rename failed; writes keep growing the existing file.
    Failed { error: String },
}

impl RotationOutcome {
    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Rotated { .. })
    }
}

/// Backup name for `path` rotated at `now`.
pub fn backup_path(path: &Path, now: &DateTime<Local>) -> PathBuf {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}-{}", now.timestamp(), basename))
}

/// Rotates `path` if it is a file of at least `threshold` bytes.
pub fn check_and_rotate(path: &Path, threshold: u64, now: &DateTime<Local>) -> RotationOutcome {
    let size = match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return RotationOutcome::Missing,
    };

    if size < threshold {
        return RotationOutcome::BelowThreshold { size };
    }

    let backup = backup_path(path, now);
    match fs::rename(path, &backup) {
        Ok(()) => {
            tracing::debug!(
                path = %path.display(),
                backup = %backup.display(),
                size = size,
                "rotated log file"
            );
            RotationOutcome::Rotated { backup }
        }
        Err(e) => {
            crate::logging::log_swallowed("rotation", &format!("{}: {}", path.display(), e));
            RotationOutcome::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("logsink_rotation_test")
            .join(format!("{}_{}", name, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn at() -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_backup_path_format() {
        let backup = backup_path(Path::new("/logs/202403/05.log"), &at());
        assert_eq!(backup, PathBuf::from("/logs/202403/1700000000-05.log"));
    }

    #[test]
    fn test_missing_file() {
        let dir = temp_dir("missing");
        let outcome = check_and_rotate(&dir.join("none.log"), 10, &at());
        assert_eq!(outcome, RotationOutcome::Missing);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_below_threshold_untouched() {
        let dir = temp_dir("below");
        let file = dir.join("app.log");
        fs::write(&file, "123456789").unwrap();

        let outcome = check_and_rotate(&file, 10, &at());
        assert_eq!(outcome, RotationOutcome::BelowThreshold { size: 9 });
        assert!(file.exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_at_threshold_rotates() {
        let dir = temp_dir("exact");
        let file = dir.join("app.log");
        fs::write(&file, "0123456789").unwrap();

        let outcome = check_and_rotate(&file, 10, &at());
        let expected = dir.join("1700000000-app.log");
        assert_eq!(outcome, RotationOutcome::Rotated { backup: expected.clone() });
        assert!(!file.exists());
        assert_eq!(fs::read_to_string(expected).unwrap(), "0123456789");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_directory_is_not_rotated() {
        let dir = temp_dir("dir");
        let outcome = check_and_rotate(&dir, 0, &at());
        assert_eq!(outcome, RotationOutcome::Missing);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_blocked_backup_keeps_file() {
        let dir = temp_dir("blocked");
        let file = dir.join("app.log");
        fs::write(&file, "0123456789").unwrap();
        fs::create_dir_all(dir.join("1700000000-app.log").join("taken")).unwrap();

        let outcome = check_and_rotate(&file, 10, &at());
        assert!(matches!(outcome, RotationOutcome::Failed { .. }));
        assert!(!outcome.is_rotated());
        assert_eq!(fs::read_to_string(&file).unwrap(), "0123456789");
        fs::remove_dir_all(&dir).ok();
    }
}
