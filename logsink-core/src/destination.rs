//! Destination resolution and file-count retention.
//!
//! File layout under the base directory:
//!
//! | mode                | master file       | isolated file              |
//! |---------------------|-------------------|----------------------------|
//! | `single`            | `{stem}.log`      | `{stem}_{category}.log`    |
//! | `max_files > 0`     | `YYYYMMDD.log`    | `YYYYMMDD_{category}.log`  |
//! | default             | `YYYYMM/DD.log`   | `YYYYMM/DD_{category}.log` |
//!
//! Isolated files live next to the master file, so both roll over on the same
//! cadence. Paths depend on the date and are resolved on every call.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::config::SinkConfig;

/// A resolved log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: PathBuf,
    /// `true` for a per-category file, `false` for the shared master file.
    pub isolated: bool,
}

impl Destination {
    /// Directory holding the file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// What the retention pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionOutcome {
    /// No `max_files` policy configured.
    Disabled,
    /// File count is within the limit.
    WithinLimit { count: usize },
    /// The oldest file was deleted.
    Pruned(PathBuf),
    /// Deleting the oldest file failed; the count stays over the limit.
    Failed { path: PathBuf, error: String },
}

/// Path of the master file for `now`.
pub fn resolve_master(config: &SinkConfig, now: &DateTime<Local>) -> Destination {
    let base = config.base_dir();
    let path = if let Some(stem) = config.single.stem() {
        base.join(format!("{}.log", stem))
    } else if config.max_files > 0 {
        base.join(format!("{}.log", now.format("%Y%m%d")))
    } else {
        base.join(now.format("%Y%m").to_string())
            .join(format!("{}.log", now.format("%d")))
    };

    Destination {
        path,
        isolated: false,
    }
}

/// Path of the isolated file for `category` inside `dir`.
pub fn resolve_isolated(
    config: &SinkConfig,
    dir: &Path,
    category: &str,
    now: &DateTime<Local>,
) -> Destination {
    let name = match config.single.stem() {
        Some(stem) => stem.to_string(),
        None if config.max_files > 0 => now.format("%Y%m%d").to_string(),
        None => now.format("%d").to_string(),
    };

    Destination {
        path: dir.join(format!("{}_{}.log", name, category)),
        isolated: true,
    }
}

/// `*.log` entries directly under `dir`, sorted by file name.
///
/// Any entry with a `.log` name counts toward the limit, including a directory,
/// which retention then fails to delete.
pub fn list_log_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .map(|e| e.into_path())
        .collect()
}

/// Deletes the oldest `*.log` file when the base directory holds more than
/// `max_files` of them.
///
/// At most one file is removed per call. Failures are returned, not raised.
pub fn enforce_retention(config: &SinkConfig) -> RetentionOutcome {
    if config.max_files == 0 {
        return RetentionOutcome::Disabled;
    }

    let files = list_log_files(config.base_dir());
    if files.len() <= config.max_files {
        return RetentionOutcome::WithinLimit { count: files.len() };
    }

    let oldest = files[0].clone();
    match fs::remove_file(&oldest) {
        Ok(()) => {
            tracing::debug!(path = %oldest.display(), "pruned oldest log file");
            RetentionOutcome::Pruned(oldest)
        }
        Err(e) => {
            crate::logging::log_swallowed("retention", &format!("{}: {}", oldest.display(), e));
            RetentionOutcome::Failed {
                path: oldest,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SingleFile;
    use chrono::TimeZone;

    fn day() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap()
    }

    fn config(max_files: usize, single: SingleFile) -> SinkConfig {
        SinkConfig {
            max_files,
            single,
            ..SinkConfig::with_path("/logs/")
        }
    }

    #[test]
    fn test_master_default_layout() {
        let dest = resolve_master(&config(0, SingleFile::Off), &day());
        assert_eq!(dest.path, PathBuf::from("/logs/202403/05.log"));
        assert!(!dest.isolated);
        assert_eq!(dest.dir(), Path::new("/logs/202403"));
    }

    #[test]
    fn test_master_max_files_layout() {
        let dest = resolve_master(&config(7, SingleFile::Off), &day());
        assert_eq!(dest.path, PathBuf::from("/logs/20240305.log"));
    }

    #[test]
    fn test_master_single_ignores_date() {
        let dest = resolve_master(&config(7, SingleFile::Default), &day());
        assert_eq!(dest.path, PathBuf::from("/logs/single.log"));

        let dest = resolve_master(&config(0, SingleFile::Named("app".into())), &day());
        assert_eq!(dest.path, PathBuf::from("/logs/app.log"));
    }

    #[test]
    fn test_isolated_names_follow_master_granularity() {
        let now = day();

        let cfg = config(0, SingleFile::Off);
        let dir = resolve_master(&cfg, &now).dir().to_path_buf();
        let dest = resolve_isolated(&cfg, &dir, "error", &now);
        assert_eq!(dest.path, PathBuf::from("/logs/202403/05_error.log"));
        assert!(dest.isolated);

        let cfg = config(3, SingleFile::Off);
        let dir = resolve_master(&cfg, &now).dir().to_path_buf();
        let dest = resolve_isolated(&cfg, &dir, "sql", &now);
        assert_eq!(dest.path, PathBuf::from("/logs/20240305_sql.log"));

        let cfg = config(0, SingleFile::Named("api".into()));
        let dest = resolve_isolated(&cfg, Path::new("/logs"), "sql", &now);
        assert_eq!(dest.path, PathBuf::from("/logs/api_sql.log"));
    }

    #[test]
    fn test_retention_disabled() {
        assert_eq!(
            enforce_retention(&config(0, SingleFile::Off)),
            RetentionOutcome::Disabled
        );
    }

    #[test]
    fn test_retention_missing_dir_is_within_limit() {
        let cfg = SinkConfig {
            max_files: 2,
            ..SinkConfig::with_path("/definitely/not/a/log/dir/")
        };
        assert_eq!(
            enforce_retention(&cfg),
            RetentionOutcome::WithinLimit { count: 0 }
        );
    }
}
