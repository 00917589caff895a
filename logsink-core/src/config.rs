//! Sink configuration, loaded from TOML or built in code.
//!
//! Every option has a default, so an empty table is a valid configuration.
//! `SinkConfig::resolve` must run before the config is used; `LogSink::new`
//! does this for you.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::{fs, path::MAIN_SEPARATOR};

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;

use crate::error::{SinkError, SinkResult};

/// Default timestamp format (ISO 8601 with offset).
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Default plain-text line template: timestamp, category, message.
pub const DEFAULT_FORMAT: &str = "[%s][%s] %s";

/// Default rotation threshold (2 MiB).
pub const DEFAULT_FILE_SIZE: u64 = 2_097_152;

/// Default base directory when none is configured.
pub const DEFAULT_PATH: &str = "runtime/log";

/// Host config key consulted for the store connection.
pub const DB_CONNECT_KEY: &str = "log.db_connect";

/// Fixed-file mode for the master destination.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "SingleRaw")]
pub enum SingleFile {
    /// Date-based file names.
    #[default]
    Off,
    /// Always write to `single.log`.
    Default,
    /// Always write to `{stem}.log`.
    Named(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SingleRaw {
    Flag(bool),
    Stem(String),
}

impl From<SingleRaw> for SingleFile {
    fn from(raw: SingleRaw) -> Self {
        match raw {
            SingleRaw::Flag(false) => Self::Off,
            SingleRaw::Flag(true) => Self::Default,
            SingleRaw::Stem(s) if s.is_empty() => Self::Off,
            SingleRaw::Stem(s) => Self::Named(s),
        }
    }
}

impl SingleFile {
    /// File stem used in single-file mode, or `None` when dated files are used.
    pub fn stem(&self) -> Option<&str> {
        match self {
            Self::Off => None,
            Self::Default => Some("single"),
            Self::Named(stem) => Some(stem),
        }
    }
}

/// Which categories are written to their own files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "IsolationRaw")]
pub enum Isolation {
    /// Every category goes to the master file.
    #[default]
    Off,
    /// Every category gets its own file.
    All,
    /// Only the listed categories get their own file.
    Only(BTreeSet<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IsolationRaw {
    Flag(bool),
    Categories(Vec<String>),
}

impl From<IsolationRaw> for Isolation {
    fn from(raw: IsolationRaw) -> Self {
        match raw {
            IsolationRaw::Flag(true) => Self::All,
            IsolationRaw::Flag(false) => Self::Off,
            IsolationRaw::Categories(c) if c.is_empty() => Self::Off,
            IsolationRaw::Categories(c) => Self::Only(c.into_iter().collect()),
        }
    }
}

impl Isolation {
    /// Build an isolation set from category names.
    pub fn only<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(categories.into_iter().map(Into::into).collect())
    }

    /// Whether `category` must be written to its own file.
    pub fn is_isolated(&self, category: &str) -> bool {
        match self {
            Self::Off => false,
            Self::All => true,
            Self::Only(set) => set.contains(category),
        }
    }
}

/// Encoding flags for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    /// Emit non-ASCII characters as-is instead of `\uXXXX` escapes.
    pub unescaped_unicode: bool,
    /// Emit `/` as-is instead of `\/`.
    pub unescaped_slashes: bool,
    /// Pretty-print each object.
    pub pretty: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            unescaped_unicode: true,
            unescaped_slashes: true,
            pretty: false,
        }
    }
}

/// Full sink configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// chrono strftime format for record timestamps.
    pub time_format: String,
    /// Fixed-file mode.
    pub single: SingleFile,
    /// Rotation threshold in bytes.
    pub file_size: u64,
    /// Base directory. Ends with a path separator once resolved.
    pub path: String,
    /// Category isolation policy.
    pub apart_level: Isolation,
    /// Maximum number of `*.log` files kept in the base directory (0 = unbounded).
    pub max_files: usize,
    /// Structured (JSON) output instead of the plain template.
    pub json: bool,
    pub json_options: JsonOptions,
    /// Plain-text template with three `%s` slots.
    pub format: String,
    /// Slow SQL threshold in milliseconds.
    pub slow_sql_time: f64,
    /// `app/controller/action` paths never persisted to the store.
    pub action_filters: Vec<String>,
    /// Target table or collection for slow-query records.
    pub db_table: String,
    /// Store connection; falls back to the host's `log.db_connect`, then `default`.
    pub db_connect: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            single: SingleFile::Off,
            file_size: DEFAULT_FILE_SIZE,
            path: String::new(),
            apart_level: Isolation::Off,
            max_files: 0,
            json: false,
            json_options: JsonOptions::default(),
            format: DEFAULT_FORMAT.to_string(),
            slow_sql_time: 1000.0,
            action_filters: Vec::new(),
            db_table: "log".to_string(),
            db_connect: None,
        }
    }
}

impl SinkConfig {
    /// Config rooted at `path` with every other option at its default.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Normalize the configuration.
    ///
    /// Fills an empty `format`/`path`, guarantees the trailing separator on
    /// `path`, and rejects a `time_format` chrono cannot render.
    pub fn resolve(mut self) -> SinkResult<Self> {
        if self.format.is_empty() {
            self.format = DEFAULT_FORMAT.to_string();
        }
        if self.time_format.is_empty() {
            self.time_format = DEFAULT_TIME_FORMAT.to_string();
        }
        if self.path.is_empty() {
            self.path = DEFAULT_PATH.to_string();
        }
        if !self.path.ends_with(MAIN_SEPARATOR) && !self.path.ends_with('/') {
            self.path.push(MAIN_SEPARATOR);
        }
        if StrftimeItems::new(&self.time_format).any(|item| matches!(item, Item::Error)) {
            return Err(SinkError::InvalidArgument {
                message: format!("unsupported time_format: {}", self.time_format),
            });
        }
        if self.db_table.is_empty() {
            return Err(SinkError::InvalidArgument {
                message: "db_table must not be empty".to_string(),
            });
        }
        Ok(self)
    }

    /// Base directory as a path.
    pub fn base_dir(&self) -> &Path {
        Path::new(&self.path)
    }

    /// Whether `{app}/{controller}/{action}` is excluded from persistence.
    pub fn is_filtered_action(&self, route: &str) -> bool {
        self.action_filters.iter().any(|f| f == route)
    }
}

/// Loads a sink configuration from a TOML file.
///
/// Options may sit at the top level or inside a `[log]` table.
pub fn load_config(path: &Path) -> Result<SinkConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Invalid TOML in {}", path.display()))?;

    let section = match table.remove("log") {
        Some(toml::Value::Table(log)) => log,
        _ => table,
    };

    let cfg: SinkConfig = toml::Value::Table(section)
        .try_into()
        .with_context(|| format!("Invalid log sink config in {}", path.display()))?;
    cfg.resolve()
        .map_err(|e| SinkError::config(path, e.to_string()))
        .context("Failed to resolve log sink config")
}

/// Read-only host settings lookup.
pub trait KeyValueConfig {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

impl KeyValueConfig for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Dotted-key lookup: `log.db_connect` reads `[log] db_connect`.
impl KeyValueConfig for toml::Table {
    fn get(&self, key: &str) -> Option<String> {
        let mut parts = key.split('.');
        let mut value = toml::Table::get(self, parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        match value {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Table(_) | toml::Value::Array(_) => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SinkConfig::default().resolve().unwrap();
        assert_eq!(cfg.format, "[%s][%s] %s");
        assert_eq!(cfg.file_size, 2_097_152);
        assert!(cfg.path.ends_with(MAIN_SEPARATOR));
        assert!(cfg.path.starts_with("runtime"));
        assert_eq!(cfg.single, SingleFile::Off);
        assert_eq!(cfg.apart_level, Isolation::Off);
        assert!(cfg.json_options.unescaped_unicode);
        assert!(cfg.json_options.unescaped_slashes);
    }

    #[test]
    fn test_resolve_appends_separator_once() {
        let cfg = SinkConfig::with_path("/var/log/app").resolve().unwrap();
        assert_eq!(cfg.path, format!("/var/log/app{}", MAIN_SEPARATOR));

        let cfg = SinkConfig::with_path("/var/log/app/").resolve().unwrap();
        assert_eq!(cfg.path, "/var/log/app/");
    }

    #[test]
    fn test_resolve_rejects_bad_time_format() {
        let cfg = SinkConfig {
            time_format: "%Y-%Q".to_string(),
            ..SinkConfig::default()
        };
        assert!(matches!(cfg.resolve(), Err(SinkError::InvalidArgument { .. })));
    }

    #[test]
    fn test_single_and_apart_level_from_toml() {
        let cfg: SinkConfig = toml::from_str(
            r#"
            single = "app"
            apart_level = ["error", "sql"]
            max_files = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.single.stem(), Some("app"));
        assert!(cfg.apart_level.is_isolated("sql"));
        assert!(!cfg.apart_level.is_isolated("info"));
        assert_eq!(cfg.max_files, 30);

        let cfg: SinkConfig = toml::from_str("single = true\napart_level = true").unwrap();
        assert_eq!(cfg.single.stem(), Some("single"));
        assert!(cfg.apart_level.is_isolated("anything"));

        let cfg: SinkConfig = toml::from_str("single = false\napart_level = false").unwrap();
        assert_eq!(cfg.single.stem(), None);
        assert!(!cfg.apart_level.is_isolated("error"));
    }

    #[test]
    fn test_json_options_partial() {
        let cfg: SinkConfig = toml::from_str(
            r#"
            json = true
            [json_options]
            unescaped_slashes = false
            "#,
        )
        .unwrap();
        assert!(cfg.json);
        assert!(!cfg.json_options.unescaped_slashes);
        assert!(cfg.json_options.unescaped_unicode);
    }

    #[test]
    fn test_load_config_log_section() {
        let dir = std::env::temp_dir().join(format!("logsink_config_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("sink.toml");
        fs::write(
            &file,
            r#"
            [log]
            path = "/tmp/logs"
            slow_sql_time = 250.0
            action_filters = ["admin/index/ping"]
            db_table = "sys_log"
            "#,
        )
        .unwrap();

        let cfg = load_config(&file).unwrap();
        assert_eq!(cfg.path, format!("/tmp/logs{}", MAIN_SEPARATOR));
        assert_eq!(cfg.slow_sql_time, 250.0);
        assert!(cfg.is_filtered_action("admin/index/ping"));
        assert_eq!(cfg.db_table, "sys_log");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config(Path::new("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn test_key_value_lookup() {
        let mut map = HashMap::new();
        map.insert("log.db_connect".to_string(), "mongodb".to_string());
        assert_eq!(KeyValueConfig::get(&map, DB_CONNECT_KEY).as_deref(), Some("mongodb"));

        let table: toml::Table = toml::from_str("[log]\ndb_connect = \"archive\"\nlevel = 3").unwrap();
        assert_eq!(KeyValueConfig::get(&table, "log.db_connect").as_deref(), Some("archive"));
        assert_eq!(KeyValueConfig::get(&table, "log.level").as_deref(), Some("3"));
        assert_eq!(KeyValueConfig::get(&table, "log.missing"), None);
        assert_eq!(KeyValueConfig::get(&table, "log"), None);
    }
}
