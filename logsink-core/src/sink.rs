//! The sink: one `save` per unit of work.
//!
//! ```rust,ignore
//! use logsink_core::prelude::*;
//!
//! let sink = LogSink::new(config)?
//!     .with_store(Box::new(MemoryStore::new()))
//!     .with_debug(true);
//!
//! let ok = sink.save(&batch, true, Some(&request), &counters);
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::batch::LogBatch;
use crate::config::{KeyValueConfig, SinkConfig, DB_CONNECT_KEY};
use crate::destination::{enforce_retention, resolve_isolated, resolve_master, Destination, RetentionOutcome};
use crate::error::{IoResultExt, SinkResult};
use crate::format::format_timestamp;
use crate::logging::log_write_failure;
use crate::metrics::{inject, RuntimeCounters};
use crate::persist::{maybe_persist, PersistOutcome, RecordStore, RequestContext, DEFAULT_CONNECTION};
use crate::rotation::{check_and_rotate, RotationOutcome};
use crate::router::route;

/// Everything one `save` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub persistence: PersistOutcome,
    pub retention: RetentionOutcome,
    /// Master file, `None` when every category was isolated.
    pub master: Option<Destination>,
    /// Isolated files written successfully.
    pub isolated: Vec<Destination>,
    /// Isolated files whose append failed, with the error.
    pub isolated_failures: Vec<(Destination, String)>,
    /// Rotation checks in write order: isolated files first, master last.
    pub rotations: Vec<RotationOutcome>,
    pub bytes_written: u64,
}

/// Rotating file sink with optional slow-query persistence.
pub struct LogSink {
    config: SinkConfig,
    store: Option<Box<dyn RecordStore>>,
    connection: String,
    debug: bool,
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("connection", &self.connection)
            .field("debug", &self.debug)
            .finish()
    }
}

impl LogSink {
    /// Creates a sink from `config`, resolving defaults.
    pub fn new(config: SinkConfig) -> SinkResult<Self> {
        let config = config.resolve()?;
        let connection = config
            .db_connect
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONNECTION.to_string());
        Ok(Self {
            config,
            store: None,
            connection,
            debug: false,
        })
    }

    /// Attaches the store slow queries are persisted to.
    pub fn with_store(mut self, store: Box<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Reads `log.db_connect` from host settings unless `db_connect` was set.
    pub fn with_host_config(mut self, host: &dyn KeyValueConfig) -> Self {
        let explicit = self.config.db_connect.as_deref().is_some_and(|c| !c.is_empty());
        if !explicit {
            if let Some(connection) = host.get(DB_CONNECT_KEY).filter(|c| !c.is_empty()) {
                self.connection = connection;
            }
        }
        self
    }

    /// Enables debug metrics injection.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Store connection name used for persistence.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Writes `batch`, returning `false` only when the directory or the master
    /// file could not be written.
    pub fn save(
        &self,
        batch: &LogBatch,
        append: bool,
        request: Option<&RequestContext>,
        counters: &RuntimeCounters,
    ) -> bool {
        self.save_at(batch, append, request, counters, Local::now())
    }

    /// [`save`](Self::save) with a caller-supplied clock.
    pub fn save_at(
        &self,
        batch: &LogBatch,
        append: bool,
        request: Option<&RequestContext>,
        counters: &RuntimeCounters,
        now: DateTime<Local>,
    ) -> bool {
        self.try_save(batch, append, request, counters, now).is_ok()
    }

    /// Runs the full save and reports every step.
    ///
    /// Persistence, rotation, retention and isolated-file failures are
    /// recorded in the report. Only directory creation and the master append
    /// return an error.
    pub fn try_save(
        &self,
        batch: &LogBatch,
        append: bool,
        request: Option<&RequestContext>,
        counters: &RuntimeCounters,
        now: DateTime<Local>,
    ) -> SinkResult<SaveReport> {
        let persistence = maybe_persist(
            batch,
            request,
            &self.config,
            self.store.as_deref(),
            &self.connection,
            &now,
        );

        let retention = enforce_retention(&self.config);

        let master = resolve_master(&self.config, &now);
        let dir = master.dir().to_path_buf();
        fs::create_dir_all(&dir).with_path(&dir)?;

        let timestamp = format_timestamp(&now, &self.config);
        let routed = route(batch, &self.config, &timestamp)?;
        let master_lines = routed.has_master().then(|| routed.master_lines());
        let clock = SystemTime::from(now);

        let mut report = SaveReport {
            persistence,
            retention,
            master: None,
            isolated: Vec::with_capacity(routed.isolated.len()),
            isolated_failures: Vec::new(),
            rotations: Vec::new(),
            bytes_written: 0,
        };

        // Isolated writes are best-effort; only the master append fails the save.
        for entry in routed.isolated {
            let dest = resolve_isolated(&self.config, &dir, &entry.category, &now);
            report
                .rotations
                .push(check_and_rotate(&dest.path, self.config.file_size, &now));

            let mut lines = entry.lines;
            let written = inject(&mut lines, self.debug, append, true, counters, &self.config, clock)
                .and_then(|()| append_lines(&dest.path, &lines));
            match written {
                Ok(bytes) => {
                    report.bytes_written += bytes;
                    report.isolated.push(dest);
                }
                Err(e) => report.isolated_failures.push((dest, e.to_string())),
            }
        }

        if let Some(mut lines) = master_lines {
            report
                .rotations
                .push(check_and_rotate(&master.path, self.config.file_size, &now));

            inject(&mut lines, self.debug, append, false, counters, &self.config, clock)?;
            report.bytes_written += append_lines(&master.path, &lines)?;
            report.master = Some(master);
        }

        Ok(report)
    }
}

/// Appends `lines` to `path` with a single write, one line per record.
fn append_lines(path: &Path, lines: &[String]) -> SinkResult<u64> {
    let mut payload = lines.join("\n");
    payload.push('\n');

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(payload.as_bytes()));

    if let Err(e) = result {
        log_write_failure(&path.display().to_string(), &e.to_string());
        return Err(e).with_path(path);
    }
    Ok(payload.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SingleFile;
    use std::collections::HashMap;

    #[test]
    fn test_connection_defaults() {
        let sink = LogSink::new(SinkConfig::default()).unwrap();
        assert_eq!(sink.connection(), "default");
    }

    #[test]
    fn test_connection_from_host_config() {
        let mut host = HashMap::new();
        host.insert("log.db_connect".to_string(), "mongodb".to_string());

        let sink = LogSink::new(SinkConfig::default())
            .unwrap()
            .with_host_config(&host);
        assert_eq!(sink.connection(), "mongodb");
    }

    #[test]
    fn test_explicit_connection_wins() {
        let mut host = HashMap::new();
        host.insert("log.db_connect".to_string(), "mongodb".to_string());

        let cfg = SinkConfig {
            db_connect: Some("archive".to_string()),
            ..SinkConfig::default()
        };
        let sink = LogSink::new(cfg).unwrap().with_host_config(&host);
        assert_eq!(sink.connection(), "archive");
    }

    #[test]
    fn test_new_resolves_config() {
        let cfg = SinkConfig {
            format: String::new(),
            single: SingleFile::Default,
            ..SinkConfig::default()
        };
        let sink = LogSink::new(cfg).unwrap();
        assert_eq!(sink.config().format, "[%s][%s] %s");
        assert!(sink.config().path.ends_with(std::path::MAIN_SEPARATOR));
    }

    #[test]
    fn test_append_lines_trailing_newline() {
        let dir = std::env::temp_dir().join(format!("logsink_append_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("a.log");
        let _ = fs::remove_file(&path);

        let n = append_lines(&path, &["one".to_string(), "two".to_string()]).unwrap();
        append_lines(&path, &["three".to_string()]).unwrap();

        assert_eq!(n, 8);
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\nthree\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
