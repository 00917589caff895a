//! logsink-core: rotating file log sink with slow-query persistence
//!
//! A host hands the sink one batch of categorized log entries per unit of
//! work. The sink formats them, routes each category to the shared master file
//! or its own isolated file, rotates files that grew past the size threshold,
//! and mirrors slow SQL statements to a record store.
//!
//! # Features
//!
//! - **Date-driven layout**: `YYYYMM/DD.log`, `YYYYMMDD.log`, or a single fixed file
//! - **Size rotation**: oversized files become `{unix_timestamp}-{name}` backups
//! - **Retention**: keep at most `max_files` log files in the base directory
//! - **Plain or JSON records**: `[%s][%s] %s` templates or `{time, type, msg}` objects
//! - **Category isolation**: chosen categories get their own files
//! - **Debug metrics**: runtime, throughput, memory and loaded units per request
//! - **Slow-query persistence**: statements over `slow_sql_time` go to a [`RecordStore`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use logsink_core::prelude::*;
//!
//! let sink = LogSink::new(load_config(Path::new("log.toml"))?)?
//!     .with_store(Box::new(MemoryStore::new()));
//!
//! let batch = LogBatch::new()
//!     .with("info", "request started")
//!     .with("sql", "[ SQL ] SELECT * FROM users [ RunTime:1.250000s ]");
//!
//! sink.save(&batch, true, Some(&request), &RuntimeCounters::new(start));
//! ```
//!
//! # Module Organization
//!
//! - [`sink`]: the `save` entry point and its report
//! - [`destination`]: file naming and retention
//! - [`rotation`]: size-based rotation
//! - [`format`]: plain and JSON record formatting
//! - [`router`]: master/isolated split
//! - [`metrics`]: debug metrics header
//! - [`slow`]: slow SQL extraction
//! - [`persist`]: store adapter and record shape
//! - [`config`]: configuration and host settings
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `sqlite`: SQLite-backed record store
//! - `full`: enable all optional features

pub mod batch;
pub mod config;
pub mod destination;
pub mod error;
pub mod format;
pub mod logging;
pub mod metrics;
pub mod persist;
pub mod prelude;
pub mod rotation;
pub mod router;
pub mod sink;
pub mod slow;

#[cfg(feature = "sqlite")]
pub mod sqlite;

// ============================================================================
// Explicit Re-exports
// ============================================================================

// Error types
pub use error::{IoResultExt, SinkError, SinkResult};

// Batches
pub use batch::{LogBatch, LogValue, ERROR_CATEGORY, SQL_CATEGORY};

// Configuration
pub use config::{
    load_config, Isolation, JsonOptions, KeyValueConfig, SingleFile, SinkConfig,
    DB_CONNECT_KEY, DEFAULT_FILE_SIZE, DEFAULT_FORMAT, DEFAULT_PATH, DEFAULT_TIME_FORMAT,
};

// Destinations and rotation
pub use destination::{
    enforce_retention, list_log_files, resolve_isolated, resolve_master,
    Destination, RetentionOutcome,
};
pub use rotation::{backup_path, check_and_rotate, RotationOutcome};

// Formatting and routing
pub use format::{apply_template, encode_json, format_messages, format_timestamp, JsonRecord};
pub use router::{route, RoutedBatch, RoutedCategory};

// Logging
pub use logging::{init_structured_logging, log_swallowed, log_write_failure};

// Metrics
pub use metrics::{inject, number_format, DebugMetrics, RuntimeCounters};

// Slow queries and persistence
pub use persist::{
    maybe_persist, MemoryStore, PersistOutcome, PersistedLogEntry, RecordEncoding,
    RecordStore, RequestContext, RequestParams, SkipReason, StoreRecord, StoredRecord,
    DEFAULT_CONNECTION, DOCUMENT_CONNECTION,
};
pub use slow::{extract_slow_records, parse_runtime_ms, SlowQueryScan, SlowRecord};

// Sink
pub use sink::{LogSink, SaveReport};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
