//! Slow-query persistence to an external record store.
//!
//! Persistence is best-effort. Every path through [`maybe_persist`] ends in a
//! [`PersistOutcome`]; store failures are reported there and never raised, so
//! they cannot stop the file writes that follow.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::batch::{LogBatch, ERROR_CATEGORY, SQL_CATEGORY};
use crate::config::SinkConfig;
use crate::error::{SinkError, SinkResult};
use crate::slow::{extract_slow_records, SlowRecord};

/// Connection used when nothing else is configured.
pub const DEFAULT_CONNECTION: &str = "default";

/// Connection name that denotes a document store.
pub const DOCUMENT_CONNECTION: &str = "mongodb";

/// A record as handed to the store: column/field name to value.
pub type StoreRecord = Map<String, Value>;

/// Insert-only access to a table or collection.
pub trait RecordStore: Send + Sync {
    /// Inserts `record` into `table` over `connection`.
    fn insert(&self, table: &str, record: &StoreRecord, connection: &str) -> SinkResult<()>;
}

/// What the host knows about the request being served.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip: String,
    pub method: String,
    pub host: String,
    pub url: String,
    pub app: String,
    pub controller: String,
    pub action: String,
    /// Query-string parameters.
    pub get: Map<String, Value>,
    /// Body parameters.
    pub post: Map<String, Value>,
}

impl RequestContext {
    /// `{app}/{controller}/{action}`, as matched against `action_filters`.
    pub fn route(&self) -> String {
        format!("{}/{}/{}", self.app, self.controller, self.action)
    }
}

/// How nested fields are handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEncoding {
    /// Nested values stay structured (document stores).
    Native,
    /// Nested values are JSON-encoded strings (relational stores).
    Text,
}

impl RecordEncoding {
    pub fn for_connection(connection: &str) -> Self {
        if connection == DOCUMENT_CONNECTION {
            Self::Native
        } else {
            Self::Text
        }
    }
}

/// Request parameters and raw entries stored alongside the slow queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    pub get: Map<String, Value>,
    pub post: Map<String, Value>,
    pub sql: Vec<String>,
    pub error: Vec<String>,
}

/// One persisted row/document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedLogEntry {
    pub year: String,
    pub month: String,
    pub day: String,
    pub ip: String,
    pub method: String,
    pub host: String,
    pub url: String,
    pub app: String,
    pub controller: String,
    pub action: String,
    /// Unix seconds.
    pub create_time: i64,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub create_date: String,
    /// Slowest statement, in milliseconds.
    pub runtime: f64,
    pub sql_list: Vec<SlowRecord>,
    pub param: RequestParams,
}

impl PersistedLogEntry {
    pub fn new(
        request: &RequestContext,
        sql_list: Vec<SlowRecord>,
        runtime: f64,
        batch: &LogBatch,
        now: &DateTime<Local>,
    ) -> Self {
        Self {
            year: now.format("%Y").to_string(),
            month: now.format("%m").to_string(),
            day: now.format("%d").to_string(),
            ip: request.ip.clone(),
            method: request.method.clone(),
            host: request.host.clone(),
            url: request.url.clone(),
            app: request.app.clone(),
            controller: request.controller.clone(),
            action: request.action.clone(),
            create_time: now.timestamp(),
            create_date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            runtime,
            sql_list,
            param: RequestParams {
                get: request.get.clone(),
                post: request.post.clone(),
                sql: batch.texts(SQL_CATEGORY),
                error: batch.texts(ERROR_CATEGORY),
            },
        }
    }

    /// Flattens the entry into a store record.
    pub fn to_record(&self, encoding: RecordEncoding) -> SinkResult<StoreRecord> {
        let mut record = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(SinkError::encode("log entry did not serialize to an object")),
        };

        if encoding == RecordEncoding::Text {
            for key in ["sql_list", "param"] {
                if let Some(value) = record.get_mut(key) {
                    let encoded = serde_json::to_string(&*value)?;
                    *value = Value::String(encoded);
                }
            }
        }
        Ok(record)
    }
}

/// Why nothing was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No store attached to the sink.
    NoStore,
    /// Not serving a request.
    NoRequest,
    /// No SQL or error entries and no request parameters.
    NothingToRecord,
    /// The request route is in `action_filters`.
    FilteredAction(String),
    /// No statement reached the slow threshold.
    NoSlowQueries,
}

/// Result of a persistence attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Skipped(SkipReason),
    Stored {
        table: String,
        connection: String,
        records: usize,
        max_runtime: f64,
    },
    /// The store rejected the insert; logging carries on.
    Failed { table: String, error: String },
}

impl PersistOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }

    /// Whether the store was called at all.
    pub fn attempted(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

/// Forwards the batch's slow queries to `store` when the request warrants it.
pub fn maybe_persist(
    batch: &LogBatch,
    request: Option<&RequestContext>,
    config: &SinkConfig,
    store: Option<&dyn RecordStore>,
    connection: &str,
    now: &DateTime<Local>,
) -> PersistOutcome {
    let Some(store) = store else {
        return PersistOutcome::Skipped(SkipReason::NoStore);
    };
    let Some(request) = request else {
        return PersistOutcome::Skipped(SkipReason::NoRequest);
    };

    if !batch.contains(SQL_CATEGORY)
        && !batch.contains(ERROR_CATEGORY)
        && request.get.is_empty()
        && request.post.is_empty()
    {
        return PersistOutcome::Skipped(SkipReason::NothingToRecord);
    }

    let route = request.route();
    if config.is_filtered_action(&route) {
        return PersistOutcome::Skipped(SkipReason::FilteredAction(route));
    }

    let scan = extract_slow_records(&batch.texts(SQL_CATEGORY), config.slow_sql_time);
    // Error-only batches stop here too: without a slow query there is no row.
    if !scan.has_slow() {
        return PersistOutcome::Skipped(SkipReason::NoSlowQueries);
    }

    let records = scan.records.len();
    let max_runtime = scan.max_runtime;
    let entry = PersistedLogEntry::new(request, scan.records, max_runtime, batch, now);
    let table = config.db_table.clone();

    let result = entry
        .to_record(RecordEncoding::for_connection(connection))
        .and_then(|record| store.insert(&table, &record, connection));

    match result {
        Ok(()) => {
            tracing::debug!(
                table = %table,
                connection = %connection,
                records = records,
                max_runtime = max_runtime,
                "persisted slow queries"
            );
            PersistOutcome::Stored {
                table,
                connection: connection.to_string(),
                records,
                max_runtime,
            }
        }
        Err(e) => {
            crate::logging::log_swallowed("persist", &e.to_string());
            PersistOutcome::Failed {
                table,
                error: e.to_string(),
            }
        }
    }
}

/// One insert captured by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub table: String,
    pub connection: String,
    pub record: StoreRecord,
}

/// In-process store that keeps every insert in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<StoredRecord>>,
    fail_with: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every insert with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    /// Snapshot of everything inserted so far.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, table: &str, record: &StoreRecord, connection: &str) -> SinkResult<()> {
        if let Some(message) = &self.fail_with {
            return Err(SinkError::store(table, message.clone()));
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredRecord {
                table: table.to_string(),
                connection: connection.to_string(),
                record: record.clone(),
            });
        Ok(())
    }
}

/// Shared stores can be attached to several sinks.
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    fn insert(&self, table: &str, record: &StoreRecord, connection: &str) -> SinkResult<()> {
        (**self).insert(table, record, connection)
    }
}
