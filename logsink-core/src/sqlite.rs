//! Relational record store backed by SQLite (`sqlite` feature).
//!
//! The target table is created on first insert with one untyped column per
//! record field, plus an `id` primary key.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;

use crate::error::{SinkError, SinkResult};
use crate::persist::{RecordStore, StoreRecord};

/// SQLite-backed [`RecordStore`].
///
/// A single database file serves every connection name.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SinkError::store(path.display().to_string(), e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SinkError::store(":memory:", e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> SinkResult<usize> {
        check_identifier(table)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))
            .map_err(|e| SinkError::store(table, e.to_string()))?;
        Ok(n as usize)
    }

    /// Value of `column` in every row of `table`, oldest first.
    pub fn column(&self, table: &str, column: &str) -> SinkResult<Vec<SqlValue>> {
        check_identifier(table)?;
        check_identifier(column)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn
            .prepare(&format!("SELECT \"{}\" FROM \"{}\" ORDER BY id", column, table))
            .map_err(|e| SinkError::store(table, e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, SqlValue>(0))
            .map_err(|e| SinkError::store(table, e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SinkError::store(table, e.to_string()))?;
        Ok(rows)
    }
}

/// Table and column names are interpolated, so only `[A-Za-z0-9_]` is allowed.
fn check_identifier(name: &str) -> SinkResult<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidArgument {
            message: format!("invalid SQL identifier: {:?}", name),
        })
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, table: &str, record: &StoreRecord, _connection: &str) -> SinkResult<()> {
        check_identifier(table)?;
        for column in record.keys() {
            check_identifier(column)?;
        }

        let columns: Vec<String> = record.keys().map(|k| format!("\"{}\"", k)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let values: Vec<SqlValue> = record.values().map(to_sql_value).collect();

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (id INTEGER PRIMARY KEY AUTOINCREMENT, {})",
                table,
                columns.join(", ")
            ),
            [],
        )
        .map_err(|e| SinkError::store(table, e.to_string()))?;

        conn.execute(
            &format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values),
        )
        .map_err(|e| SinkError::store(table, e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(runtime: f64) -> StoreRecord {
        match json!({
            "year": "2024",
            "create_time": 1_709_648_116,
            "runtime": runtime,
            "sql_list": "[]",
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_insert_creates_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("sys_log", &record(120.0), "default").unwrap();
        store.insert("sys_log", &record(340.5), "default").unwrap();

        assert_eq!(store.count("sys_log").unwrap(), 2);
        assert_eq!(
            store.column("sys_log", "runtime").unwrap(),
            vec![SqlValue::Real(120.0), SqlValue::Real(340.5)]
        );
        assert_eq!(
            store.column("sys_log", "create_time").unwrap()[0],
            SqlValue::Integer(1_709_648_116)
        );
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.insert("log; DROP TABLE x", &record(1.0), "default").unwrap_err();
        assert!(matches!(err, SinkError::InvalidArgument { .. }));
    }
}
