//! SQLite backend (rusqlite, bundled).

use crate::config::ConnectionConfig;
use crate::session::backend::{Row, SqlBackend};
use crate::value::SqlValue;
use crate::{Dialect, Error, Result};
use rusqlite::Connection;
use rusqlite::types::ValueRef;

/// SQLite-backed [`SqlBackend`].
///
/// # Concurrency Model
///
/// The connection itself is not `Sync`; the owning session serializes
/// statements through its mutex. SQLite's WAL mode and `busy_timeout`
/// pragma mitigate contention at the engine level:
///
/// - **WAL mode**: Allows concurrent readers with a single writer
/// - **`busy_timeout`**: Waits up to 5 seconds for locks instead of failing immediately
/// - **NORMAL synchronous**: Balances durability with performance
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens the database described by `config` and applies the one-time
    /// pragma tuning.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        }
        .map_err(|e| Error::OperationFailed {
            operation: "open_sqlite".to_string(),
            cause: e.to_string(),
        })?;

        configure_connection(&conn);
        Ok(Self { conn })
    }
}

/// Applies the pragma tuning for performance and concurrency.
///
/// Issued immediately after connecting, while the connection is still in
/// its initial autocommit mode, and exactly once per physical session:
///
/// - **WAL mode**: journal `journal_mode` returns a string like "wal" which
///   would fail a plain execute, so `pragma_update` results are ignored
///   (in-memory databases report "memory" and that is fine)
/// - **NORMAL synchronous**
/// - **`busy_timeout`**: 5 seconds, to handle lock contention gracefully
pub fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

fn to_sqlite(value: &SqlValue) -> rusqlite::types::Value {
    use rusqlite::types::Value as V;
    match value {
        SqlValue::Null => V::Null,
        SqlValue::Text(s) => V::Text(s.clone()),
        SqlValue::Uuid(u) => V::Text(u.to_string()),
        SqlValue::Integer(i) => V::Integer(i64::from(*i)),
        SqlValue::BigInt(i) => V::Integer(*i),
        SqlValue::Real(f) => V::Real(*f),
        SqlValue::Boolean(b) => V::Integer(i64::from(*b)),
        SqlValue::Timestamp(ts) => V::Integer(ts.timestamp_millis()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::BigInt(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Text(String::from_utf8_lossy(b).into_owned()),
    }
}

fn operation_error(operation: &str, e: &rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl SqlBackend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite).collect();
        self.conn
            .execute(sql, rusqlite::params_from_iter(bound))
            .map(|n| n as u64)
            .map_err(|e| operation_error("sqlite_execute", &e))
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| operation_error("sqlite_prepare", &e))?;

        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();
        let column_count = columns.len();

        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_sqlite).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound))
            .map_err(|e| operation_error("sqlite_query", &e))?;

        let mut out = Vec::new();
        loop {
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(operation_error("sqlite_query", &e)),
            };
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row
                    .get_ref(i)
                    .map_err(|e| operation_error("sqlite_query", &e))?;
                values.push(from_sqlite(value));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| Error::Transaction {
                operation: "begin".to_string(),
                cause: e.to_string(),
            })
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| Error::Transaction {
                operation: "commit".to_string(),
                cause: e.to_string(),
            })
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| Error::Transaction {
                operation: "rollback".to_string(),
                cause: e.to_string(),
            })
    }
}
