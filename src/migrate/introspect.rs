//! Schema introspection utilities.
//!
//! Dialect-portable existence checks consumed by the migration engine and
//! the DDL synchronizer. The catalog query for the session's dialect is
//! attempted first; if it fails, a raw probe query against the target
//! object is the fallback. On any error the answer is "does not exist" —
//! migrations treat absence as the safe default.

use crate::session::Session;
use crate::value::SqlValue;
use crate::Dialect;

/// Checks whether a table exists.
///
/// Never errors: a failed check reports `false`.
#[must_use]
pub fn table_exists(session: &Session, table: &str) -> bool {
    let (sql, params) = session.dialect().table_exists_query(table);
    match session.query(&sql, &params) {
        Ok(rows) => !rows.is_empty(),
        Err(e) => {
            tracing::warn!(table, error = %e, "catalog table check failed, probing directly");
            session
                .query(&format!("SELECT * FROM {table} LIMIT 1"), &[])
                .is_ok()
        },
    }
}

/// Checks whether a column exists in a table.
///
/// SQLite's catalog is `PRAGMA table_info`, whose rows are scanned for a
/// matching `name`; MySQL and PostgreSQL answer through their
/// `information_schema` views. Never errors: a failed check reports
/// `false`.
#[must_use]
pub fn column_exists(session: &Session, table: &str, column: &str) -> bool {
    let (sql, params) = session.dialect().column_exists_query(table, column);
    match session.query(&sql, &params) {
        Ok(rows) => match session.dialect() {
            Dialect::Sqlite => rows.iter().any(|row| {
                row.get("name") == Some(&SqlValue::Text(column.to_string()))
            }),
            Dialect::Mysql | Dialect::Postgres => !rows.is_empty(),
        },
        Err(e) => {
            tracing::warn!(table, column, error = %e, "catalog column check failed, probing directly");
            session
                .query(&format!("SELECT {column} FROM {table} LIMIT 1"), &[])
                .is_ok()
        },
    }
}

#[cfg(test)]
#[cfg(feature = "sqlite")]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::session::SessionManager;
    use std::sync::Arc;

    fn session() -> Arc<Session> {
        SessionManager::new(ConnectionConfig::sqlite_in_memory())
            .session()
            .unwrap()
    }

    #[test]
    fn test_table_exists() {
        let session = session();
        assert!(!table_exists(&session, "accounts"));

        session
            .execute("CREATE TABLE accounts (uuid TEXT PRIMARY KEY)", &[])
            .unwrap();
        assert!(table_exists(&session, "accounts"));
    }

    #[test]
    fn test_column_exists() {
        let session = session();
        session
            .execute("CREATE TABLE accounts (uuid TEXT PRIMARY KEY, name TEXT)", &[])
            .unwrap();

        assert!(column_exists(&session, "accounts", "uuid"));
        assert!(column_exists(&session, "accounts", "name"));
        assert!(!column_exists(&session, "accounts", "age"));
        assert!(!column_exists(&session, "missing", "name"));
    }
}
