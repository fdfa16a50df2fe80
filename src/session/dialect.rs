//! Dialect descriptor.
//!
//! Static per-dialect facts consulted by the predicate compiler, the schema
//! synchronizer, and the migration engine: bind-parameter placeholders,
//! LIMIT/OFFSET shapes, column type mapping, existence-check query
//! templates, and default ports. The dialect is fixed at provider
//! construction and never changes for the lifetime of a session.

use crate::schema::{FieldDescriptor, FieldType};
use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

/// The target SQL engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// SQLite.
    Sqlite,
    /// MySQL.
    Mysql,
    /// PostgreSQL.
    Postgres,
}

impl Dialect {
    /// Short lowercase name, for logs and diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
        }
    }

    /// Default server port; `None` for file-backed SQLite.
    #[must_use]
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Mysql => Some(3306),
            Self::Postgres => Some(5432),
        }
    }

    /// Renders the bind-parameter placeholder at the given 1-based index.
    ///
    /// SQLite and MySQL use positional `?`; PostgreSQL uses numbered `$n`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite | Self::Mysql => "?".to_string(),
            Self::Postgres => format!("${index}"),
        }
    }

    /// Maps a field descriptor onto this dialect's column type.
    ///
    /// MySQL cannot key an unbounded TEXT column, so primary-key text
    /// fields become `VARCHAR(255)` there.
    #[must_use]
    pub const fn column_type(self, field: &FieldDescriptor) -> &'static str {
        match self {
            Self::Sqlite => match field.field_type {
                FieldType::Text | FieldType::Uuid => "TEXT",
                FieldType::Integer
                | FieldType::Long
                | FieldType::Boolean
                | FieldType::Timestamp => "INTEGER",
            },
            Self::Mysql => match field.field_type {
                FieldType::Text => {
                    if field.primary_key {
                        "VARCHAR(255)"
                    } else {
                        "TEXT"
                    }
                },
                FieldType::Uuid => "CHAR(36)",
                FieldType::Integer => "INT",
                FieldType::Long => "BIGINT",
                FieldType::Boolean => "BOOLEAN",
                FieldType::Timestamp => "DATETIME(3)",
            },
            Self::Postgres => match field.field_type {
                FieldType::Text => "TEXT",
                FieldType::Uuid => "UUID",
                FieldType::Integer => "INTEGER",
                FieldType::Long => "BIGINT",
                FieldType::Boolean => "BOOLEAN",
                FieldType::Timestamp => "TIMESTAMPTZ",
            },
        }
    }

    /// DDL for adding a column.
    ///
    /// The text is identical across all three dialects today; it stays
    /// dialect-dispatched so future divergence has a single seam.
    #[must_use]
    pub fn add_column_sql(self, table: &str, field: &FieldDescriptor) -> String {
        let column_type = self.column_type(field);
        match self {
            Self::Sqlite | Self::Mysql | Self::Postgres => {
                format!("ALTER TABLE {table} ADD COLUMN {} {column_type}", field.name)
            },
        }
    }

    /// Renders the LIMIT/OFFSET clause (leading space included when
    /// non-empty).
    ///
    /// Skip-without-limit differs per engine: SQLite accepts `LIMIT -1`,
    /// MySQL requires an explicit huge limit before OFFSET, PostgreSQL
    /// accepts a bare OFFSET.
    #[must_use]
    pub fn limit_clause(self, limit: Option<u64>, skip: Option<u64>) -> String {
        match (limit, skip) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (Some(limit), Some(skip)) => format!(" LIMIT {limit} OFFSET {skip}"),
            (None, Some(skip)) => match self {
                Self::Sqlite => format!(" LIMIT -1 OFFSET {skip}"),
                Self::Mysql => format!(" LIMIT 18446744073709551615 OFFSET {skip}"),
                Self::Postgres => format!(" OFFSET {skip}"),
            },
        }
    }

    /// Catalog query template for "does this table exist".
    ///
    /// Returns the SQL and its parameters; a non-empty result set means the
    /// table exists.
    #[must_use]
    pub fn table_exists_query(self, table: &str) -> (String, Vec<SqlValue>) {
        match self {
            Self::Sqlite => (
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?".to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
            Self::Mysql => (
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?"
                    .to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
            Self::Postgres => (
                "SELECT tablename FROM pg_tables WHERE tablename = $1".to_string(),
                vec![SqlValue::Text(table.to_string())],
            ),
        }
    }

    /// Catalog query template for "does this column exist".
    ///
    /// SQLite has no parameterizable catalog for columns; callers scan the
    /// `name` column of `PRAGMA table_info` output. The other dialects
    /// return a row iff the column exists.
    #[must_use]
    pub fn column_exists_query(self, table: &str, column: &str) -> (String, Vec<SqlValue>) {
        match self {
            Self::Sqlite => (format!("PRAGMA table_info({table})"), Vec::new()),
            Self::Mysql => (
                "SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?"
                    .to_string(),
                vec![
                    SqlValue::Text(table.to_string()),
                    SqlValue::Text(column.to_string()),
                ],
            ),
            Self::Postgres => (
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_name = $1 AND column_name = $2"
                    .to_string(),
                vec![
                    SqlValue::Text(table.to_string()),
                    SqlValue::Text(column.to_string()),
                ],
            ),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_field(primary_key: bool) -> FieldDescriptor {
        FieldDescriptor {
            name: "name".to_string(),
            field_type: FieldType::Text,
            primary_key,
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(7), "$7");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Dialect::Sqlite.default_port(), None);
        assert_eq!(Dialect::Mysql.default_port(), Some(3306));
        assert_eq!(Dialect::Postgres.default_port(), Some(5432));
    }

    #[test]
    fn test_column_types() {
        let uuid_pk = FieldDescriptor {
            name: "uuid".to_string(),
            field_type: FieldType::Uuid,
            primary_key: true,
        };
        assert_eq!(Dialect::Sqlite.column_type(&uuid_pk), "TEXT");
        assert_eq!(Dialect::Mysql.column_type(&uuid_pk), "CHAR(36)");
        assert_eq!(Dialect::Postgres.column_type(&uuid_pk), "UUID");

        // MySQL cannot key an unbounded TEXT column.
        assert_eq!(Dialect::Mysql.column_type(&text_field(true)), "VARCHAR(255)");
        assert_eq!(Dialect::Mysql.column_type(&text_field(false)), "TEXT");
    }

    #[test]
    fn test_add_column_sql_is_dialect_dispatched() {
        let field = FieldDescriptor {
            name: "age".to_string(),
            field_type: FieldType::Integer,
            primary_key: false,
        };
        assert_eq!(
            Dialect::Sqlite.add_column_sql("accounts", &field),
            "ALTER TABLE accounts ADD COLUMN age INTEGER"
        );
        assert_eq!(
            Dialect::Mysql.add_column_sql("accounts", &field),
            "ALTER TABLE accounts ADD COLUMN age INT"
        );
        assert_eq!(
            Dialect::Postgres.add_column_sql("accounts", &field),
            "ALTER TABLE accounts ADD COLUMN age INTEGER"
        );
    }

    #[test]
    fn test_limit_clause_shapes() {
        assert_eq!(Dialect::Sqlite.limit_clause(None, None), "");
        assert_eq!(Dialect::Sqlite.limit_clause(Some(5), None), " LIMIT 5");
        assert_eq!(
            Dialect::Sqlite.limit_clause(Some(5), Some(10)),
            " LIMIT 5 OFFSET 10"
        );
        // Skip without limit is the divergent case.
        assert_eq!(Dialect::Sqlite.limit_clause(None, Some(10)), " LIMIT -1 OFFSET 10");
        assert_eq!(
            Dialect::Mysql.limit_clause(None, Some(10)),
            " LIMIT 18446744073709551615 OFFSET 10"
        );
        assert_eq!(Dialect::Postgres.limit_clause(None, Some(10)), " OFFSET 10");
    }

    #[test]
    fn test_existence_query_templates() {
        let (sql, params) = Dialect::Sqlite.table_exists_query("accounts");
        assert!(sql.contains("sqlite_master"));
        assert_eq!(params.len(), 1);

        let (sql, params) = Dialect::Sqlite.column_exists_query("accounts", "name");
        assert_eq!(sql, "PRAGMA table_info(accounts)");
        assert!(params.is_empty());

        let (sql, _) = Dialect::Mysql.table_exists_query("accounts");
        assert!(sql.contains("INFORMATION_SCHEMA.TABLES"));
        let (sql, params) = Dialect::Mysql.column_exists_query("accounts", "name");
        assert!(sql.contains("INFORMATION_SCHEMA.COLUMNS"));
        assert_eq!(params.len(), 2);

        let (sql, _) = Dialect::Postgres.table_exists_query("accounts");
        assert!(sql.contains("pg_tables"));
        assert!(sql.contains("$1"));
        let (sql, _) = Dialect::Postgres.column_exists_query("accounts", "name");
        assert!(sql.contains("information_schema.columns"));
        assert!(sql.contains("$2"));
    }
}
