//! PostgreSQL backend (blocking client).

use crate::config::ConnectionConfig;
use crate::session::backend::{Row, SqlBackend};
use crate::value::SqlValue;
use crate::{Dialect, Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};

/// PostgreSQL-backed [`SqlBackend`].
///
/// Uses the blocking `postgres` client: the session model is synchronous
/// with a single shared connection, so an async pool would be dead weight
/// here. UUID and timestamp parameters bind natively.
pub struct PostgresBackend {
    client: Client,
}

impl PostgresBackend {
    /// Connects to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let mut pg = postgres::Config::new();
        pg.host(config.host.as_deref().unwrap_or("localhost"));
        pg.port(config.effective_port().unwrap_or(5432));
        pg.dbname(&config.database);
        if let Some(user) = &config.user {
            pg.user(user);
        }
        if let Some(password) = &config.password {
            pg.password(password);
        }

        let client = pg.connect(NoTls).map_err(|e| Error::OperationFailed {
            operation: "open_postgres".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self { client })
    }
}

fn to_postgres(value: &SqlValue) -> Box<dyn ToSql + Sync> {
    match value {
        // Statement builders render NULL inline; this arm is defensive.
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Integer(i) => Box::new(*i),
        SqlValue::BigInt(i) => Box::new(*i),
        SqlValue::Real(f) => Box::new(*f),
        SqlValue::Boolean(b) => Box::new(*b),
        SqlValue::Timestamp(ts) => Box::new(*ts),
    }
}

fn read_column(row: &postgres::Row, index: usize) -> Result<SqlValue> {
    let column = &row.columns()[index];
    let unsupported = || Error::OperationFailed {
        operation: "postgres_query".to_string(),
        cause: format!(
            "unsupported column type '{}' for column '{}'",
            column.type_(),
            column.name()
        ),
    };
    let read_error = |e: postgres::Error| Error::OperationFailed {
        operation: "postgres_query".to_string(),
        cause: e.to_string(),
    };

    let ty = column.type_();
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Boolean)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, |i| SqlValue::Integer(i32::from(i)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Integer)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::BigInt)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, |f| SqlValue::Real(f64::from(f)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Real)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        row.try_get::<_, Option<String>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Text)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Uuid)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, SqlValue::Timestamp)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(index)
            .map_err(read_error)?
            .map_or(SqlValue::Null, |ts| SqlValue::Timestamp(ts.and_utc()))
    } else {
        return Err(unsupported());
    };
    Ok(value)
}

fn operation_error(operation: &str, e: &postgres::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl SqlBackend for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let owned: Vec<Box<dyn ToSql + Sync>> = params.iter().map(to_postgres).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = owned.iter().map(AsRef::as_ref).collect();
        self.client
            .execute(sql, &refs)
            .map_err(|e| operation_error("postgres_execute", &e))
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let owned: Vec<Box<dyn ToSql + Sync>> = params.iter().map(to_postgres).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = owned.iter().map(AsRef::as_ref).collect();
        let rows = self
            .client
            .query(sql, &refs)
            .map_err(|e| operation_error("postgres_query", &e))?;

        let mut out = Vec::new();
        for row in rows {
            let columns: Vec<String> = row
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(read_column(&row, i)?);
            }
            out.push(Row::new(columns, values));
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<()> {
        self.client
            .batch_execute("BEGIN")
            .map_err(|e| Error::Transaction {
                operation: "begin".to_string(),
                cause: e.to_string(),
            })
    }

    fn commit(&mut self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .map_err(|e| Error::Transaction {
                operation: "commit".to_string(),
                cause: e.to_string(),
            })
    }

    fn rollback(&mut self) -> Result<()> {
        self.client
            .batch_execute("ROLLBACK")
            .map_err(|e| Error::Transaction {
                operation: "rollback".to_string(),
                cause: e.to_string(),
            })
    }
}
