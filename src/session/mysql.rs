//! MySQL backend.

use crate::config::ConnectionConfig;
use crate::session::backend::{Row, SqlBackend};
use crate::value::SqlValue;
use crate::{Dialect, Error, Result};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params};

/// MySQL-backed [`SqlBackend`].
///
/// Statement parameters go through the binary protocol
/// (`START TRANSACTION`/`COMMIT`/`ROLLBACK` use the text protocol, which is
/// the only one that accepts them). Timestamps map onto `DATETIME(3)`
/// values in UTC.
pub struct MysqlBackend {
    conn: Conn,
}

impl MysqlBackend {
    /// Connects to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.effective_port().unwrap_or(3306))
            .db_name(Some(config.database.clone()))
            .user(config.user.clone())
            .pass(config.password.clone());

        let conn = Conn::new(opts).map_err(|e| Error::OperationFailed {
            operation: "open_mysql".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self { conn })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_mysql(value: &SqlValue) -> mysql::Value {
    use mysql::Value as V;
    match value {
        SqlValue::Null => V::NULL,
        SqlValue::Text(s) => V::Bytes(s.clone().into_bytes()),
        SqlValue::Uuid(u) => V::Bytes(u.to_string().into_bytes()),
        SqlValue::Integer(i) => V::Int(i64::from(*i)),
        SqlValue::BigInt(i) => V::Int(*i),
        SqlValue::Real(f) => V::Double(*f),
        SqlValue::Boolean(b) => V::Int(i64::from(*b)),
        SqlValue::Timestamp(ts) => V::Date(
            ts.year().unsigned_abs() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.timestamp_subsec_micros(),
        ),
    }
}

fn from_mysql(value: mysql::Value) -> SqlValue {
    use mysql::Value as V;
    match value {
        V::NULL => SqlValue::Null,
        V::Bytes(b) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
        V::Int(i) => SqlValue::BigInt(i),
        V::UInt(u) => SqlValue::BigInt(i64::try_from(u).unwrap_or(i64::MAX)),
        V::Float(f) => SqlValue::Real(f64::from(f)),
        V::Double(f) => SqlValue::Real(f),
        V::Date(year, month, day, hour, minute, second, micros) => datetime_value(
            i32::from(year),
            u32::from(month),
            u32::from(day),
            u32::from(hour),
            u32::from(minute),
            u32::from(second),
            micros,
        ),
        V::Time(negative, days, hours, minutes, seconds, micros) => {
            // Durations have no semantic field type; render as text.
            let sign = if negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(hours);
            SqlValue::Text(format!(
                "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        },
    }
}

fn datetime_value(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    micros: u32,
) -> SqlValue {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
        .single()
        .and_then(|ts: DateTime<Utc>| {
            ts.with_nanosecond(micros.checked_mul(1000).unwrap_or(0))
        })
        .map_or(SqlValue::Null, SqlValue::Timestamp)
}

fn bind(params: &[SqlValue]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(to_mysql).collect())
    }
}

fn operation_error(operation: &str, e: &mysql::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

impl SqlBackend for MysqlBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = self
            .conn
            .exec_iter(sql, bind(params))
            .map_err(|e| operation_error("mysql_execute", &e))?;
        Ok(result.affected_rows())
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let result = self
            .conn
            .exec_iter(sql, bind(params))
            .map_err(|e| operation_error("mysql_query", &e))?;

        let mut out = Vec::new();
        for row in result {
            let row = row.map_err(|e| operation_error("mysql_query", &e))?;
            let columns: Vec<String> = row
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect();
            let values: Vec<SqlValue> = row.unwrap().into_iter().map(from_mysql).collect();
            out.push(Row::new(columns, values));
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn
            .query_drop("START TRANSACTION")
            .map_err(|e| Error::Transaction {
                operation: "begin".to_string(),
                cause: e.to_string(),
            })
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .query_drop("COMMIT")
            .map_err(|e| Error::Transaction {
                operation: "commit".to_string(),
                cause: e.to_string(),
            })
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .query_drop("ROLLBACK")
            .map_err(|e| Error::Transaction {
                operation: "rollback".to_string(),
                cause: e.to_string(),
            })
    }
}
