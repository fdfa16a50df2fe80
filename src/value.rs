//! Value types and semantic-type coercion.
//!
//! Two value enums cross this crate's seams:
//!
//! - [`Value`] is untyped caller input: what arrives in a where-clause or an
//!   insert, before the target entity's field types are known.
//! - [`SqlValue`] is typed and dialect-portable: what gets bound as a
//!   statement parameter and what backends read out of result rows.
//!
//! [`coerce`] converts between them using the target field's semantic type.
//! Coercion failure is fatal to the single query that triggered it.

use crate::schema::FieldType;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Untyped input value.
///
/// Carries whatever the caller handed us; the predicate compiler and the
/// insert path coerce it against the entity descriptor before anything is
/// bound to a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / SQL NULL.
    Null,
    /// Text.
    Text(String),
    /// Any integer input; width is resolved against the field type.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// UUID.
    Uuid(Uuid),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Builds a `Value` from an untyped JSON value.
    ///
    /// This is the dynamic input surface: JSON objects and arrays are the
    /// natural wire form for map-style where-clauses. Non-integral numbers
    /// and composite values are carried as text and resolved (or rejected)
    /// by coercion against the target field type.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Text(n.to_string()), Self::Integer),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// True when this value is the explicit NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as the token string coercion parses.
    ///
    /// Timestamps render as epoch milliseconds, matching the string form
    /// coercion accepts for timestamp fields.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Uuid(u) => u.to_string(),
            Self::Timestamp(ts) => ts.timestamp_millis().to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Typed, dialect-portable parameter and result value.
///
/// Backends map each variant onto their driver's native binding: SQLite
/// stores UUIDs as hyphenated text, booleans as 0/1 integers, and timestamps
/// as epoch milliseconds; MySQL and PostgreSQL use their native column
/// types. `Real` has no semantic field type; it exists so backends can read
/// back floating-point columns created outside descriptor control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Text.
    Text(String),
    /// UUID.
    Uuid(Uuid),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// Floating point (read-back only).
    Real(f64),
    /// Boolean.
    Boolean(bool),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// True when this value is SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value for diagnostics.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Text(s) => s.clone(),
            Self::Uuid(u) => u.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::BigInt(i) => i.to_string(),
            Self::Real(f) => f.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Timestamp(ts) => ts.to_rfc3339(),
        }
    }
}

/// Parses the boolean token rule: true iff `"1"` or case-insensitive
/// `"true"`. Every other token is false; there is no error path.
fn boolean_token(token: &str) -> bool {
    token == "1" || token.eq_ignore_ascii_case("true")
}

fn conversion_error(field: &str, value: &Value) -> Error {
    Error::TypeConversion {
        field: field.to_string(),
        value: value.render(),
    }
}

/// Coerces an untyped input value to a field's semantic type.
///
/// Rules, in order:
///
/// 1. `Value::Null` and the empty string coerce to SQL NULL.
/// 2. Inputs already matching the target type pass through (integer widths
///    are checked).
/// 3. Everything else is rendered to its token string and parsed: UUIDs via
///    `Uuid::parse_str`, integers as decimal, booleans via the `"1"` /
///    `"true"` token rule (never failing), timestamps as epoch
///    milliseconds.
///
/// # Errors
///
/// Returns [`Error::TypeConversion`] naming the field and offending value
/// when parsing fails or an integer is out of range.
pub fn coerce(field: &str, field_type: FieldType, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    // Pass-through for inputs that already carry the target type.
    match (field_type, value) {
        (FieldType::Uuid, Value::Uuid(u)) => return Ok(SqlValue::Uuid(*u)),
        (FieldType::Boolean, Value::Boolean(b)) => return Ok(SqlValue::Boolean(*b)),
        (FieldType::Timestamp, Value::Timestamp(ts)) => return Ok(SqlValue::Timestamp(*ts)),
        (FieldType::Long, Value::Integer(i)) => return Ok(SqlValue::BigInt(*i)),
        (FieldType::Integer, Value::Integer(i)) => {
            return i32::try_from(*i)
                .map(SqlValue::Integer)
                .map_err(|_| conversion_error(field, value));
        },
        (FieldType::Timestamp, Value::Integer(millis)) => {
            return DateTime::from_timestamp_millis(*millis)
                .map(SqlValue::Timestamp)
                .ok_or_else(|| conversion_error(field, value));
        },
        _ => {},
    }

    let token = value.render();
    // The empty string coerces to absence, not to a value.
    if token.is_empty() {
        return Ok(SqlValue::Null);
    }

    match field_type {
        FieldType::Text => Ok(SqlValue::Text(token)),
        FieldType::Uuid => Uuid::parse_str(&token)
            .map(SqlValue::Uuid)
            .map_err(|_| conversion_error(field, value)),
        FieldType::Integer => token
            .parse::<i32>()
            .map(SqlValue::Integer)
            .map_err(|_| conversion_error(field, value)),
        FieldType::Long => token
            .parse::<i64>()
            .map(SqlValue::BigInt)
            .map_err(|_| conversion_error(field, value)),
        FieldType::Boolean => Ok(SqlValue::Boolean(boolean_token(&token))),
        FieldType::Timestamp => token
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(SqlValue::Timestamp)
            .ok_or_else(|| conversion_error(field, value)),
    }
}

/// Decodes a raw backend value back to a field's semantic type.
///
/// The inverse of [`coerce`] on the read path: SQLite hands back integers
/// where the descriptor says boolean or timestamp, and text where it says
/// UUID. Values a backend already decoded natively pass through.
///
/// # Errors
///
/// Returns [`Error::TypeConversion`] when the stored value cannot represent
/// the declared type (e.g. non-UUID text in a UUID column).
pub fn decode(field: &str, field_type: FieldType, raw: SqlValue) -> Result<SqlValue> {
    let type_error = |raw: &SqlValue| Error::TypeConversion {
        field: field.to_string(),
        value: raw.render(),
    };

    match (field_type, raw) {
        (_, SqlValue::Null) => Ok(SqlValue::Null),
        (FieldType::Text, raw) => Ok(SqlValue::Text(raw.render())),
        (FieldType::Uuid, SqlValue::Uuid(u)) => Ok(SqlValue::Uuid(u)),
        (FieldType::Uuid, SqlValue::Text(s)) => Uuid::parse_str(&s)
            .map(SqlValue::Uuid)
            .map_err(|_| type_error(&SqlValue::Text(s.clone()))),
        (FieldType::Integer, SqlValue::Integer(i)) => Ok(SqlValue::Integer(i)),
        (FieldType::Integer, SqlValue::BigInt(i)) => i32::try_from(i)
            .map(SqlValue::Integer)
            .map_err(|_| type_error(&SqlValue::BigInt(i))),
        (FieldType::Long, SqlValue::BigInt(i)) => Ok(SqlValue::BigInt(i)),
        (FieldType::Long, SqlValue::Integer(i)) => Ok(SqlValue::BigInt(i64::from(i))),
        (FieldType::Boolean, SqlValue::Boolean(b)) => Ok(SqlValue::Boolean(b)),
        (FieldType::Boolean, SqlValue::Integer(i)) => Ok(SqlValue::Boolean(i != 0)),
        (FieldType::Boolean, SqlValue::BigInt(i)) => Ok(SqlValue::Boolean(i != 0)),
        (FieldType::Boolean, SqlValue::Text(s)) => Ok(SqlValue::Boolean(boolean_token(&s))),
        (FieldType::Timestamp, SqlValue::Timestamp(ts)) => Ok(SqlValue::Timestamp(ts)),
        (FieldType::Timestamp, SqlValue::BigInt(millis)) => {
            DateTime::from_timestamp_millis(millis)
                .map(SqlValue::Timestamp)
                .ok_or_else(|| type_error(&SqlValue::BigInt(millis)))
        },
        (FieldType::Timestamp, SqlValue::Integer(millis)) => {
            DateTime::from_timestamp_millis(i64::from(millis))
                .map(SqlValue::Timestamp)
                .ok_or_else(|| type_error(&SqlValue::Integer(millis)))
        },
        (_, raw) => Err(type_error(&raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("true", true; "lowercase true")]
    #[test_case("TRUE", true; "uppercase true")]
    #[test_case("True", true; "mixed case true")]
    #[test_case("1", true; "one")]
    #[test_case("false", false; "false token")]
    #[test_case("0", false; "zero")]
    #[test_case("yes", false; "unknown token is false")]
    fn test_boolean_token_rule(token: &str, expected: bool) {
        let coerced = coerce("active", FieldType::Boolean, &Value::from(token)).unwrap();
        assert_eq!(coerced, SqlValue::Boolean(expected));
    }

    #[test]
    fn test_empty_string_coerces_to_null() {
        for field_type in [
            FieldType::Text,
            FieldType::Uuid,
            FieldType::Integer,
            FieldType::Long,
            FieldType::Boolean,
            FieldType::Timestamp,
        ] {
            let coerced = coerce("f", field_type, &Value::from("")).unwrap();
            assert_eq!(coerced, SqlValue::Null, "{field_type:?}");
        }
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(
            coerce("n", FieldType::Integer, &Value::from("42")).unwrap(),
            SqlValue::Integer(42)
        );
        assert_eq!(
            coerce("n", FieldType::Long, &Value::from("9000000000")).unwrap(),
            SqlValue::BigInt(9_000_000_000)
        );

        let err = coerce("n", FieldType::Integer, &Value::from("abc")).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::TypeConversion { ref field, ref value } if field == "n" && value == "abc"
        ));
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = coerce("n", FieldType::Integer, &Value::Integer(i64::MAX)).unwrap_err();
        assert!(matches!(err, crate::Error::TypeConversion { .. }));
    }

    #[test]
    fn test_uuid_coercion() {
        let u = Uuid::new_v4();
        assert_eq!(
            coerce("id", FieldType::Uuid, &Value::from(u.to_string())).unwrap(),
            SqlValue::Uuid(u)
        );
        assert_eq!(
            coerce("id", FieldType::Uuid, &Value::from(u)).unwrap(),
            SqlValue::Uuid(u)
        );
        assert!(coerce("id", FieldType::Uuid, &Value::from("not-a-uuid")).is_err());
    }

    #[test]
    fn test_timestamp_coercion_epoch_millis() {
        let coerced = coerce("at", FieldType::Timestamp, &Value::from("1700000000000")).unwrap();
        let SqlValue::Timestamp(ts) = coerced else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);

        assert!(coerce("at", FieldType::Timestamp, &Value::from("not-a-time")).is_err());
    }

    #[test]
    fn test_null_passthrough() {
        assert_eq!(
            coerce("f", FieldType::Text, &Value::Null).unwrap(),
            SqlValue::Null
        );
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(&serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Boolean(true));
        assert_eq!(Value::from_json(&serde_json::json!(7)), Value::Integer(7));
        assert_eq!(
            Value::from_json(&serde_json::json!("alice")),
            Value::Text("alice".to_string())
        );
    }

    #[test]
    fn test_decode_sqlite_shapes() {
        // SQLite stores booleans and timestamps as integers, UUIDs as text.
        assert_eq!(
            decode("active", FieldType::Boolean, SqlValue::BigInt(1)).unwrap(),
            SqlValue::Boolean(true)
        );
        assert_eq!(
            decode("active", FieldType::Boolean, SqlValue::BigInt(0)).unwrap(),
            SqlValue::Boolean(false)
        );

        let decoded = decode("at", FieldType::Timestamp, SqlValue::BigInt(1_700_000_000_000)).unwrap();
        let SqlValue::Timestamp(ts) = decoded else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);

        let u = Uuid::new_v4();
        assert_eq!(
            decode("id", FieldType::Uuid, SqlValue::Text(u.to_string())).unwrap(),
            SqlValue::Uuid(u)
        );
    }

    #[test]
    fn test_decode_mismatch_is_error() {
        assert!(decode("id", FieldType::Uuid, SqlValue::Text("junk".to_string())).is_err());
        assert!(decode("n", FieldType::Integer, SqlValue::BigInt(i64::MAX)).is_err());
    }
}
