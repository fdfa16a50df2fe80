//! # Anysql
//!
//! A database-agnostic persistence core for SQLite, MySQL, and PostgreSQL.
//!
//! Anysql lets application code issue structured queries and apply versioned
//! schema changes against any of the three supported engines through one
//! abstraction. It is built from three interlocking subsystems:
//!
//! - A predicate compiler that turns a declarative where-clause into
//!   dialect-correct, parameterized filter SQL ([`query`]).
//! - A migration engine that tracks, orders, and idempotently applies schema
//!   changes through a persisted ledger ([`migrate`]).
//! - A session lifecycle that shares one physical connection across callers
//!   while respecting each dialect's transaction and pragma semantics
//!   ([`session`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use anysql::{ConnectionConfig, DatabaseProvider, EntityDescriptor, FieldType, WhereClause};
//!
//! let provider = DatabaseProvider::new(ConnectionConfig::sqlite("./app.db"));
//! provider.register_entity(
//!     EntityDescriptor::builder("accounts")
//!         .primary_key("uuid", FieldType::Uuid)
//!         .field("name", FieldType::Text)
//!         .build()?,
//! )?;
//! let rows = provider.find_all("accounts", WhereClause::new().field("name", "alice").into())?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod migrate;
pub mod provider;
pub mod query;
pub mod schema;
pub mod session;
pub mod value;

// Re-exports for convenience
pub use config::ConnectionConfig;
pub use migrate::{Migration, MigrationRecord, MigrationRunner};
pub use provider::DatabaseProvider;
pub use query::{FindOptions, Operator, Predicate, QueryExecutor, WhereClause};
pub use schema::{EntityDescriptor, EntityRegistry, FieldDescriptor, FieldType};
pub use session::{Dialect, Row, Session, SessionManager, TransactionScope};
pub use value::{SqlValue, Value};

/// Error type for anysql operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `ProviderNotInitialized` | An operation reaches a session that has been shut down |
/// | `EntityNotRegistered` | An operation names an entity the registry does not contain |
/// | `FieldNotFound` | A predicate or coercion references an unknown field |
/// | `TypeConversion` | A value cannot be coerced to its field's semantic type |
/// | `MalformedPredicate` | The reserved `$` key holds a plain value instead of an operator |
/// | `Transaction` | BEGIN/COMMIT/ROLLBACK failed on the shared session |
/// | `Migration` | A single migration's body or ledger append failed (contained) |
/// | `OperationFailed` | Driver errors, I/O errors, anything else unexpected |
#[derive(Debug, ThisError)]
pub enum Error {
    /// An operation reached a session that is not usable.
    ///
    /// Raised when:
    /// - A session handle is used after `SessionManager::shutdown`
    /// - A transaction scope is requested on a closed session
    #[error("provider not initialized: {0}")]
    ProviderNotInitialized(String),

    /// An operation referenced an entity that was never registered.
    #[error("entity not registered: {entity}")]
    EntityNotRegistered {
        /// The entity name that was looked up.
        entity: String,
    },

    /// A predicate or coercion referenced an unknown field.
    ///
    /// Surfaced immediately; never silently ignored.
    #[error("field '{field}' not found on entity '{entity}'")]
    FieldNotFound {
        /// The entity whose descriptor was consulted.
        entity: String,
        /// The unknown field name.
        field: String,
    },

    /// A value could not be coerced to its field's semantic type.
    ///
    /// Fails the single query that triggered it; no partial filter is left
    /// applied to the session.
    #[error("cannot convert value '{value}' for field '{field}'")]
    TypeConversion {
        /// The target field name.
        field: String,
        /// The offending source value, rendered for diagnostics.
        value: String,
    },

    /// The reserved operator key was misused at predicate construction time.
    ///
    /// Raised when:
    /// - A plain value is keyed under `$` instead of an operator node
    #[error("malformed predicate: {0}")]
    MalformedPredicate(String),

    /// A transaction control statement failed.
    ///
    /// Rollback is attempted best-effort before this is surfaced.
    #[error("transaction '{operation}' failed: {cause}")]
    Transaction {
        /// Which control statement failed (begin, commit, rollback).
        operation: String,
        /// The underlying driver error.
        cause: String,
    },

    /// A single migration failed.
    ///
    /// The migration's transaction is rolled back and execution continues
    /// with the next migration; this variant is logged by the runner rather
    /// than propagated out of `run`.
    #[error("migration '{id}' failed: {cause}")]
    Migration {
        /// The failing migration's id.
        id: String,
        /// The underlying cause.
        cause: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - Driver statement execution or row decoding fails
    /// - A rejected option is used (e.g. attribute projection)
    /// - The backend connection cannot be opened
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for anysql operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Centralized here so the ledger, value coercion, and tests all share one
/// clock convention. Falls back to 0 if the system clock is before the Unix
/// epoch.
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EntityNotRegistered {
            entity: "accounts".to_string(),
        };
        assert_eq!(err.to_string(), "entity not registered: accounts");

        let err = Error::FieldNotFound {
            entity: "accounts".to_string(),
            field: "nme".to_string(),
        };
        assert_eq!(err.to_string(), "field 'nme' not found on entity 'accounts'");

        let err = Error::TypeConversion {
            field: "age".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "cannot convert value 'abc' for field 'age'");

        let err = Error::OperationFailed {
            operation: "find".to_string(),
            cause: "disk I/O error".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'find' failed: disk I/O error");
    }

    #[test]
    fn test_current_timestamp_millis() {
        let ts = current_timestamp_millis();
        // Some time after 2020-01-01.
        assert!(ts > 1_577_836_800_000);
    }
}
