//! Query executor.
//!
//! Glue over the compiler, the session, and the entity descriptors: builds
//! SELECT/INSERT/DELETE statements, runs them on the shared session, and
//! decodes raw rows back to semantic values per the descriptor.

use crate::query::compiler::{self, CompiledFilter};
use crate::query::options::FindOptions;
use crate::query::predicate::WhereClause;
use crate::schema::EntityDescriptor;
use crate::session::{Row, Session};
use crate::value::{self, SqlValue, Value};
use crate::{Error, Result};
use std::sync::Arc;

/// Runs structured queries against the shared session.
#[derive(Clone)]
pub struct QueryExecutor {
    session: Arc<Session>,
}

impl QueryExecutor {
    /// Creates an executor bound to a session.
    #[must_use]
    pub const fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The bound session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn compile_where(
        &self,
        entity: &EntityDescriptor,
        where_clause: &WhereClause,
    ) -> Result<CompiledFilter> {
        compiler::compile(entity, where_clause, self.session.dialect())
    }

    /// Finds all rows matching the options.
    ///
    /// Selects the descriptor's full column list. A populated attribute
    /// projection is rejected explicitly: partial projection is accepted by
    /// [`FindOptions`] but not implemented, and silently dropping fields is
    /// worse than failing.
    pub fn find_all(&self, entity: &EntityDescriptor, options: &FindOptions) -> Result<Vec<Row>> {
        if options.attributes().is_some() {
            return Err(Error::OperationFailed {
                operation: "find".to_string(),
                cause: "attribute projection is not supported; all fields are always selected"
                    .to_string(),
            });
        }

        let filter = self.compile_where(entity, options.where_ref())?;
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            entity.column_names().join(", "),
            entity.name(),
            filter.where_suffix(),
            self.session
                .dialect()
                .limit_clause(options.limit(), options.skip()),
        );

        metrics::counter!("anysql_queries_total").increment(1);
        let rows = self.session.query(&sql, &filter.params)?;
        rows.into_iter()
            .map(|row| decode_row(entity, &row))
            .collect()
    }

    /// Finds the first row matching the options.
    ///
    /// `find_all` with the limit forced to 1; a zero-row result is
    /// `Ok(None)`, never an error.
    pub fn find_one(
        &self,
        entity: &EntityDescriptor,
        options: &FindOptions,
    ) -> Result<Option<Row>> {
        let rows = self.find_all(entity, &options.first_only())?;
        Ok(rows.into_iter().next())
    }

    /// Finds a row by its primary key.
    ///
    /// The key field comes from the descriptor: the explicit primary-key
    /// flag, then a field named `uuid`, then one named `id`.
    pub fn find_by_pk(
        &self,
        entity: &EntityDescriptor,
        pk: impl Into<Value>,
    ) -> Result<Option<Row>> {
        let key = entity.primary_key().ok_or_else(|| Error::OperationFailed {
            operation: "find_by_pk".to_string(),
            cause: format!("no primary key field on entity '{}'", entity.name()),
        })?;
        let options = FindOptions::where_field(key.name.clone(), pk);
        self.find_one(entity, &options)
    }

    /// Finds the first row with `field = value`.
    pub fn find_by_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Row>> {
        self.find_one(entity, &FindOptions::where_field(field, value))
    }

    /// Finds all rows with `field = value`.
    pub fn find_all_by_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Row>> {
        self.find_all(entity, &FindOptions::where_field(field, value))
    }

    /// Inserts one row, coercing each value against the descriptor.
    ///
    /// Runs in its own transaction scope. NULL values render inline so the
    /// parameter list stays NULL-free for every backend.
    pub fn insert(&self, entity: &EntityDescriptor, values: &[(&str, Value)]) -> Result<()> {
        if values.is_empty() {
            return Err(Error::OperationFailed {
                operation: "create".to_string(),
                cause: "no values to insert".to_string(),
            });
        }

        let dialect = self.session.dialect();
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        let mut params = Vec::new();
        let mut param_idx = 1;

        for (field, value) in values {
            let descriptor = entity.require_field(field)?;
            let coerced = value::coerce(field, descriptor.field_type, value)?;
            columns.push(descriptor.name.clone());
            if coerced.is_null() {
                placeholders.push("NULL".to_string());
            } else {
                placeholders.push(dialect.placeholder(param_idx));
                param_idx += 1;
                params.push(coerced);
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            entity.name(),
            columns.join(", "),
            placeholders.join(", "),
        );

        let scope = self.session.begin_scope()?;
        self.session.execute(&sql, &params)?;
        scope.commit()
    }

    /// Deletes rows matching the where-clause, returning the count.
    ///
    /// An empty clause deletes every row, consistent with an empty clause
    /// in `find_all` matching every row.
    pub fn delete(&self, entity: &EntityDescriptor, where_clause: &WhereClause) -> Result<u64> {
        let filter = self.compile_where(entity, where_clause)?;
        let sql = format!(
            "DELETE FROM {}{}",
            entity.name(),
            filter.where_suffix(),
        );

        let scope = self.session.begin_scope()?;
        let affected = self.session.execute(&sql, &filter.params)?;
        scope.commit()?;
        Ok(affected)
    }
}

/// Decodes a raw backend row into the descriptor's semantic types, in
/// descriptor field order.
fn decode_row(entity: &EntityDescriptor, row: &Row) -> Result<Row> {
    let mut columns = Vec::with_capacity(entity.fields().len());
    let mut values = Vec::with_capacity(entity.fields().len());
    for field in entity.fields() {
        let raw = row.get(&field.name).cloned().unwrap_or(SqlValue::Null);
        values.push(value::decode(&field.name, field.field_type, raw)?);
        columns.push(field.name.clone());
    }
    Ok(Row::new(columns, values))
}
