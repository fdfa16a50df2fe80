//! Find options.
//!
//! The options object a find call carries: where-clause (default
//! always-true), optional attribute projection, optional limit and skip.
//! Constructed once per query via the fluent setters; execution never
//! mutates it.

use crate::query::predicate::{Operator, WhereClause};
use crate::value::Value;

/// Options for find queries, used with `find_all` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    where_clause: WhereClause,
    attributes: Option<Vec<String>>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl FindOptions {
    /// Creates options with no conditions (match everything).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            where_clause: WhereClause::new(),
            attributes: None,
            limit: None,
            skip: None,
        }
    }

    /// Creates options from a where-clause.
    #[must_use]
    pub const fn where_clause(where_clause: WhereClause) -> Self {
        Self {
            where_clause,
            attributes: None,
            limit: None,
            skip: None,
        }
    }

    /// Creates options matching a single field equality.
    #[must_use]
    pub fn where_field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::where_clause(WhereClause::new().field(field, value))
    }

    /// Creates options from an operator node.
    #[must_use]
    pub fn where_operator(operator: Operator) -> Self {
        Self::where_clause(WhereClause::new().operator(operator))
    }

    /// Replaces the where-clause.
    #[must_use]
    pub fn with_where(mut self, where_clause: WhereClause) -> Self {
        self.where_clause = where_clause;
        self
    }

    /// Sets the attribute projection list.
    ///
    /// Accepted but not load-bearing: execution fails closed on a populated
    /// list rather than silently dropping fields.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Sets the row limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip/offset.
    #[must_use]
    pub const fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// The where-clause.
    #[must_use]
    pub const fn where_ref(&self) -> &WhereClause {
        &self.where_clause
    }

    /// The attribute projection, if set.
    #[must_use]
    pub fn attributes(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }

    /// The row limit, if set.
    #[must_use]
    pub const fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// The skip/offset, if set.
    #[must_use]
    pub const fn skip(&self) -> Option<u64> {
        self.skip
    }

    /// Copies these options with the limit forced to 1 (the `find_one`
    /// shape).
    #[must_use]
    pub fn first_only(&self) -> Self {
        let mut options = self.clone();
        options.limit = Some(1);
        options
    }
}

impl From<WhereClause> for FindOptions {
    fn from(where_clause: WhereClause) -> Self {
        Self::where_clause(where_clause)
    }
}
