//! Predicate compiler.
//!
//! Turns a [`WhereClause`] into a dialect-correct, parameterized filter:
//! conditions accumulate into a clause string while coerced parameter
//! values accumulate into a parallel list, with placeholders numbered for
//! the target dialect. Coercion consults the entity descriptor and
//! short-circuits on the first failure, so an error never leaves a partial
//! filter applied.
//!
//! SQL NULL is rendered inline (`field = NULL`, which matches nothing, as
//! equality against absence always did) rather than bound, so backends
//! never have to produce a typed NULL parameter.

use crate::query::predicate::{Predicate, WhereClause};
use crate::schema::EntityDescriptor;
use crate::value::{self, SqlValue};
use crate::{Dialect, Result};

/// A compiled filter: the clause text (without the `WHERE` keyword; empty
/// means always-true) and its bind parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Clause text, e.g. `name = ? AND (age = ? OR age = ?)`.
    pub clause: String,
    /// Bind parameters in placeholder order; never contains NULL.
    pub params: Vec<SqlValue>,
}

impl CompiledFilter {
    /// True when the filter is always-true (no conditions).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }

    /// Renders the ` WHERE ...` suffix, or nothing for an always-true
    /// filter.
    #[must_use]
    pub fn where_suffix(&self) -> String {
        if self.clause.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clause)
        }
    }
}

struct Compilation<'a> {
    entity: &'a EntityDescriptor,
    dialect: Dialect,
    params: Vec<SqlValue>,
    param_idx: usize,
}

/// Compiles a where-clause against an entity descriptor.
///
/// # Errors
///
/// - [`crate::Error::MalformedPredicate`] from [`WhereClause::build`]
/// - [`crate::Error::FieldNotFound`] for unknown fields
/// - [`crate::Error::TypeConversion`] when a value cannot be coerced
pub fn compile(
    entity: &EntityDescriptor,
    where_clause: &WhereClause,
    dialect: Dialect,
) -> Result<CompiledFilter> {
    let predicate = where_clause.build()?;
    let mut compilation = Compilation {
        entity,
        dialect,
        params: Vec::new(),
        param_idx: 1,
    };
    let clause = compile_node(&mut compilation, &predicate, false)?.unwrap_or_default();
    Ok(CompiledFilter {
        clause,
        params: compilation.params,
    })
}

/// Compiles one node. `None` means "no condition" (always true); inside an
/// OR that distinction matters because null-coerced equalities are skipped
/// rather than rendered.
fn compile_node(
    compilation: &mut Compilation<'_>,
    predicate: &Predicate,
    in_or: bool,
) -> Result<Option<String>> {
    match predicate {
        Predicate::Equals(field, value) => {
            let descriptor = compilation.entity.require_field(field)?;
            let coerced = value::coerce(field, descriptor.field_type, value)?;
            if coerced.is_null() {
                if in_or {
                    // Absent values contribute no clause to a disjunction.
                    return Ok(None);
                }
                // Equality against absence never matches; keep it visible
                // in the generated SQL instead of binding a typed NULL.
                return Ok(Some(format!("{field} = NULL")));
            }
            let placeholder = compilation.dialect.placeholder(compilation.param_idx);
            compilation.param_idx += 1;
            compilation.params.push(coerced);
            Ok(Some(format!("{field} = {placeholder}")))
        },
        Predicate::And(children) => {
            let mut conditions = Vec::with_capacity(children.len());
            for child in children {
                if let Some(condition) = compile_node(compilation, child, false)? {
                    conditions.push(condition);
                }
            }
            if conditions.is_empty() {
                return Ok(None);
            }
            let joined = conditions.join(" AND ");
            if in_or && conditions.len() > 1 {
                Ok(Some(format!("({joined})")))
            } else {
                Ok(Some(joined))
            }
        },
        Predicate::Or(children) => {
            let mut conditions = Vec::with_capacity(children.len());
            for child in children {
                if let Some(condition) = compile_node(compilation, child, true)? {
                    conditions.push(condition);
                }
            }
            if conditions.is_empty() {
                // An OR over zero clauses matches nothing.
                return Ok(Some("1 = 0".to_string()));
            }
            Ok(Some(format!("({})", conditions.join(" OR "))))
        },
        Predicate::Not(inner) => {
            // Reserved by the operator set; compiled for completeness.
            (compile_node(compilation, inner, false)?).map_or_else(
                || Ok(Some("1 = 0".to_string())),
                |condition| Ok(Some(format!("NOT ({condition})"))),
            )
        },
    }
}
