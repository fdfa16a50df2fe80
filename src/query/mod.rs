//! Query layer.
//!
//! The declarative predicate model ([`WhereClause`], [`Predicate`]), its
//! dialect-aware compiler ([`compiler::compile`]), the per-query
//! [`FindOptions`], and the [`QueryExecutor`] that runs the result on the
//! shared session.

pub mod compiler;
pub mod executor;
pub mod options;
pub mod predicate;

pub use compiler::{CompiledFilter, compile};
pub use executor::QueryExecutor;
pub use options::FindOptions;
pub use predicate::{Condition, OPERATOR_KEY, Operator, OrShape, Predicate, WhereClause};
