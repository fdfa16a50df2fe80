//! Session layer.
//!
//! This module owns everything between the query/migration engines and the
//! database drivers:
//! - [`Dialect`]: static per-dialect facts (placeholders, DDL, catalogs)
//! - [`SqlBackend`] and [`Row`]: the compiled-in driver seam, with one
//!   implementation per dialect behind cargo features
//! - [`Session`] / [`TransactionScope`]: the one shared connection and its
//!   reuse-never-nest transaction scoping
//! - [`SessionManager`]: lazy guarded creation, pragma tuning, DDL
//!   synchronization, and shutdown

pub mod backend;
pub mod dialect;
pub mod manager;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use backend::{Row, SqlBackend};
pub use dialect::Dialect;
pub use manager::{Session, SessionManager, TransactionScope, acquire_lock};
