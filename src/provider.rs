//! Database provider.
//!
//! [`DatabaseProvider`] is the explicit application-lifecycle object tying
//! the three subsystems together: entity and migration registration flow
//! through it, the first session use triggers initialization (physical
//! connection, pragma tuning, DDL synchronization, migrations), and the
//! executor operations run against the shared session it hands out.
//!
//! There is no process-global state: every operation goes through a
//! provider handle, and several logical providers can share one physical
//! session by sharing a [`SessionManager`].

use crate::config::ConnectionConfig;
use crate::migrate::{Migration, MigrationRecord, MigrationRunner};
use crate::query::{FindOptions, QueryExecutor, WhereClause};
use crate::schema::EntityDescriptor;
use crate::session::{Row, Session, SessionManager};
use crate::value::Value;
use crate::{Dialect, Result};
use std::sync::Arc;

/// Unified interface for database operations regardless of the underlying
/// engine.
pub struct DatabaseProvider {
    manager: Arc<SessionManager>,
    runner: Arc<MigrationRunner>,
}

impl DatabaseProvider {
    /// Creates a provider owning its own session manager.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_manager(Arc::new(SessionManager::new(config)))
    }

    /// Creates a provider over a shared session manager.
    ///
    /// All providers sharing one manager share the one physical session;
    /// each keeps its own migration runner.
    #[must_use]
    pub fn with_manager(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            runner: Arc::new(MigrationRunner::new()),
        }
    }

    /// The configured dialect.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.manager.dialect()
    }

    /// The underlying session manager.
    #[must_use]
    pub const fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// The migration runner.
    #[must_use]
    pub const fn migration_runner(&self) -> &Arc<MigrationRunner> {
        &self.runner
    }

    /// Registers an entity descriptor. Must precede first session use.
    pub fn register_entity(&self, descriptor: EntityDescriptor) -> Result<()> {
        self.manager.register_entity(descriptor)
    }

    /// Registers a migration. Must precede first session use; registration
    /// order is execution order.
    pub fn register_migration(&self, migration: Box<dyn Migration>) -> Result<()> {
        self.runner.register(migration)
    }

    /// Registers several migrations, in order.
    pub fn register_migrations(
        &self,
        migrations: impl IntoIterator<Item = Box<dyn Migration>>,
    ) -> Result<()> {
        self.runner.register_all(migrations)
    }

    /// Returns the shared session, initializing on first use.
    ///
    /// Initialization order: physical connection (with SQLite pragma
    /// tuning), additive DDL synchronization from the registered
    /// descriptors, then registered migrations — once per process; no
    /// query traffic is trusted before the migrations have run.
    pub fn session(&self) -> Result<Arc<Session>> {
        let session = self.manager.session()?;
        self.runner.run(&session)?;
        Ok(session)
    }

    fn executor(&self) -> Result<QueryExecutor> {
        Ok(QueryExecutor::new(self.session()?))
    }

    /// Probes the connection with `SELECT 1`.
    #[must_use]
    pub fn test_connection(&self) -> bool {
        self.session()
            .map(|session| session.test_connection())
            .unwrap_or(false)
    }

    /// Finds all rows of an entity matching the options.
    pub fn find_all(&self, entity: &str, options: &FindOptions) -> Result<Vec<Row>> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.find_all(&descriptor, options)
    }

    /// Finds the first row of an entity matching the options; `Ok(None)`
    /// when nothing matches.
    pub fn find_one(&self, entity: &str, options: &FindOptions) -> Result<Option<Row>> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.find_one(&descriptor, options)
    }

    /// Finds a row by primary key (explicit flag, then `uuid`, then `id`).
    pub fn find_by_pk(&self, entity: &str, pk: impl Into<Value>) -> Result<Option<Row>> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.find_by_pk(&descriptor, pk)
    }

    /// Finds the first row with `field = value`.
    pub fn find_by_field(
        &self,
        entity: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Row>> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.find_by_field(&descriptor, field, value)
    }

    /// Finds all rows with `field = value`.
    pub fn find_all_by_field(
        &self,
        entity: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Row>> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.find_all_by_field(&descriptor, field, value)
    }

    /// Creates one row.
    pub fn create(&self, entity: &str, values: &[(&str, Value)]) -> Result<()> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.insert(&descriptor, values)
    }

    /// Destroys rows matching the where-clause, returning the count.
    pub fn destroy(&self, entity: &str, where_clause: &WhereClause) -> Result<u64> {
        let descriptor = self.manager.entity(entity)?;
        self.executor()?.delete(&descriptor, where_clause)
    }

    /// Reads the migration ledger.
    pub fn applied_migrations(&self) -> Result<Vec<MigrationRecord>> {
        let session = self.session()?;
        self.runner.applied(&session)
    }

    /// Closes this logical provider.
    ///
    /// Never tears down the shared physical session: only a transaction
    /// still active on it is rolled back. Use
    /// [`DatabaseProvider::shutdown`] on the application's shutdown path to
    /// release the physical session.
    pub fn close(&self) {
        if let Some(session) = self.manager.current_session() {
            if let Err(e) = session.rollback_active() {
                tracing::warn!(error = %e, "rollback during provider close failed");
            }
        }
    }

    /// Process-shutdown teardown of the shared physical session.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

impl std::fmt::Debug for DatabaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseProvider")
            .field("dialect", &self.dialect())
            .finish_non_exhaustive()
    }
}
