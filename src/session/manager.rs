//! Session lifecycle.
//!
//! A [`SessionManager`] owns exactly one lazily created [`Session`] (the
//! physical connection) and the entity registry that seeds DDL
//! synchronization. Creation is guarded by the manager's state lock; once
//! created, the session handle is shared by every caller without
//! additional per-call locking beyond the per-statement mutex — callers
//! are responsible for not overlapping transactions on the shared session.

use crate::config::ConnectionConfig;
use crate::schema::{EntityDescriptor, EntityRegistry};
use crate::session::backend::{Row, SqlBackend};
use crate::value::SqlValue;
use crate::{Dialect, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Helper to acquire a mutex lock with poison recovery.
///
/// If the mutex is poisoned (a panic in a previous critical section), we
/// recover the inner value and log a warning. This prevents cascading
/// failures when one operation panics.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("session mutex was poisoned, recovering");
            metrics::counter!("anysql_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// The single shared logical connection.
///
/// All queries, DDL, and migrations in a process flow through one
/// `Session`. Statements are serialized through an internal mutex; the
/// transaction flag is the only other mutable state and is consulted by
/// [`Session::begin_scope`] so transactions are reused, never nested.
pub struct Session {
    backend: Mutex<Box<dyn SqlBackend>>,
    dialect: Dialect,
    tx_active: Mutex<bool>,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(backend: Box<dyn SqlBackend>) -> Self {
        let dialect = backend.dialect();
        Self {
            backend: Mutex::new(backend),
            dialect,
            tx_active: Mutex::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The dialect this session speaks.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ProviderNotInitialized(
                "session has been shut down".to_string(),
            ));
        }
        Ok(())
    }

    /// Executes a statement on the shared connection.
    pub fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.ensure_open()?;
        metrics::counter!("anysql_statements_total").increment(1);
        acquire_lock(&self.backend).execute(sql, params)
    }

    /// Runs a query on the shared connection.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        metrics::counter!("anysql_statements_total").increment(1);
        acquire_lock(&self.backend).query(sql, params)
    }

    /// True while a transaction is active on the shared connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        *acquire_lock(&self.tx_active)
    }

    /// Acquires a transaction scope.
    ///
    /// Issues `BEGIN` only when no transaction is active; otherwise the
    /// returned scope joins the active transaction (reuse is permitted,
    /// nesting never happens). Only an owning scope commits or rolls back
    /// the underlying transaction; dropping an owning scope without
    /// committing rolls back.
    pub fn begin_scope(&self) -> Result<TransactionScope<'_>> {
        self.ensure_open()?;
        let mut active = acquire_lock(&self.tx_active);
        if *active {
            return Ok(TransactionScope {
                session: self,
                owns: false,
                done: false,
            });
        }
        acquire_lock(&self.backend).begin()?;
        *active = true;
        Ok(TransactionScope {
            session: self,
            owns: true,
            done: false,
        })
    }

    /// Probes the connection with `SELECT 1`.
    #[must_use]
    pub fn test_connection(&self) -> bool {
        self.query("SELECT 1", &[]).is_ok()
    }

    /// Rolls back a still-active transaction, if any.
    ///
    /// Used by the provider's `close()`: the shared physical session stays
    /// open, only this caller's unfinished work is discarded.
    pub fn rollback_active(&self) -> Result<()> {
        let mut active = acquire_lock(&self.tx_active);
        if *active {
            acquire_lock(&self.backend).rollback()?;
            *active = false;
        }
        Ok(())
    }

    fn finish(&self, commit: bool) -> Result<()> {
        let mut active = acquire_lock(&self.tx_active);
        if !*active {
            // Already finished elsewhere (e.g. a provider close rolled the
            // shared transaction back).
            return Ok(());
        }
        let mut backend = acquire_lock(&self.backend);
        let result = if commit { backend.commit() } else { backend.rollback() };
        if commit && result.is_err() {
            // Best-effort rollback so a failed commit cannot leave the
            // shared session stuck inside a transaction.
            if let Err(e) = backend.rollback() {
                tracing::warn!(error = %e, "rollback after failed commit also failed");
            }
        }
        *active = false;
        result
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// RAII transaction guard returned by [`Session::begin_scope`].
///
/// A scope that joined an already-active transaction is a no-op on commit,
/// rollback, and drop; control of the physical transaction stays with the
/// outermost scope.
#[must_use = "dropping an owning scope without commit rolls the transaction back"]
pub struct TransactionScope<'a> {
    session: &'a Session,
    owns: bool,
    done: bool,
}

impl TransactionScope<'_> {
    /// True when this scope issued the `BEGIN` (and thus controls the
    /// transaction's fate).
    #[must_use]
    pub const fn owns_transaction(&self) -> bool {
        self.owns
    }

    /// Commits the transaction (owning scopes only; joined scopes are a
    /// no-op).
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        if self.owns {
            self.session.finish(true)
        } else {
            Ok(())
        }
    }

    /// Rolls the transaction back (owning scopes only; joined scopes are a
    /// no-op).
    pub fn rollback(mut self) -> Result<()> {
        self.done = true;
        if self.owns {
            self.session.finish(false)
        } else {
            Ok(())
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if self.owns && !self.done {
            if let Err(e) = self.session.finish(false) {
                tracing::warn!(error = %e, "implicit rollback on dropped transaction scope failed");
            }
        }
    }
}

/// Owns the one physical session per process and the entity registry.
///
/// The manager is the explicit application-lifecycle object: the host
/// application constructs it (usually behind an `Arc` shared by every
/// logical provider), and tears it down through [`SessionManager::shutdown`]
/// on its normal shutdown path.
pub struct SessionManager {
    config: ConnectionConfig,
    state: Mutex<ManagerState>,
}

struct ManagerState {
    registry: EntityRegistry,
    session: Option<Arc<Session>>,
}

impl SessionManager {
    /// Creates a manager for the given connection configuration.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ManagerState {
                registry: EntityRegistry::new(),
                session: None,
            }),
        }
    }

    /// The configured dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// The connection configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Registers an entity descriptor.
    ///
    /// Must happen before the first session use: the registry freezes when
    /// the physical session is built.
    ///
    /// # Errors
    ///
    /// Rejects registration after the session exists, and duplicate entity
    /// names.
    pub fn register_entity(&self, descriptor: EntityDescriptor) -> Result<()> {
        let mut state = acquire_lock(&self.state);
        if state.session.is_some() {
            return Err(Error::OperationFailed {
                operation: "register_entity".to_string(),
                cause: format!(
                    "session already initialized; register '{}' before first use",
                    descriptor.name()
                ),
            });
        }
        state.registry.register(descriptor)
    }

    /// Looks up a registered entity descriptor by name.
    pub fn entity(&self, name: &str) -> Result<EntityDescriptor> {
        acquire_lock(&self.state).registry.require(name).cloned()
    }

    /// Returns a snapshot of the registry.
    #[must_use]
    pub fn registry(&self) -> EntityRegistry {
        acquire_lock(&self.state).registry.clone()
    }

    /// Returns the shared session, creating it on first use.
    ///
    /// Creation connects the dialect's backend, applies SQLite pragma
    /// tuning, freezes the registry, and runs additive DDL synchronization
    /// from the registered descriptors — all under the manager's state
    /// lock, so exactly one physical session ever exists per manager.
    pub fn session(&self) -> Result<Arc<Session>> {
        let mut state = acquire_lock(&self.state);
        if let Some(session) = &state.session {
            return Ok(Arc::clone(session));
        }

        // The migration ledger is always part of the schema.
        if state.registry.get(crate::migrate::LEDGER_TABLE).is_none() {
            state.registry.register(crate::migrate::ledger_descriptor()?)?;
        }

        let backend = open_backend(&self.config)?;
        let session = Arc::new(Session::new(backend));

        crate::schema::sync::synchronize(&session, &state.registry)?;

        tracing::info!(
            dialect = %self.config.dialect,
            url = %self.config.display_url(),
            entities = state.registry.len(),
            "session created"
        );

        state.session = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Returns the session if one has already been created, without
    /// creating it.
    #[must_use]
    pub fn current_session(&self) -> Option<Arc<Session>> {
        acquire_lock(&self.state).session.clone()
    }

    /// Process-shutdown teardown: rolls back any active transaction,
    /// releases the physical session, and resets the one-time
    /// initialization state so a subsequent `session()` call would rebuild
    /// from scratch.
    ///
    /// Outstanding session handles observe the closed flag and fail with
    /// [`Error::ProviderNotInitialized`].
    pub fn shutdown(&self) {
        let mut state = acquire_lock(&self.state);
        if let Some(session) = state.session.take() {
            if let Err(e) = session.rollback_active() {
                tracing::warn!(error = %e, "rollback during shutdown failed");
            }
            session.close();
            tracing::info!(dialect = %self.config.dialect, "session shut down");
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("dialect", &self.config.dialect)
            .finish_non_exhaustive()
    }
}

fn open_backend(config: &ConnectionConfig) -> Result<Box<dyn SqlBackend>> {
    match config.dialect {
        Dialect::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                Ok(Box::new(crate::session::sqlite::SqliteBackend::open(config)?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                Err(backend_missing("sqlite"))
            }
        },
        Dialect::Mysql => {
            #[cfg(feature = "mysql")]
            {
                Ok(Box::new(crate::session::mysql::MysqlBackend::open(config)?))
            }
            #[cfg(not(feature = "mysql"))]
            {
                Err(backend_missing("mysql"))
            }
        },
        Dialect::Postgres => {
            #[cfg(feature = "postgres")]
            {
                Ok(Box::new(crate::session::postgres::PostgresBackend::open(
                    config,
                )?))
            }
            #[cfg(not(feature = "postgres"))]
            {
                Err(backend_missing("postgres"))
            }
        },
    }
}

#[allow(dead_code)]
fn backend_missing(feature: &str) -> Error {
    Error::OperationFailed {
        operation: "open_session".to_string(),
        cause: format!("backend for dialect '{feature}' not compiled in (enable the '{feature}' feature)"),
    }
}
