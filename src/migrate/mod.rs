//! Migration engine.
//!
//! Maintains an append-only ledger of applied migration ids, decides which
//! registered migrations must run, and executes them in registration order,
//! each inside its own transaction with its ledger row committed atomically
//! alongside its effect.
//!
//! A migration failure rolls back that migration's transaction, is logged,
//! and execution continues with the next migration: startup availability is
//! deliberately traded against fail-fast here, so a broken data
//! transformation never keeps the process from booting.

pub mod introspect;

use crate::schema::{EntityDescriptor, FieldType};
use crate::schema::sync::create_table_sql;
use crate::session::Session;
use crate::value::{self, SqlValue};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Name of the persisted migration ledger table.
pub const LEDGER_TABLE: &str = "anysql_migrations";

/// The ledger's entity descriptor.
///
/// Always registered, so DDL synchronization creates the table alongside
/// application entities; the runner still ensures it exists before the
/// first lookup in case migrations run against a pre-sync database.
pub fn ledger_descriptor() -> Result<EntityDescriptor> {
    EntityDescriptor::builder(LEDGER_TABLE)
        .primary_key("id", FieldType::Text)
        .field("description", FieldType::Text)
        .field("executed_at", FieldType::Timestamp)
        .build()
}

/// One ledger row: a successfully applied migration.
///
/// Created only by the runner, never mutated, never deleted by normal
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// The migration's stable, unique id.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// When the migration was applied.
    pub executed_at: DateTime<Utc>,
}

/// A versioned schema or data change.
///
/// Implementations are registered in a fixed order before first session
/// use; the runner never reorders the registration list, only filters it.
pub trait Migration: Send + Sync {
    /// Stable, unique identifier; the ledger key.
    fn id(&self) -> &str;

    /// What this migration does.
    fn description(&self) -> &str;

    /// Whether the migration is needed (e.g. a column is missing).
    ///
    /// Consulted only when the ledger has no entry for [`Migration::id`];
    /// idempotency takes precedence over re-evaluation.
    fn should_run(&self, session: &Session) -> Result<bool>;

    /// Applies the migration.
    fn execute(&self, session: &Session) -> Result<()>;
}

/// Runs registered migrations in order, tracking them in the ledger.
pub struct MigrationRunner {
    state: Mutex<RunnerState>,
}

struct RunnerState {
    migrations: Vec<Box<dyn Migration>>,
    migrations_run: bool,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    /// Creates an empty runner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RunnerState {
                migrations: Vec::new(),
                migrations_run: false,
            }),
        }
    }

    /// Registers a migration. Order of registration is execution order.
    ///
    /// # Errors
    ///
    /// Rejects registration after [`MigrationRunner::run`] has executed,
    /// and duplicate migration ids.
    pub fn register(&self, migration: Box<dyn Migration>) -> Result<()> {
        let mut state = crate::session::acquire_lock(&self.state);
        if state.migrations_run {
            return Err(Error::OperationFailed {
                operation: "register_migration".to_string(),
                cause: format!(
                    "migrations already ran; register '{}' before first session use",
                    migration.id()
                ),
            });
        }
        if state.migrations.iter().any(|m| m.id() == migration.id()) {
            return Err(Error::OperationFailed {
                operation: "register_migration".to_string(),
                cause: format!("duplicate migration id '{}'", migration.id()),
            });
        }
        state.migrations.push(migration);
        Ok(())
    }

    /// Registers several migrations, in order.
    pub fn register_all(
        &self,
        migrations: impl IntoIterator<Item = Box<dyn Migration>>,
    ) -> Result<()> {
        for migration in migrations {
            self.register(migration)?;
        }
        Ok(())
    }

    /// The registered migration ids, in registration order.
    #[must_use]
    pub fn registered_ids(&self) -> Vec<String> {
        crate::session::acquire_lock(&self.state)
            .migrations
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    /// Drops all registered migrations.
    ///
    /// # Errors
    ///
    /// Rejected after the runner has executed.
    pub fn clear(&self) -> Result<()> {
        let mut state = crate::session::acquire_lock(&self.state);
        if state.migrations_run {
            return Err(Error::OperationFailed {
                operation: "clear_migrations".to_string(),
                cause: "migrations already ran".to_string(),
            });
        }
        state.migrations.clear();
        Ok(())
    }

    /// True once [`MigrationRunner::run`] has completed in this process.
    #[must_use]
    pub fn has_run(&self) -> bool {
        crate::session::acquire_lock(&self.state).migrations_run
    }

    /// Runs every registered migration that must run.
    ///
    /// Idempotent at the process level: a second invocation observes the
    /// run flag and performs no work. Per migration id the ledger decides:
    /// a recorded id is skipped unconditionally; otherwise `should_run`
    /// gates execution. Eligible migrations execute strictly in
    /// registration order, each in its own transaction scope with its
    /// ledger row, and a failure is contained to that migration.
    ///
    /// # Errors
    ///
    /// Only infrastructure failures surface (ledger table creation);
    /// individual migration failures are logged and contained.
    pub fn run(&self, session: &Session) -> Result<()> {
        let mut state = crate::session::acquire_lock(&self.state);
        if state.migrations_run {
            tracing::debug!("migrations already ran in this process");
            return Ok(());
        }

        if !state.migrations.is_empty() {
            self.ensure_ledger(session)?;
            self.run_pending(session, &state.migrations);
        }

        state.migrations_run = true;
        Ok(())
    }

    /// Creates the ledger table with dialect-appropriate DDL if absent.
    fn ensure_ledger(&self, session: &Session) -> Result<()> {
        if introspect::table_exists(session, LEDGER_TABLE) {
            return Ok(());
        }
        let ledger = ledger_descriptor()?;
        session.execute(&create_table_sql(session.dialect(), &ledger), &[])?;
        tracing::info!(table = LEDGER_TABLE, "created migration ledger");
        Ok(())
    }

    fn run_pending(&self, session: &Session, migrations: &[Box<dyn Migration>]) {
        // Phase 1: filter. The ledger check comes first; should_run is
        // consulted only for unrecorded ids.
        let mut eligible = Vec::new();
        for migration in migrations {
            if is_applied(session, migration.id()) {
                tracing::debug!(id = migration.id(), "migration already applied, skipping");
                continue;
            }
            match migration.should_run(session) {
                Ok(true) => eligible.push(migration),
                Ok(false) => {
                    tracing::debug!(id = migration.id(), "migration not needed, skipping");
                },
                Err(e) => {
                    // A broken eligibility check is contained like a broken
                    // body: logged, skipped, startup continues.
                    metrics::counter!("anysql_migrations_failed_total").increment(1);
                    tracing::error!(id = migration.id(), error = %e, "should_run check failed");
                },
            }
        }

        // Phase 2: execute in registration order, one transaction each.
        for migration in eligible {
            if let Err(e) = self.apply(session, migration.as_ref()) {
                metrics::counter!("anysql_migrations_failed_total").increment(1);
                tracing::error!(
                    id = migration.id(),
                    error = %e,
                    "migration failed, continuing with next"
                );
            }
        }
    }

    fn apply(&self, session: &Session, migration: &dyn Migration) -> Result<()> {
        let scope = session.begin_scope()?;

        let result = migration
            .execute(session)
            .and_then(|()| mark_applied(session, migration));

        match result {
            Ok(()) => {
                scope.commit().map_err(|e| Error::Migration {
                    id: migration.id().to_string(),
                    cause: e.to_string(),
                })?;
                metrics::counter!("anysql_migrations_applied_total").increment(1);
                tracing::info!(
                    id = migration.id(),
                    description = migration.description(),
                    "applied migration"
                );
                Ok(())
            },
            Err(e) => {
                if let Err(rollback_err) = scope.rollback() {
                    tracing::warn!(
                        id = migration.id(),
                        error = %rollback_err,
                        "rollback after failed migration also failed"
                    );
                }
                Err(Error::Migration {
                    id: migration.id().to_string(),
                    cause: e.to_string(),
                })
            },
        }
    }

    /// Reads the ledger.
    pub fn applied(&self, session: &Session) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT id, description, executed_at FROM {LEDGER_TABLE} ORDER BY executed_at, id"
        );
        let rows = session.query(&sql, &[])?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let text = |column: &str| -> String {
                row.get(column)
                    .map(SqlValue::render)
                    .unwrap_or_default()
            };
            let executed_at = row
                .get("executed_at")
                .cloned()
                .unwrap_or(SqlValue::Null);
            let executed_at =
                match value::decode("executed_at", FieldType::Timestamp, executed_at)? {
                    SqlValue::Timestamp(ts) => ts,
                    _ => DateTime::<Utc>::UNIX_EPOCH,
                };
            records.push(MigrationRecord {
                id: text("id"),
                description: text("description"),
                executed_at,
            });
        }
        Ok(records)
    }
}

impl std::fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("registered", &self.registered_ids())
            .field("migrations_run", &self.has_run())
            .finish()
    }
}

/// Ledger lookup for one migration id. Never errors: a failed lookup (for
/// example, a missing ledger table) reports "not applied".
fn is_applied(session: &Session, id: &str) -> bool {
    if !introspect::table_exists(session, LEDGER_TABLE) {
        return false;
    }
    let placeholder = session.dialect().placeholder(1);
    let sql = format!("SELECT id FROM {LEDGER_TABLE} WHERE id = {placeholder}");
    session
        .query(&sql, &[SqlValue::Text(id.to_string())])
        .map(|rows| !rows.is_empty())
        .unwrap_or(false)
}

/// Appends the ledger row, re-checking "already applied" first so a second
/// call path can never double-insert.
fn mark_applied(session: &Session, migration: &dyn Migration) -> Result<()> {
    if is_applied(session, migration.id()) {
        return Ok(());
    }
    let dialect = session.dialect();
    let sql = format!(
        "INSERT INTO {LEDGER_TABLE} (id, description, executed_at) VALUES ({}, {}, {})",
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3),
    );
    session.execute(
        &sql,
        &[
            SqlValue::Text(migration.id().to_string()),
            SqlValue::Text(migration.description().to_string()),
            SqlValue::Timestamp(Utc::now()),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
#[cfg(feature = "sqlite")]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::session::SessionManager;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestMigration {
        id: String,
        should_run: bool,
        fail: bool,
        executions: Arc<AtomicUsize>,
    }

    impl TestMigration {
        fn make(
            id: &str,
            should_run: bool,
            fail: bool,
            executions: &Arc<AtomicUsize>,
        ) -> Box<Self> {
            Box::new(Self {
                id: id.to_string(),
                should_run,
                fail,
                executions: Arc::clone(executions),
            })
        }

        fn new(id: &str, executions: &Arc<AtomicUsize>) -> Box<Self> {
            Self::make(id, true, false, executions)
        }

        fn skipped(id: &str, executions: &Arc<AtomicUsize>) -> Box<Self> {
            Self::make(id, false, false, executions)
        }

        fn failing(id: &str, executions: &Arc<AtomicUsize>) -> Box<Self> {
            Self::make(id, true, true, executions)
        }
    }

    impl Migration for TestMigration {
        fn id(&self) -> &str {
            &self.id
        }

        fn description(&self) -> &str {
            "test migration"
        }

        fn should_run(&self, _session: &Session) -> crate::Result<bool> {
            Ok(self.should_run)
        }

        fn execute(&self, session: &Session) -> crate::Result<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            // Leave a visible mark so rollback can be observed.
            session.execute(
                "INSERT INTO marks (migration_id) VALUES (?)",
                &[SqlValue::Text(self.id.clone())],
            )?;
            if self.fail {
                return Err(Error::OperationFailed {
                    operation: "test_migration".to_string(),
                    cause: "deliberate failure".to_string(),
                });
            }
            Ok(())
        }
    }

    fn session() -> Arc<Session> {
        let session = SessionManager::new(ConnectionConfig::sqlite_in_memory())
            .session()
            .unwrap();
        session
            .execute("CREATE TABLE marks (migration_id TEXT)", &[])
            .unwrap();
        session
    }

    fn marks(session: &Session) -> Vec<String> {
        session
            .query("SELECT migration_id FROM marks ORDER BY rowid", &[])
            .unwrap()
            .into_iter()
            .map(|row| row.get("migration_id").map(SqlValue::render).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_run_is_idempotent_per_process() {
        let session = session();
        let executions = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("m1", &executions)).unwrap();

        runner.run(&session).unwrap();
        runner.run(&session).unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(runner.has_run());
        assert_eq!(runner.applied(&session).unwrap().len(), 1);
    }

    #[test]
    fn test_ledger_survives_process_restart() {
        let session = session();
        let executions = Arc::new(AtomicUsize::new(0));

        let first = MigrationRunner::new();
        first.register(TestMigration::new("m1", &executions)).unwrap();
        first.run(&session).unwrap();

        // A fresh runner on the same database: the ledger, not the process
        // flag, prevents re-execution.
        let second = MigrationRunner::new();
        second.register(TestMigration::new("m1", &executions)).unwrap();
        second.run(&session).unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        let applied = second.applied(&session).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].id, "m1");
        assert_eq!(applied[0].description, "test migration");
    }

    #[test]
    fn test_should_run_false_skips_without_ledger_entry() {
        let session = session();
        let executions = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("m1", &executions)).unwrap();
        runner.register(TestMigration::skipped("m2", &executions)).unwrap();
        runner.register(TestMigration::new("m3", &executions)).unwrap();
        runner.run(&session).unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(marks(&session), vec!["m1", "m3"]);

        let ids: Vec<String> = runner
            .applied(&session)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(ids.contains(&"m1".to_string()));
        assert!(!ids.contains(&"m2".to_string()));
        assert!(ids.contains(&"m3".to_string()));
    }

    #[test]
    fn test_failure_is_contained_and_rolled_back() {
        let session = session();
        let executions = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("m1", &executions)).unwrap();
        runner.register(TestMigration::failing("m2", &executions)).unwrap();
        runner.register(TestMigration::new("m3", &executions)).unwrap();

        // Failure of m2 is not fatal to the run.
        runner.run(&session).unwrap();

        assert_eq!(executions.load(Ordering::SeqCst), 3);
        // m2's partial work was rolled back; m1 and m3 committed.
        assert_eq!(marks(&session), vec!["m1", "m3"]);

        let ids: Vec<String> = runner
            .applied(&session)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"m2".to_string()));
        // No transaction is left open on the shared session.
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_registration_after_run_rejected() {
        let session = session();
        let executions = Arc::new(AtomicUsize::new(0));

        let runner = MigrationRunner::new();
        runner.run(&session).unwrap();

        let err = runner
            .register(TestMigration::new("late", &executions))
            .unwrap_err();
        assert!(err.to_string().contains("already ran"));
        assert!(runner.clear().is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let executions = Arc::new(AtomicUsize::new(0));
        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("m1", &executions)).unwrap();
        let err = runner
            .register(TestMigration::new("m1", &executions))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate migration id"));
    }

    #[test]
    fn test_registered_ids_preserve_order() {
        let executions = Arc::new(AtomicUsize::new(0));
        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("b", &executions)).unwrap();
        runner.register(TestMigration::new("a", &executions)).unwrap();
        assert_eq!(runner.registered_ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_ledger_created_on_demand() {
        let session = session();
        assert!(!introspect::table_exists(&session, LEDGER_TABLE));

        let executions = Arc::new(AtomicUsize::new(0));
        let runner = MigrationRunner::new();
        runner.register(TestMigration::new("m1", &executions)).unwrap();
        runner.run(&session).unwrap();

        assert!(introspect::table_exists(&session, LEDGER_TABLE));
    }
}
