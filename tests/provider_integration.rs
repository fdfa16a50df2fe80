//! End-to-end tests for the provider surface against SQLite.
//!
//! These exercise the full stack: registration, lazy session creation with
//! DDL synchronization, migration execution, predicate compilation, and
//! row decoding.

#![cfg(feature = "sqlite")]

use anysql::{
    ConnectionConfig, DatabaseProvider, EntityDescriptor, Error, FieldType, FindOptions, Migration,
    Operator, Session, SqlValue, Value, WhereClause,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

fn account_descriptor() -> EntityDescriptor {
    EntityDescriptor::builder("accounts")
        .primary_key("uuid", FieldType::Uuid)
        .field("name", FieldType::Text)
        .field("age", FieldType::Integer)
        .field("active", FieldType::Boolean)
        .field("created_at", FieldType::Timestamp)
        .build()
        .unwrap()
}

fn provider_with_accounts(config: ConnectionConfig) -> DatabaseProvider {
    let provider = DatabaseProvider::new(config);
    provider.register_entity(account_descriptor()).unwrap();
    provider
}

fn create_account(provider: &DatabaseProvider, id: Uuid, name: &str, age: i32, active: bool) {
    provider
        .create(
            "accounts",
            &[
                ("uuid", Value::from(id)),
                ("name", Value::from(name)),
                ("age", Value::from(age)),
                ("active", Value::from(active)),
                ("created_at", Value::from(chrono::Utc::now())),
            ],
        )
        .unwrap();
}

#[test]
fn round_trip_equality_find() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let alice = Uuid::new_v4();
    create_account(&provider, alice, "alice", 30, true);
    create_account(&provider, Uuid::new_v4(), "bob", 41, false);

    // Query with the same field values the row was created with.
    let clause = WhereClause::new()
        .field("name", "alice")
        .field("age", 30)
        .field("active", true);
    let rows = provider.find_all("accounts", &clause.into()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("uuid"), Some(&SqlValue::Uuid(alice)));
}

#[test]
fn scenario_find_by_primary_key_and_not_found() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let id = Uuid::new_v4();
    create_account(&provider, id, "alice", 30, true);

    let row = provider.find_by_pk("accounts", id).unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&SqlValue::Text("alice".to_string())));

    // findOne with no match is None, never an error.
    let missing = provider
        .find_one("accounts", &FindOptions::where_field("name", "bob"))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn or_with_all_null_values_matches_nothing() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    create_account(&provider, Uuid::new_v4(), "alice", 30, true);

    let options = FindOptions::where_operator(Operator::or_fields(vec![
        ("name", Value::Null),
        ("age", Value::Null),
    ]));
    let rows = provider.find_all("accounts", &options).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn find_one_is_limited_to_one_row() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    for _ in 0..5 {
        create_account(&provider, Uuid::new_v4(), "alice", 30, true);
    }

    let row = provider
        .find_one("accounts", &FindOptions::where_field("name", "alice"))
        .unwrap();
    assert!(row.is_some());

    let rows = provider
        .find_all(
            "accounts",
            &FindOptions::where_field("name", "alice").with_limit(1),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn boolean_coercion_from_string_tokens() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    create_account(&provider, Uuid::new_v4(), "alice", 30, true);
    create_account(&provider, Uuid::new_v4(), "bob", 41, false);

    for token in ["true", "TRUE", "1"] {
        let rows = provider
            .find_all("accounts", &FindOptions::where_field("active", token))
            .unwrap();
        assert_eq!(rows.len(), 1, "token {token:?}");
        assert_eq!(
            rows[0].get("name"),
            Some(&SqlValue::Text("alice".to_string()))
        );
    }

    for token in ["false", "0"] {
        let rows = provider
            .find_all("accounts", &FindOptions::where_field("active", token))
            .unwrap();
        assert_eq!(rows.len(), 1, "token {token:?}");
        assert_eq!(rows[0].get("name"), Some(&SqlValue::Text("bob".to_string())));
    }
}

#[test]
fn non_numeric_string_against_integer_field_is_type_conversion_error() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let err = provider
        .find_all("accounts", &FindOptions::where_field("age", "abc"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::TypeConversion { ref field, ref value } if field == "age" && value == "abc"
    ));
}

#[test]
fn where_clause_from_json_input() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    create_account(&provider, Uuid::new_v4(), "alice", 30, true);
    create_account(&provider, Uuid::new_v4(), "bob", 41, false);
    create_account(&provider, Uuid::new_v4(), "carol", 52, true);

    let clause = WhereClause::from_json(&serde_json::json!({
        "$": {"or": [{"name": "alice"}, {"name": "bob", "active": true}]},
    }))
    .unwrap();
    // bob is inactive, so only the first group matches.
    let rows = provider.find_all("accounts", &clause.into()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("name"),
        Some(&SqlValue::Text("alice".to_string()))
    );
}

struct CountedMigration {
    id: &'static str,
    should_run: bool,
    fail: bool,
    executions: Arc<AtomicUsize>,
}

impl Migration for CountedMigration {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "integration test migration"
    }

    fn should_run(&self, _session: &Session) -> anysql::Result<bool> {
        Ok(self.should_run)
    }

    fn execute(&self, session: &Session) -> anysql::Result<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        session.execute(
            "INSERT INTO accounts (uuid, name) VALUES (?, ?)",
            &[
                SqlValue::Text(Uuid::new_v4().to_string()),
                SqlValue::Text(format!("seeded-by-{}", self.id)),
            ],
        )?;
        if self.fail {
            return Err(Error::OperationFailed {
                operation: "integration_migration".to_string(),
                cause: "deliberate failure".to_string(),
            });
        }
        Ok(())
    }
}

fn migration(
    id: &'static str,
    should_run: bool,
    fail: bool,
    executions: &Arc<AtomicUsize>,
) -> Box<CountedMigration> {
    Box::new(CountedMigration {
        id,
        should_run,
        fail,
        executions: Arc::clone(executions),
    })
}

#[test]
fn migration_ordering_and_should_run_filter() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let executions = Arc::new(AtomicUsize::new(0));

    provider
        .register_migrations([
            migration("m1", true, false, &executions) as Box<dyn Migration>,
            migration("m2", false, false, &executions),
            migration("m3", true, false, &executions),
        ])
        .unwrap();

    // First session use runs the migrations.
    let _ = provider.session().unwrap();
    assert_eq!(executions.load(Ordering::SeqCst), 2);

    let seeded: Vec<String> = provider
        .find_all("accounts", &FindOptions::new())
        .unwrap()
        .iter()
        .map(|row| row.get("name").map(SqlValue::render).unwrap_or_default())
        .collect();
    assert_eq!(seeded, vec!["seeded-by-m1", "seeded-by-m3"]);

    let applied: Vec<String> = provider
        .applied_migrations()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(applied.contains(&"m1".to_string()));
    assert!(!applied.contains(&"m2".to_string()));
    assert!(applied.contains(&"m3".to_string()));
}

#[test]
fn migration_failure_is_isolated() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let executions = Arc::new(AtomicUsize::new(0));

    provider
        .register_migrations([
            migration("m1", true, false, &executions) as Box<dyn Migration>,
            migration("m2", true, true, &executions),
            migration("m3", true, false, &executions),
        ])
        .unwrap();

    let _ = provider.session().unwrap();
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    // m2's insert was rolled back with its transaction; m1 and m3 stand.
    let seeded: Vec<String> = provider
        .find_all("accounts", &FindOptions::new())
        .unwrap()
        .iter()
        .map(|row| row.get("name").map(SqlValue::render).unwrap_or_default())
        .collect();
    assert_eq!(seeded, vec!["seeded-by-m1", "seeded-by-m3"]);

    let applied: Vec<String> = provider
        .applied_migrations()
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(applied.len(), 2);
    assert!(!applied.contains(&"m2".to_string()));
}

#[test]
fn migrations_execute_at_most_once_per_process() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    let executions = Arc::new(AtomicUsize::new(0));
    provider
        .register_migration(migration("m1", true, false, &executions))
        .unwrap();

    let _ = provider.session().unwrap();
    let _ = provider.session().unwrap();
    provider.migration_runner().run(&provider.session().unwrap()).unwrap();

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(provider.applied_migrations().unwrap().len(), 1);
}

#[test]
fn ledger_persists_across_providers_on_same_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db").to_string_lossy().into_owned();
    let executions = Arc::new(AtomicUsize::new(0));

    {
        let provider = provider_with_accounts(ConnectionConfig::sqlite(&path));
        provider
            .register_migration(migration("m1", true, false, &executions))
            .unwrap();
        let _ = provider.session().unwrap();
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        provider.shutdown();
    }

    // A fresh provider on the same file: the persisted ledger, not the
    // in-process flag, prevents re-execution.
    let provider = provider_with_accounts(ConnectionConfig::sqlite(&path));
    provider
        .register_migration(migration("m1", true, false, &executions))
        .unwrap();
    let _ = provider.session().unwrap();
    assert_eq!(executions.load(Ordering::SeqCst), 1);

    // Data written by the first provider's migration is still there.
    let rows = provider
        .find_all(
            "accounts",
            &FindOptions::where_field("name", "seeded-by-m1"),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn skip_and_limit_paginate() {
    let provider = provider_with_accounts(ConnectionConfig::sqlite_in_memory());
    for age in 0..10 {
        create_account(&provider, Uuid::new_v4(), "user", age, true);
    }

    let page = provider
        .find_all(
            "accounts",
            &FindOptions::new().with_limit(3).with_skip(4),
        )
        .unwrap();
    assert_eq!(page.len(), 3);
    let ages: Vec<_> = page
        .iter()
        .map(|row| row.get("age").cloned().unwrap())
        .collect();
    assert_eq!(
        ages,
        vec![SqlValue::Integer(4), SqlValue::Integer(5), SqlValue::Integer(6)]
    );
}
