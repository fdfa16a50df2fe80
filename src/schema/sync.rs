//! Additive DDL synchronization.
//!
//! Runs once at session-factory build time: every registered descriptor
//! gets its table created if absent, and any descriptor field missing from
//! an existing table is added with `ALTER TABLE ... ADD COLUMN`. Columns
//! and tables are never dropped — non-additive changes are the job of
//! hand-written migrations.

use crate::migrate::introspect;
use crate::schema::{EntityDescriptor, EntityRegistry};
use crate::session::Session;
use crate::{Dialect, Result};

/// Renders the CREATE TABLE statement for a descriptor.
#[must_use]
pub fn create_table_sql(dialect: Dialect, entity: &EntityDescriptor) -> String {
    let columns: Vec<String> = entity
        .fields()
        .iter()
        .map(|field| {
            let column_type = dialect.column_type(field);
            if field.primary_key {
                format!("{} {column_type} PRIMARY KEY", field.name)
            } else {
                format!("{} {column_type}", field.name)
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        entity.name(),
        columns.join(", ")
    )
}

/// Brings the database additively in line with the registered descriptors.
///
/// # Errors
///
/// Returns an error if a DDL statement fails; existence checks themselves
/// never error (absence is assumed on failure).
pub fn synchronize(session: &Session, registry: &EntityRegistry) -> Result<()> {
    let dialect = session.dialect();
    for entity in registry.iter() {
        if introspect::table_exists(session, entity.name()) {
            for field in entity.fields() {
                if !introspect::column_exists(session, entity.name(), &field.name) {
                    session.execute(&dialect.add_column_sql(entity.name(), field), &[])?;
                    tracing::info!(
                        table = entity.name(),
                        column = %field.name,
                        "added column"
                    );
                }
            }
        } else {
            session.execute(&create_table_sql(dialect, entity), &[])?;
            tracing::info!(table = entity.name(), "created table");
        }
    }
    Ok(())
}
