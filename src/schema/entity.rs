//! Entity descriptors.
//!
//! The descriptor table is the static substitute for runtime reflection:
//! every field an entity can store is declared once, with its semantic type
//! and primary-key flag, and all coercion and predicate compilation consult
//! this table. Descriptors are immutable once built.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Semantic field types an entity descriptor can declare.
///
/// Each dialect maps these onto its own column types; see
/// [`crate::session::Dialect::column_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Unbounded text.
    Text,
    /// UUID; stored as hyphenated text on engines without a native type.
    Uuid,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Boolean.
    Boolean,
    /// Point in time; stored as epoch milliseconds on SQLite and as a
    /// native datetime on MySQL/PostgreSQL.
    Timestamp,
}

/// A single storable field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field (column) name.
    pub name: String,
    /// Semantic type.
    pub field_type: FieldType,
    /// Whether this field is the entity's primary key.
    pub primary_key: bool,
}

/// Static metadata describing an entity's storable fields.
///
/// Built once per entity type via [`EntityDescriptor::builder`] and owned by
/// the registry that both the query executor and the migration engine read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Starts building a descriptor for the named entity (table).
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityDescriptorBuilder {
        EntityDescriptorBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// The entity (table) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered field set.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field by name, raising [`Error::FieldNotFound`] otherwise.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.field(name).ok_or_else(|| Error::FieldNotFound {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Resolves the primary-key field.
    ///
    /// Resolution order: the field carrying the explicit primary-key flag,
    /// then a field literally named `uuid`, then one literally named `id`.
    #[must_use]
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .or_else(|| self.field("uuid"))
            .or_else(|| self.field("id"))
    }

    /// The ordered column-name list, used for SELECT projections and DDL.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Builder for [`EntityDescriptor`].
#[derive(Debug)]
pub struct EntityDescriptorBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl EntityDescriptorBuilder {
    /// Adds a plain field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            field_type,
            primary_key: false,
        });
        self
    }

    /// Adds the primary-key field.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            field_type,
            primary_key: true,
        });
        self
    }

    /// Finalizes the descriptor.
    ///
    /// # Errors
    ///
    /// Rejects descriptors with no fields, duplicate field names, or more
    /// than one primary-key flag.
    pub fn build(self) -> Result<EntityDescriptor> {
        let invalid = |cause: String| Error::OperationFailed {
            operation: format!("build_descriptor '{}'", self.name),
            cause,
        };

        if self.fields.is_empty() {
            return Err(invalid("descriptor has no fields".to_string()));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
        }

        if self.fields.iter().filter(|f| f.primary_key).count() > 1 {
            return Err(invalid("more than one primary-key field".to_string()));
        }

        Ok(EntityDescriptor {
            name: self.name,
            fields: self.fields,
        })
    }
}
