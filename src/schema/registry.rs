//! Entity registry.
//!
//! Write-once-then-read-only: descriptors are registered while the provider
//! is being configured, and the [`crate::SessionManager`] freezes the
//! registry when it builds the physical session. After that point the
//! registry is only read, by the query executor and the migration engine.

use crate::schema::EntityDescriptor;
use crate::{Error, Result};

/// The set of registered entity descriptors.
#[derive(Debug, Default, Clone)]
pub struct EntityRegistry {
    entities: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entities: Vec::new(),
        }
    }

    /// Registers a descriptor.
    ///
    /// # Errors
    ///
    /// Rejects a second descriptor with the same entity name.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        if self.get(descriptor.name()).is_some() {
            return Err(Error::OperationFailed {
                operation: "register_entity".to_string(),
                cause: format!("entity '{}' already registered", descriptor.name()),
            });
        }
        self.entities.push(descriptor);
        Ok(())
    }

    /// Looks up a descriptor by entity name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.name() == name)
    }

    /// Looks up a descriptor, raising [`Error::EntityNotRegistered`]
    /// otherwise.
    pub fn require(&self, name: &str) -> Result<&EntityDescriptor> {
        self.get(name).ok_or_else(|| Error::EntityNotRegistered {
            entity: name.to_string(),
        })
    }

    /// Iterates the registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter()
    }

    /// The number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// True when no descriptors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
