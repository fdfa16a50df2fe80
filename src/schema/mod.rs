//! Entity schema layer.
//!
//! Descriptors are the static, explicitly registered substitute for runtime
//! field reflection: the predicate compiler coerces against them, the query
//! executor projects from them, and [`sync`] derives additive DDL from
//! them at session build time.

pub mod entity;
pub mod registry;
pub mod sync;

pub use entity::{EntityDescriptor, EntityDescriptorBuilder, FieldDescriptor, FieldType};
pub use registry::EntityRegistry;
