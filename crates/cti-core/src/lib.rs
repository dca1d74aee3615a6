//! Cross-domain Typed Identifiers: grammar, registry, schema inheritance and
//! compatibility checking.
//!
//! The crate is layered leaves-first, mirroring the acyclic dependency order
//! the whole workspace is built around: [`identifier`] and [`selector`] have
//! no dependents inside the crate; [`schema`] and [`merge`] build on them;
//! [`entity`] and [`registry`] own the merge engine; [`validate`] and
//! [`compat`] read a built [`registry::Registry`] but never mutate it.

pub mod compat;
pub mod entity;
pub mod error;
pub mod identifier;
pub mod merge;
pub mod registry;
pub mod schema;
pub mod selector;
pub mod validate;

pub use entity::{Entity, EntityInstance, EntityType};
pub use identifier::{Expression, Parser, ParserOptions};
pub use registry::Registry;
pub use schema::Schema;
