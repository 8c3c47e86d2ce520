//! Model definitions, instances and schema compilation for Tessera.
//!
//! A [`ModelDefinition`] declares a model by example: every field carries a
//! default value and the kind of that value decides what the field is. The
//! [`SchemaRegistry`] compiles a definition once into a [`Config`], a typed
//! description of every field ([`FieldKind`]) plus the storage hooks that back
//! it.
//!
//! # Key Types
//!
//! - [`ModelDefinition`] — identity-compared definition handle, built from a
//!   JSON shape or with [`DefinitionBuilder`]
//! - [`Connection`] / [`StorageAdapter`] — optional `get` / `set` / `list` hooks
//! - [`Data`] — dynamic input accepted when creating instances
//! - [`Instance`] — an immutable model value; nested values are shared
//!   between versions
//! - [`Reference`] / [`ModelList`] — explicit handles on id-addressed entities
//!
//! # Design Rules
//!
//! 1. Definitions are immutable once built. Identity, not structure, decides
//!    which compiled config a definition maps to.
//! 2. A definition with an `id` field is external: its instances are
//!    addressed by id and may be backed by a connection. Without `id` a
//!    definition is a self-contained singleton.
//! 3. Instances never change after construction. Updates build a new
//!    instance that reuses untouched branches of the previous one.

pub mod connection;
pub mod data;
pub mod definition;
pub mod error;
pub mod instance;
pub mod schema;

pub use connection::{Connection, Hook, Reply, StorageAdapter};
pub use data::Data;
pub use definition::{ComputedFn, DefinitionBuilder, DefinitionId, FieldDecl, ModelDefinition};
pub use error::{AdapterError, AdapterResult, SchemaError, SchemaResult};
pub use instance::{
    FieldValue, Instance, InstanceBuilder, ListItem, ModelList, Reference, WeakInstance,
};
pub use schema::{Config, FieldKind, FieldSchema, Hooks, ListConfig, SchemaRegistry};
