//! Reactive, cache-backed normalized model store.
//!
//! The [`Store`] turns model definitions into immutable instances, keeps one
//! cached instance per entity, and routes reads and writes through the
//! optional storage hooks of each definition.
//!
//! # Key Types
//!
//! - [`Store`] — the runtime: `get`, `get_list`, `set`, `sync`, `sync_list`, `resolve`
//! - [`Entry`] — what a read returns: ready, pending on a deferred hook, or a
//!   cached failure
//! - [`WriteHandle`] — future settled when a write has been stored
//! - [`StoreConfig`] — tuning knobs, loadable from TOML
//!
//! # Design Rules
//!
//! 1. At most one hook call is in flight per cache key; concurrent readers
//!    share the pending entry.
//! 2. A deferred hook call that fails is cached. Readers see the failure
//!    until a write or an explicit sync replaces the entry.
//! 3. An entity referenced from many places is stored once. Nested
//!    id-addressed values are held as [`Reference`]s and resolved on access,
//!    so every holder observes the latest version.
//! 4. Definition errors, argument errors and hooks failing synchronously are
//!    returned by the call that triggers them. Only deferred outcomes travel
//!    through entries and write handles.

pub mod config;
pub mod entry;
pub mod error;
mod factory;
pub mod registry;
pub mod store;

pub use config::StoreConfig;
pub use entry::{CacheKey, Entry, PendingEntry, Target, WriteHandle};
pub use error::{StoreError, StoreResult};
pub use registry::IdentityRegistry;
pub use store::Store;

pub use tessera_model::{
    Connection, Data, FieldValue, Instance, ListItem, ModelDefinition, ModelList, Reference,
    Reply, StorageAdapter,
};
pub use tessera_types::Parameters;
