//! Foundation types for the Tessera model store.
//!
//! This crate holds the leaf pieces every other Tessera crate builds on. None
//! of them know about model definitions or caching.
//!
//! # Key Types
//!
//! - [`Kind`] / [`Primitive`] — scalar field kinds and the coercion rules between them
//! - [`Parameters`] — lookup parameters and their canonical cache id
//! - [`identifier::generate`] — random identifiers for new entities
//! - [`BoxFuture`] — the boxed future type used for deferred adapter replies

pub mod error;
pub mod identifier;
pub mod kind;
pub mod parameters;

use std::future::Future;
use std::pin::Pin;

pub use error::{ValueError, ValueResult};
pub use kind::{format_number, Kind, Primitive};
pub use parameters::Parameters;

/// An owned, sendable, type-erased future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
