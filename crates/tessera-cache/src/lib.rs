//! Memoization cache for the Tessera model store.
//!
//! The store treats this crate as its source of truth for computed values.
//! Every key holds a [`Slot`]: either a settled value or a [`Pending`] handle
//! for a computation that has not finished yet.
//!
//! # Contract
//!
//! 1. A miss runs the compute function exactly once. Concurrent lookups of
//!    the same key observe the same pending slot instead of recomputing.
//! 2. A computation settles through its [`Resolver`]. Settling always
//!    overwrites the slot (last writer wins).
//! 3. A resolver dropped without settling releases its slot so the next
//!    lookup computes again. Waiters see [`CacheError::Abandoned`].
//! 4. [`MemoCache::set`] stores a value explicitly, replacing an existing
//!    slot only when forced.
//! 5. The cache never evicts on its own.

pub mod error;
pub mod memo;

pub use error::{CacheError, CacheResult};
pub use memo::{MemoCache, Pending, Resolver, Slot};
