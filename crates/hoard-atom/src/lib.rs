//! Deduplicating atom store for the hoard content cache.
//!
//! Every header block, status message and body fragment the cache keeps is
//! interned here as an [`Atom`]: an immutable, length-explicit byte buffer
//! shared by all holders of identical content.
//!
//! # Design Rules
//!
//! 1. For any live content value at most one atom exists per store.
//! 2. Cloning an [`Atom`] retains it; dropping it releases it. The atom is
//!    unlinked from the store exactly when its refcount reaches zero.
//! 3. Pinned atoms (refcount in the [`PINNED_REFCOUNT`] range) are never
//!    released.
//! 4. Allocation failure surfaces as [`AtomError::OutOfMemory`].
//! 5. The store is single-threaded: handles are `!Send` by construction.

pub mod error;
pub mod hasher;
pub mod list;
pub mod store;

pub use error::{AtomError, AtomResult};
pub use hasher::AtomHasher;
pub use list::AtomList;
pub use store::{atom_str, Atom, AtomStore, NULL_ATOM_STR, PINNED_REFCOUNT};
