//! Foundation types for the hoard content cache.
//!
//! This crate provides the addressing and policy vocabulary shared by every
//! other hoard crate.
//!
//! # Key Types
//!
//! - [`ObjectType`]: resource kind tag (network fetch vs. resolved name)
//! - [`CacheKey`]: type-tagged, length-explicit key bytes
//! - [`Directives`]: Cache-Control directive bitset (RFC 2616 §14.9)
//! - [`CacheControl`]: directives plus numeric `max-age`/`s-maxage`/`min-fresh`/`max-stale`

pub mod control;
pub mod error;
pub mod key;

pub use control::{CacheControl, Directives};
pub use error::TypeError;
pub use key::{CacheKey, ObjectType, MAX_KEY_LEN};
