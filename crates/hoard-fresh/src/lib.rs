//! Freshness evaluation for the hoard content cache.
//!
//! Given the timing metadata stored with a cached response and the
//! Cache-Control overrides of a request, decide whether the response is
//! stale and whether it must be revalidated before reuse (RFC 2616 §13.2,
//! §14.9).
//!
//! Every function here is pure: the current time is an argument, never read
//! from the system clock, so identical inputs always give identical answers.
//!
//! ```rust
//! use hoard_fresh::{CacheMetadata, FreshnessPolicy};
//! use hoard_types::CacheControl;
//!
//! let policy = FreshnessPolicy::default();
//! let meta = CacheMetadata {
//!     date: Some(1_000),
//!     control: CacheControl::none().max_age(10),
//!     ..CacheMetadata::default()
//! };
//! assert!(!policy.is_stale(&meta, &CacheControl::none(), 1_005));
//! assert!(policy.is_stale(&meta, &CacheControl::none(), 1_015));
//! ```

pub mod evaluator;
pub mod metadata;
pub mod policy;

pub use evaluator::Freshness;
pub use metadata::CacheMetadata;
pub use policy::FreshnessPolicy;
