//! Content cache engine for the hoard caching proxy.
//!
//! The [`Cache`] owns the object table, the atom store, the global counters
//! and the collaborators (clock, disk, scheduler). Each cacheable resource is
//! an [`Object`]: timing metadata, header atoms and a body stored in
//! fixed-size chunks, filled by a [`FetchHandler`] and read by consumers that
//! park [`Waiter`]s until data arrives.
//!
//! # Design Rules
//!
//! 1. Single-threaded and cooperative. Nothing blocks; waiting is a
//!    registered callback, woken synchronously by `notify` or `abort`.
//! 2. An object reachable through lookup is referenced by the table. An
//!    object removed from lookup (superseded, privatized, aborted) stays
//!    valid for its holders until the last handle is dropped.
//! 3. Fetch failures live on the object as status plus message, never as a
//!    propagated error. Errors are for resource exhaustion and misuse.
//! 4. Bytes already stored win: overlapping and repeated writes are
//!    idempotent.
//! 5. Time is supplied by a [`Clock`], never read ad hoc.
//!
//! ```rust
//! use hoard_cache::{Cache, CacheConfig, Visibility};
//! use hoard_types::CacheKey;
//!
//! let cache = Cache::new(CacheConfig::default()).unwrap();
//! let key = CacheKey::http("http://example.org/").unwrap();
//! let object = cache.find_or_create(key.clone(), Visibility::Public, None).unwrap();
//! object.set_length(Some(5));
//! object.add_data(0, b"hello").unwrap();
//! assert!(object.has_data(0, 5));
//! assert!(cache.find(&key).is_some());
//! ```

pub mod cache;
mod chunk;
pub mod clock;
pub mod config;
pub mod disk;
mod error_page;
pub mod error;
pub mod fetch;
pub mod object;
pub mod reclaim;
pub mod schedule;
pub mod status;
mod table;
mod waiter;

pub use cache::{Cache, CacheBuilder, CacheStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use disk::{DiskCache, DiskHandle, DiskLink, InMemoryDiskCache};
pub use error::{CacheError, CacheResult};
pub use fetch::{FetchHandler, FetchOp, FetchOutcome, FetchRequest, RequestHandle};
pub use object::{Object, WeakObject};
pub use reclaim::{ReclaimMode, ReclaimReport};
pub use schedule::{ManualScheduler, OnceTask, PeriodicTask, Scheduler, TimerId};
pub use status::{Completeness, Notification, ObjectStatus, Phase, Residency, Visibility};
pub use waiter::{Waiter, WaiterId};
