//! The reclaimer.
//!
//! A sweep runs in two phases. The chunk phase writes public objects out to
//! disk, oldest first, and drops chunk buffers the disk copy covers until
//! chunk memory falls to the low mark. The object phase evicts public
//! objects in increasing access time (then size) until the public count
//! falls to the low mark.
//!
//! Only objects the table holds the sole reference to, with no locked
//! chunks and neither dynamic nor mutating, are evicted. A forced sweep
//! lifts the dynamic/mutating exemption, targets zero, and supersedes public
//! objects still in use instead of destroying them. Objects with locked
//! chunks are never touched, forced or not.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hoard_types::CacheKey;

use crate::cache::CacheShared;
use crate::object::Object;

/// How aggressive a sweep is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReclaimMode {
    /// Act only above the high watermarks, down to the low ones.
    Watermark,
    /// Resource exhaustion: write everything out and evict everything
    /// possible.
    Force,
}

/// What a sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Objects destroyed.
    pub evicted: usize,
    /// In-use objects removed from lookup instead.
    pub superseded: usize,
    /// Objects flushed to disk.
    pub written_out: usize,
    /// Net chunk buffer bytes released.
    pub chunk_bytes_freed: usize,
}

impl ReclaimReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct Candidate {
    key: CacheKey,
    atime: i64,
    size: usize,
    locked: bool,
    evictable: bool,
}

impl CacheShared {
    /// Run one sweep. Reentrant calls return an empty report.
    pub(crate) fn reclaim(&self, mode: ReclaimMode) -> ReclaimReport {
        if self.in_reclaim.replace(true) {
            debug!("reclaim already running");
            return ReclaimReport::default();
        }
        let force = mode == ReclaimMode::Force;
        let chunk_before = self.chunk_bytes.get();
        let mut report = ReclaimReport::default();

        let chunk_target = if force {
            Some(0)
        } else if self.chunk_bytes.get() > self.config.chunk_high_mark {
            Some(self.config.chunk_low_mark)
        } else {
            None
        };
        if let Some(target) = chunk_target {
            report.written_out = self.reclaim_chunks(target, force);
        }

        let public_target = if force {
            Some(0)
        } else if self.public_count.get() > self.config.public_high_mark {
            Some(self.config.public_low_mark)
        } else {
            None
        };
        if let Some(target) = public_target {
            let (evicted, superseded) = self.evict(target, force);
            report.evicted = evicted;
            report.superseded = superseded;
        }

        report.chunk_bytes_freed = chunk_before.saturating_sub(self.chunk_bytes.get());
        self.in_reclaim.set(false);

        if !report.is_empty() {
            info!(
                ?mode,
                evicted = report.evicted,
                superseded = report.superseded,
                written_out = report.written_out,
                chunk_bytes_freed = report.chunk_bytes_freed,
                public = self.public_count.get(),
                chunk_bytes = self.chunk_bytes.get(),
                "reclaim sweep finished"
            );
        }
        report
    }

    /// Evict down to `target` public objects regardless of the high mark.
    pub(crate) fn evict_down_to(&self, target: usize) -> usize {
        if self.in_reclaim.replace(true) {
            return 0;
        }
        let (evicted, _) = self.evict(target, false);
        self.in_reclaim.set(false);
        if evicted > 0 {
            info!(evicted, public = self.public_count.get(), "evicted to make room");
        }
        evicted
    }

    fn public_by_age(&self) -> Vec<Object> {
        let mut objects: Vec<Object> = self.table.borrow().iter().map(|(_, o)| o.clone()).collect();
        objects.sort_by_key(|o| (o.atime(), o.stored_bytes()));
        objects
    }

    /// Returns how many objects were written out.
    fn reclaim_chunks(&self, target: usize, force: bool) -> usize {
        let Ok(mut slot) = self.disk.try_borrow_mut() else {
            return 0;
        };
        let Some(disk) = slot.as_mut() else {
            return 0;
        };
        let mut written = 0;
        for object in self.public_by_age() {
            if self.chunk_bytes.get() <= target {
                break;
            }
            if !force && object.has_locked_chunks() {
                continue;
            }
            if object.stored_bytes() == 0 {
                continue;
            }
            if object.write_out(&mut **disk) {
                written += 1;
                object.discard_written_chunks();
            }
        }
        written
    }

    /// Returns `(evicted, superseded)`.
    fn evict(&self, target: usize, force: bool) -> (usize, usize) {
        let mut candidates: Vec<Candidate> = self
            .table
            .borrow()
            .iter()
            .map(|(key, object)| {
                let status = object.status();
                let locked = object.has_locked_chunks();
                Candidate {
                    key: key.clone(),
                    atime: object.atime(),
                    size: object.stored_bytes(),
                    locked,
                    evictable: object.refcount() == 1
                        && !locked
                        && (force || !(status.dynamic || status.mutating)),
                }
            })
            .collect();
        candidates.sort_by_key(|c| (c.atime, c.size));

        let (mut evicted, mut superseded) = (0, 0);
        for candidate in candidates {
            if self.public_count.get() <= target {
                break;
            }
            if candidate.evictable {
                let removed = self.table.borrow_mut().remove(&candidate.key);
                if removed.is_some() {
                    debug!(key = %candidate.key, "object evicted");
                    evicted += 1;
                }
            } else if force && !candidate.locked {
                let object = self.table.borrow().find(&candidate.key);
                if let Some(object) = object {
                    object.supersede();
                    superseded += 1;
                }
            }
        }
        (evicted, superseded)
    }
}
