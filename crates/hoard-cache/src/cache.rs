use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use hoard_atom::AtomStore;
use hoard_fresh::FreshnessPolicy;
use hoard_types::CacheKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::disk::DiskCache;
use crate::error::{CacheError, CacheResult};
use crate::fetch::FetchHandler;
use crate::object::Object;
use crate::reclaim::{ReclaimMode, ReclaimReport};
use crate::schedule::{Scheduler, TimerId};
use crate::status::Visibility;
use crate::table::ObjectTable;

/// Process-wide cache state shared by the cache handle, its objects and its
/// scheduled tasks.
pub(crate) struct CacheShared {
    pub(crate) config: CacheConfig,
    pub(crate) policy: Rc<FreshnessPolicy>,
    pub(crate) atoms: AtomStore,
    pub(crate) table: RefCell<ObjectTable>,
    pub(crate) public_count: Cell<usize>,
    pub(crate) private_count: Cell<usize>,
    pub(crate) chunk_bytes: Cell<usize>,
    pub(crate) slot_bytes: Cell<usize>,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) disk: RefCell<Option<Box<dyn DiskCache>>>,
    pub(crate) scheduler: RefCell<Option<Box<dyn Scheduler>>>,
    pub(crate) periodic: Cell<Option<TimerId>>,
    pub(crate) reclaim_pending: Cell<bool>,
    pub(crate) in_reclaim: Cell<bool>,
}

impl CacheShared {
    pub(crate) fn live_objects(&self) -> usize {
        self.public_count.get() + self.private_count.get()
    }

    pub(crate) fn charge_chunks(&self, bytes: usize) {
        self.chunk_bytes.set(self.chunk_bytes.get() + bytes);
    }

    pub(crate) fn credit_chunks(&self, bytes: usize) {
        self.chunk_bytes.set(self.chunk_bytes.get().saturating_sub(bytes));
    }

    pub(crate) fn charge_slots(&self, bytes: usize) {
        self.slot_bytes.set(self.slot_bytes.get() + bytes);
    }

    pub(crate) fn credit_slots(&self, bytes: usize) {
        self.slot_bytes.set(self.slot_bytes.get().saturating_sub(bytes));
    }

    /// Chunk buffers plus chunk slot arrays, as measured against the
    /// critical mark.
    fn chunk_memory(&self) -> usize {
        self.chunk_bytes.get() + self.slot_bytes.get()
    }

    pub(crate) fn forget_object(&self, visibility: Visibility) {
        let count = if visibility.is_public() {
            &self.public_count
        } else {
            &self.private_count
        };
        count.set(count.get().saturating_sub(1));
    }

    pub(crate) fn object_privatized(&self) {
        self.public_count.set(self.public_count.get().saturating_sub(1));
        self.private_count.set(self.private_count.get() + 1);
    }

    /// Make room for `requested` more chunk bytes under the critical mark,
    /// forcing a full sweep if needed.
    pub(crate) fn reserve_chunks(&self, requested: usize) -> CacheResult<()> {
        let limit = self.config.chunk_critical_mark;
        if requested == 0 || self.chunk_memory().saturating_add(requested) <= limit {
            return Ok(());
        }
        warn!(
            chunk_bytes = self.chunk_bytes.get(),
            slot_bytes = self.slot_bytes.get(),
            requested, limit, "chunk memory at critical mark; forcing reclaim"
        );
        self.reclaim(ReclaimMode::Force);
        if self.chunk_memory().saturating_add(requested) <= limit {
            Ok(())
        } else {
            Err(CacheError::OutOfMemory { requested })
        }
    }

    /// Schedule a one-shot watermark reclaim, unless one is already pending.
    pub(crate) fn schedule_reclaim(self: &Rc<Self>) {
        if self.reclaim_pending.get() {
            return;
        }
        let Ok(mut slot) = self.scheduler.try_borrow_mut() else {
            return;
        };
        let Some(scheduler) = slot.as_mut() else {
            return;
        };
        self.reclaim_pending.set(true);
        let weak = Rc::downgrade(self);
        scheduler.schedule_once(
            self.config.reclaim_delay(),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.reclaim_pending.set(false);
                    shared.reclaim(ReclaimMode::Watermark);
                }
            }),
        );
        debug!("deferred reclaim scheduled");
    }
}

impl Drop for CacheShared {
    fn drop(&mut self) {
        if let Some(id) = self.periodic.take() {
            if let Some(scheduler) = self.scheduler.get_mut().as_mut() {
                scheduler.cancel(id);
            }
        }
    }
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub atoms: usize,
    pub atom_bytes: usize,
    pub public_objects: usize,
    pub private_objects: usize,
    /// Public objects reachable through lookup.
    pub table_objects: usize,
    /// Chunk buffer bytes allocated across all objects.
    pub chunk_bytes: usize,
    /// Bytes held by chunk slot arrays across all objects.
    pub slot_bytes: usize,
}

/// Builder for [`Cache`].
pub struct CacheBuilder {
    config: CacheConfig,
    clock: Box<dyn Clock>,
    disk: Option<Box<dyn DiskCache>>,
    scheduler: Option<Box<dyn Scheduler>>,
}

impl CacheBuilder {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn disk(mut self, disk: impl DiskCache + 'static) -> Self {
        self.disk = Some(Box::new(disk));
        self
    }

    /// Install the periodic reclaim handler on `scheduler`.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn build(self) -> CacheResult<Cache> {
        self.config.validate()?;
        let shared = Rc::new(CacheShared {
            policy: Rc::new(self.config.freshness.clone()),
            config: self.config,
            atoms: AtomStore::new(),
            table: RefCell::new(ObjectTable::default()),
            public_count: Cell::new(0),
            private_count: Cell::new(0),
            chunk_bytes: Cell::new(0),
            slot_bytes: Cell::new(0),
            clock: self.clock,
            disk: RefCell::new(self.disk),
            scheduler: RefCell::new(self.scheduler),
            periodic: Cell::new(None),
            reclaim_pending: Cell::new(false),
            in_reclaim: Cell::new(false),
        });

        if let Some(scheduler) = shared.scheduler.borrow_mut().as_mut() {
            let weak = Rc::downgrade(&shared);
            let id = scheduler.schedule_periodic(
                shared.config.reclaim_interval(),
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.reclaim(ReclaimMode::Watermark);
                    }
                }),
            );
            shared.periodic.set(Some(id));
        }

        debug!(
            chunk_size = shared.config.chunk_size,
            object_high_mark = shared.config.object_high_mark,
            "cache initialized"
        );
        Ok(Cache { shared })
    }
}

/// The content cache: object table, atom store, counters and collaborators.
///
/// Dropping the cache releases the table's references and cancels the
/// periodic reclaim. Objects still held elsewhere stay valid.
pub struct Cache {
    shared: Rc<CacheShared>,
}

impl Cache {
    /// A cache on the system clock with no disk or scheduler attached.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: CacheConfig) -> CacheBuilder {
        CacheBuilder {
            config,
            clock: Box::new(SystemClock),
            disk: None,
            scheduler: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    pub fn atoms(&self) -> &AtomStore {
        &self.shared.atoms
    }

    pub fn now(&self) -> i64 {
        self.shared.clock.now()
    }

    /// Look up the live public object for `key`, updating its access time.
    pub fn find(&self, key: &CacheKey) -> Option<Object> {
        let object = self.shared.table.borrow().find(key)?;
        object.touch(self.now());
        Some(object)
    }

    /// Return the public object for `key`, or create a new one.
    ///
    /// Private and linear objects are always new and never enter the table.
    /// `fetcher` is registered only on a newly created object. When the live
    /// object count is at `object_high_mark` a reclaim runs first; if that
    /// frees nothing, creation fails with `CacheFull`.
    pub fn find_or_create(
        &self,
        key: CacheKey,
        visibility: Visibility,
        fetcher: Option<Box<dyn FetchHandler>>,
    ) -> CacheResult<Object> {
        if visibility.is_public() {
            if let Some(object) = self.find(&key) {
                return Ok(object);
            }
        }

        let limit = self.shared.config.object_high_mark;
        if self.shared.live_objects() >= limit {
            self.shared.evict_down_to(self.shared.config.public_low_mark);
            let live = self.shared.live_objects();
            if live >= limit {
                warn!(key = %key, live, limit, "cache full");
                return Err(CacheError::CacheFull { live, limit });
            }
        }

        let object = Object::new(&self.shared, key.clone(), visibility, fetcher);
        if visibility.is_public() {
            self.shared.public_count.set(self.shared.public_count.get() + 1);
            let displaced = self.shared.table.borrow_mut().insert(key.clone(), object.clone());
            drop(displaced);
            if self.shared.public_count.get() >= self.shared.config.public_low_mark {
                self.shared.schedule_reclaim();
            }
        } else {
            self.shared.private_count.set(self.shared.private_count.get() + 1);
        }
        debug!(key = %key, ?visibility, "object created");
        Ok(object)
    }

    /// Run a reclaim sweep now.
    pub fn reclaim(&self, mode: ReclaimMode) -> ReclaimReport {
        self.shared.reclaim(mode)
    }

    /// Flush every public object to the disk collaborator. Returns how many
    /// were written.
    pub fn write_out_all(&self) -> usize {
        let objects: Vec<Object> = self
            .shared
            .table
            .borrow()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        let Ok(mut slot) = self.shared.disk.try_borrow_mut() else {
            return 0;
        };
        let Some(disk) = slot.as_mut() else {
            return 0;
        };
        let written = objects
            .iter()
            .filter(|object| object.write_out(&mut **disk))
            .count();
        written
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            atoms: self.shared.atoms.len(),
            atom_bytes: self.shared.atoms.total_bytes(),
            public_objects: self.shared.public_count.get(),
            private_objects: self.shared.private_count.get(),
            table_objects: self.shared.table.borrow().len(),
            chunk_bytes: self.shared.chunk_bytes.get(),
            slot_bytes: self.shared.slot_bytes.get(),
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").field("stats", &self.stats()).finish()
    }
}
