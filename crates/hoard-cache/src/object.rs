//! Cached objects.
//!
//! An [`Object`] is a counted handle: cloning retains, dropping releases, and
//! the last release destroys the object (chunk buffers, header atoms, disk
//! linkage). The object table holds one reference to every public object it
//! maps, so a reachable object always has a refcount of at least one.
//!
//! Everything runs on one thread. Waiters and fetch handlers are invoked with
//! no interior borrow held, so they may call back into the same object.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use hoard_atom::{Atom, AtomStore};
use hoard_fresh::{CacheMetadata, FreshnessPolicy};
use hoard_types::{CacheControl, CacheKey};
use tracing::{debug, warn};

use crate::cache::CacheShared;
use crate::chunk::ChunkStore;
use crate::disk::{DiskCache, DiskLink};
use crate::error::{CacheError, CacheResult};
use crate::fetch::{FetchHandler, FetchOp, FetchOutcome, FetchRequest, RequestHandle};
use crate::status::{Completeness, Notification, ObjectStatus, Phase, Residency, Visibility};
use crate::waiter::{Waiter, WaiterId, WaiterList};

pub(crate) struct ObjectData {
    key: CacheKey,
    phase: Phase,
    visibility: Visibility,
    in_progress: bool,
    validating: bool,
    superseded: bool,
    failed: bool,
    local: bool,
    dynamic: bool,
    mutating: bool,
    code: u16,
    message: Option<Atom>,
    headers: Option<Atom>,
    via: Option<Atom>,
    etag: Option<Atom>,
    length: Option<usize>,
    metadata: CacheMetadata,
    atime: i64,
    chunks: ChunkStore,
    fetcher: Option<Box<dyn FetchHandler>>,
    requestor: Option<RequestHandle>,
    waiters: WaiterList,
    disk: Option<DiskLink>,
    policy: Rc<FreshnessPolicy>,
    atoms: AtomStore,
    ctx: Weak<CacheShared>,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        let Some(ctx) = self.ctx.upgrade() else {
            return;
        };
        ctx.credit_chunks(self.chunks.allocated_bytes());
        ctx.credit_slots(self.chunks.slot_bytes());
        ctx.forget_object(self.visibility);
        if let Some(link) = self.disk.take() {
            match ctx.disk.try_borrow_mut() {
                Ok(mut slot) => {
                    if let Some(disk) = slot.as_mut() {
                        disk.destroy_entry(link, self.superseded);
                    }
                }
                Err(_) => warn!(key = %self.key, "disk collaborator busy; leaking disk link"),
            }
        }
        debug!(key = %self.key, "object destroyed");
    }
}

/// Counted handle to a cached object.
#[derive(Clone)]
pub struct Object(Rc<RefCell<ObjectData>>);

/// Non-counting handle; does not keep the object alive.
#[derive(Clone)]
pub struct WeakObject(Weak<RefCell<ObjectData>>);

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(Object)
    }
}

impl Object {
    pub(crate) fn new(
        ctx: &Rc<CacheShared>,
        key: CacheKey,
        visibility: Visibility,
        fetcher: Option<Box<dyn FetchHandler>>,
    ) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            key,
            phase: Phase::Initial,
            visibility,
            in_progress: false,
            validating: false,
            superseded: false,
            failed: false,
            local: false,
            dynamic: false,
            mutating: false,
            code: 0,
            message: None,
            headers: None,
            via: None,
            etag: None,
            length: None,
            metadata: CacheMetadata::default(),
            atime: ctx.clock.now(),
            chunks: ChunkStore::new(ctx.config.chunk_size),
            fetcher,
            requestor: None,
            waiters: WaiterList::default(),
            disk: None,
            policy: Rc::clone(&ctx.policy),
            atoms: ctx.atoms.clone(),
            ctx: Rc::downgrade(ctx),
        })))
    }

    // -------------------------------------------------------------------------
    // Reference counting
    // -------------------------------------------------------------------------

    /// Take another counted reference.
    pub fn retain(&self) -> Object {
        self.clone()
    }

    /// Give up this reference.
    pub fn release(self) {}

    /// Number of counted references, the object table's included.
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.0))
    }

    /// Returns `true` if both handles refer to the same object.
    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn key(&self) -> CacheKey {
        self.0.borrow().key.clone()
    }

    pub fn status(&self) -> ObjectStatus {
        let d = self.0.borrow();
        ObjectStatus {
            phase: d.phase,
            visibility: d.visibility,
            in_progress: d.in_progress,
            validating: d.validating,
            superseded: d.superseded,
            failed: d.failed,
            local: d.local,
            disk_entry_complete: d.disk.is_some_and(|link| link.complete),
            dynamic: d.dynamic,
            mutating: d.mutating,
        }
    }

    pub fn phase(&self) -> Phase {
        self.0.borrow().phase
    }

    pub fn visibility(&self) -> Visibility {
        self.0.borrow().visibility
    }

    /// Response status code; for aborted objects the failure code.
    pub fn code(&self) -> u16 {
        self.0.borrow().code
    }

    pub fn message(&self) -> Option<Atom> {
        self.0.borrow().message.clone()
    }

    pub fn headers(&self) -> Option<Atom> {
        self.0.borrow().headers.clone()
    }

    pub fn via(&self) -> Option<Atom> {
        self.0.borrow().via.clone()
    }

    pub fn etag(&self) -> Option<Atom> {
        self.0.borrow().etag.clone()
    }

    /// Declared body length; `None` until known.
    pub fn length(&self) -> Option<usize> {
        self.0.borrow().length
    }

    pub fn metadata(&self) -> CacheMetadata {
        self.0.borrow().metadata
    }

    /// Last access time, unix seconds.
    pub fn atime(&self) -> i64 {
        self.0.borrow().atime
    }

    pub fn disk_link(&self) -> Option<DiskLink> {
        self.0.borrow().disk
    }

    pub fn chunk_count(&self) -> usize {
        self.0.borrow().chunks.count()
    }

    /// Body bytes currently held in memory.
    pub fn stored_bytes(&self) -> usize {
        self.0.borrow().chunks.stored_bytes()
    }

    pub fn has_locked_chunks(&self) -> bool {
        self.0.borrow().chunks.any_locked()
    }

    pub fn is_chunk_locked(&self, index: usize) -> bool {
        self.0.borrow().chunks.is_locked(index)
    }

    pub fn waiter_count(&self) -> usize {
        self.0.borrow().waiters.len()
    }

    pub(crate) fn touch(&self, now: i64) {
        self.0.borrow_mut().atime = now;
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    /// Install response status and reason.
    pub fn set_status(&self, code: u16, message: Option<Atom>) {
        let mut d = self.0.borrow_mut();
        d.code = code;
        d.message = message;
    }

    pub fn set_headers(&self, headers: Atom) {
        self.0.borrow_mut().headers = Some(headers);
    }

    pub fn set_via(&self, via: Option<Atom>) {
        self.0.borrow_mut().via = via;
    }

    pub fn set_etag(&self, etag: Option<Atom>) {
        self.0.borrow_mut().etag = etag;
    }

    pub fn set_length(&self, length: Option<usize>) {
        self.0.borrow_mut().length = length;
    }

    pub fn set_metadata(&self, metadata: CacheMetadata) {
        self.0.borrow_mut().metadata = metadata;
    }

    pub fn set_dynamic(&self, dynamic: bool) {
        self.0.borrow_mut().dynamic = dynamic;
    }

    pub fn set_local(&self, local: bool) {
        self.0.borrow_mut().local = local;
    }

    /// Mark the body as being rewritten. Clearing the flag wakes waiters.
    pub fn set_mutating(&self, mutating: bool) {
        let was = std::mem::replace(&mut self.0.borrow_mut().mutating, mutating);
        if was && !mutating {
            self.notify();
        }
    }

    /// Remember the request this object belongs to.
    pub fn set_requestor(&self, requestor: RequestHandle) {
        self.0.borrow_mut().requestor = Some(requestor);
    }

    /// Returns `false` only for a linear object owned by another requestor.
    pub fn usable_by(&self, requestor: &RequestHandle) -> bool {
        let d = self.0.borrow();
        match (d.visibility, &d.requestor) {
            (Visibility::Linear, Some(owner)) => {
                Rc::as_ptr(owner) as *const () == Rc::as_ptr(requestor) as *const ()
            }
            _ => true,
        }
    }

    // -------------------------------------------------------------------------
    // Chunks and body data
    // -------------------------------------------------------------------------

    fn check_live(d: &ObjectData) -> CacheResult<()> {
        if d.phase == Phase::Aborted {
            return Err(CacheError::Aborted { code: d.code });
        }
        Ok(())
    }

    /// Resize the chunk array to exactly `n` slots.
    pub fn set_chunk_count(&self, n: usize) -> CacheResult<()> {
        let (growth, ctx) = {
            let d = self.0.borrow();
            Self::check_live(&d)?;
            (d.chunks.slot_growth(n), d.ctx.upgrade())
        };
        if let Some(ctx) = &ctx {
            ctx.reserve_chunks(growth)?;
        }

        let mut d = self.0.borrow_mut();
        let slots_before = d.chunks.slot_bytes();
        let freed = d.chunks.set_count(n)?;
        if let Some(ctx) = &ctx {
            ctx.credit_chunks(freed);
            ctx.credit_slots(slots_before.saturating_sub(d.chunks.slot_bytes()));
            ctx.charge_slots(d.chunks.slot_bytes().saturating_sub(slots_before));
        }
        Ok(())
    }

    pub fn lock_chunk(&self, index: usize) -> CacheResult<()> {
        self.0.borrow_mut().chunks.lock(index)
    }

    pub fn unlock_chunk(&self, index: usize) -> CacheResult<()> {
        self.0.borrow_mut().chunks.unlock(index)
    }

    /// Store body bytes at `offset`. Returns how many bytes were new.
    ///
    /// Writes may arrive in any order and may overlap or repeat; bytes
    /// already present are kept. Allocating past the hard chunk-memory limit
    /// first forces a full reclaim, then fails with `OutOfMemory`. Slot-array
    /// growth counts toward that limit. A range whose end overflows fails with
    /// `RangeOverflow` before anything is allocated.
    pub fn add_data(&self, offset: usize, data: &[u8]) -> CacheResult<usize> {
        let (pending, ctx) = {
            let d = self.0.borrow();
            Self::check_live(&d)?;
            (d.chunks.pending_allocation(offset, data.len())?, d.ctx.upgrade())
        };
        if let Some(ctx) = &ctx {
            ctx.reserve_chunks(pending)?;
        }

        let mut d = self.0.borrow_mut();
        let before = d.chunks.allocated_bytes();
        let slots_before = d.chunks.slot_bytes();
        let result = d.chunks.write(offset, data);
        if let Some(ctx) = &ctx {
            ctx.charge_chunks(d.chunks.allocated_bytes().saturating_sub(before));
            ctx.charge_slots(d.chunks.slot_bytes().saturating_sub(slots_before));
        }
        let outcome = result?;

        if outcome.skipped > 0 {
            warn!(
                key = %d.key,
                offset,
                skipped = outcome.skipped,
                "dropped data that would leave a gap inside a chunk"
            );
        }
        if outcome.stored > 0 {
            d.failed = false;
        }
        let end = d.chunks.materialized_end();
        if let Some(length) = d.length {
            if end > length {
                warn!(key = %d.key, declared = length, end, "inconsistent length; extending");
                d.length = Some(end);
            }
        }
        drop(d);

        if let Some(ctx) = &ctx {
            if ctx.chunk_bytes.get() > ctx.config.chunk_high_mark {
                ctx.schedule_reclaim();
            }
        }
        Ok(outcome.stored)
    }

    /// Write formatted text into the body at `offset`. Returns the number of
    /// bytes the text occupies.
    pub fn append_fmt(&self, offset: usize, args: fmt::Arguments<'_>) -> CacheResult<usize> {
        let text = fmt::format(args);
        self.add_data(offset, text.as_bytes())?;
        Ok(text.len())
    }

    /// Size of the unmaterialized run starting at `offset`: `Some(0)` if the
    /// byte is present, the distance to the next present byte otherwise, and
    /// the distance to the declared end when nothing follows. `None` when
    /// nothing follows and the length is unknown.
    pub fn hole_size(&self, offset: usize) -> Option<usize> {
        let d = self.0.borrow();
        d.chunks.hole_size(offset, d.length)
    }

    /// Returns `true` iff every byte of `[from, to)` is in memory.
    pub fn has_data(&self, from: usize, to: usize) -> bool {
        self.0.borrow().chunks.has_data(from, to)
    }

    /// Where `[from, to)` can be served from.
    pub fn residency(&self, from: usize, to: usize) -> Residency {
        let d = self.0.borrow();
        if d.chunks.has_data(from, to) {
            Residency::Memory
        } else if d.disk.is_some_and(|link| link.covers(from, to)) {
            Residency::Disk
        } else {
            Residency::Missing
        }
    }

    /// Contiguous in-memory bytes starting at `offset`, at most `max`.
    pub fn read(&self, offset: usize, max: usize) -> Vec<u8> {
        self.0.borrow().chunks.read(offset, max)
    }

    pub fn completeness(&self) -> Completeness {
        let d = self.0.borrow();
        match d.length {
            Some(len) if d.disk.is_some_and(|l| l.covers(0, len)) => Completeness::Complete,
            Some(len) if d.chunks.has_data(0, len) => Completeness::Complete,
            _ => Completeness::Partial,
        }
    }

    // -------------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------------

    /// Install response headers and the declared length, leaving Initial.
    ///
    /// If the body already holds more than `length` bytes the object is
    /// aborted with 502 and `InconsistentLength` is returned.
    pub fn mark_partial(&self, length: Option<usize>, headers: Atom) -> CacheResult<Object> {
        let (have, atoms) = {
            let d = self.0.borrow();
            Self::check_live(&d)?;
            (d.chunks.materialized_end(), d.atoms.clone())
        };
        if let Some(declared) = length {
            if have > declared {
                let message = atoms.intern(b"Inconsistent Content-Length")?;
                self.abort(502, message);
                return Err(CacheError::InconsistentLength {
                    declared,
                    materialized: have,
                });
            }
        }
        {
            let mut d = self.0.borrow_mut();
            d.headers = Some(headers);
            d.length = length;
            if d.phase == Phase::Initial {
                d.phase = Phase::Ready;
            }
        }
        self.metadata_changed(false);
        self.notify();
        Ok(self.clone())
    }

    /// Detach a public object from shared visibility. With `linear` the
    /// object becomes usable by its requestor only.
    pub fn privatize(&self, linear: bool) {
        let (was_public, key, ctx, link) = {
            let mut d = self.0.borrow_mut();
            let was_public = d.visibility.is_public();
            if linear {
                d.visibility = Visibility::Linear;
            } else if was_public {
                d.visibility = Visibility::Private;
            }
            let link = if was_public { d.disk.take() } else { None };
            (was_public, d.key.clone(), d.ctx.upgrade(), link)
        };
        if !was_public {
            return;
        }
        if let Some(ctx) = ctx {
            ctx.object_privatized();
            let removed = ctx.table.borrow_mut().remove_if_same(&key, self);
            drop(removed);
            if let Some(link) = link {
                if let Ok(mut slot) = ctx.disk.try_borrow_mut() {
                    if let Some(disk) = slot.as_mut() {
                        disk.destroy_entry(link, false);
                    }
                }
            }
        }
        debug!(key = %key, linear, "object privatized");
    }

    /// Remove the object from lookup. Holders keep a valid object; waiters
    /// are told so they can look the key up again.
    pub fn supersede(&self) {
        let (key, ctx) = {
            let mut d = self.0.borrow_mut();
            if d.superseded {
                return;
            }
            d.superseded = true;
            (d.key.clone(), d.ctx.upgrade())
        };
        if let Some(ctx) = ctx {
            let removed = ctx.table.borrow_mut().remove_if_same(&key, self);
            drop(removed);
        }
        debug!(key = %key, "object superseded");
        self.notify_with(Notification::Superseded);
    }

    /// Fail the object permanently and wake every waiter with the failure.
    ///
    /// Returns `false`, changing nothing, if it was already aborted.
    pub fn abort(&self, code: u16, message: Atom) -> bool {
        let key = {
            let mut d = self.0.borrow_mut();
            if d.phase == Phase::Aborted {
                return false;
            }
            d.phase = Phase::Aborted;
            d.in_progress = false;
            d.validating = false;
            d.code = code;
            d.message = Some(message);
            d.headers = None;
            d.etag = None;
            d.length = Some(0);
            d.metadata = CacheMetadata::default();
            let freed = d.chunks.discard_unlocked();
            if let Some(ctx) = d.ctx.upgrade() {
                ctx.credit_chunks(freed);
            }
            d.key.clone()
        };
        self.privatize(false);
        debug!(key = %key, code, "object aborted");
        self.notify_with(Notification::Aborted { code });
        true
    }

    // -------------------------------------------------------------------------
    // Waiters
    // -------------------------------------------------------------------------

    /// Register a single-shot waiter.
    pub fn add_waiter(&self, waiter: Waiter) -> WaiterId {
        self.0.borrow_mut().waiters.register(waiter)
    }

    pub fn cancel_waiter(&self, id: WaiterId) -> bool {
        self.0.borrow_mut().waiters.cancel(id)
    }

    /// Wake every registered waiter, in registration order.
    pub fn notify(&self) {
        self.notify_with(Notification::Updated);
    }

    fn notify_with(&self, notification: Notification) {
        let waiters = self.0.borrow_mut().waiters.take();
        for (_, waiter) in waiters {
            waiter(self, notification);
        }
    }

    /// Wake the waiters, then give up this reference.
    pub fn release_and_notify(self) {
        self.notify();
    }

    // -------------------------------------------------------------------------
    // Freshness
    // -------------------------------------------------------------------------

    /// Staleness under `request` at `now`. Objects without headers yet are
    /// never stale.
    pub fn is_stale(&self, request: &CacheControl, now: i64) -> bool {
        let d = self.0.borrow();
        d.phase != Phase::Initial && d.policy.is_stale(&d.metadata, request, now)
    }

    /// Whether the object must be revalidated before being served.
    pub fn must_revalidate(&self, request: &CacheControl, now: i64) -> bool {
        let d = self.0.borrow();
        let meta = (d.phase != Phase::Initial).then_some(&d.metadata);
        d.policy.must_revalidate(meta, request, now)
    }

    // -------------------------------------------------------------------------
    // Fetching
    // -------------------------------------------------------------------------

    /// Ask the registered handler to (re)populate the object.
    ///
    /// A request arriving while a fetch is already in progress is coalesced
    /// unless it is a conditional revalidation.
    pub fn request_fetch(&self, request: FetchRequest) -> CacheResult<FetchOutcome> {
        let mut handler = {
            let mut d = self.0.borrow_mut();
            Self::check_live(&d)?;
            if d.superseded {
                return Err(CacheError::Superseded);
            }
            if d.in_progress && request.op != FetchOp::ConditionalGet {
                return Ok(FetchOutcome::Pending);
            }
            let Some(handler) = d.fetcher.take() else {
                return Err(CacheError::NoFetcher);
            };
            d.in_progress = true;
            d.validating = request.op == FetchOp::ConditionalGet;
            debug!(key = %d.key, op = ?request.op, offset = request.offset, "fetch requested");
            handler
        };

        let outcome = handler.request(self, &request);

        {
            let mut d = self.0.borrow_mut();
            if d.fetcher.is_none() {
                d.fetcher = Some(handler);
            }
            if outcome == FetchOutcome::Refused {
                d.in_progress = false;
                d.validating = false;
            }
        }
        if outcome == FetchOutcome::Completed && self.status().in_progress {
            self.finish_fetch();
        }
        Ok(outcome)
    }

    /// The fetch finished; wake the waiters.
    pub fn finish_fetch(&self) {
        {
            let mut d = self.0.borrow_mut();
            d.in_progress = false;
            d.validating = false;
            d.failed = false;
            if d.phase == Phase::Initial {
                d.phase = Phase::Ready;
            }
        }
        self.notify();
    }

    /// The fetch failed transiently. The next successful `add_data` clears
    /// the mark.
    pub fn mark_failed(&self) {
        {
            let mut d = self.0.borrow_mut();
            d.failed = true;
            d.in_progress = false;
            d.validating = false;
        }
        self.notify();
    }

    // -------------------------------------------------------------------------
    // Disk
    // -------------------------------------------------------------------------

    /// Forward changed metadata to the disk entry. `dirty` means the body no
    /// longer matches the disk copy.
    ///
    /// A disk failure drops the link and leaves the object memory-only.
    pub fn metadata_changed(&self, dirty: bool) {
        let (link, ctx) = {
            let mut d = self.0.borrow_mut();
            let Some(mut link) = d.disk else {
                return;
            };
            if dirty {
                link.complete = false;
                d.disk = Some(link);
            }
            (link, d.ctx.upgrade())
        };
        let Some(ctx) = ctx else {
            return;
        };
        let result = match ctx.disk.try_borrow_mut() {
            Ok(mut slot) => match slot.as_mut() {
                Some(disk) => disk.metadata_changed(&link, self),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        };
        if let Err(err) = result {
            let mut d = self.0.borrow_mut();
            warn!(key = %d.key, error = %err, "disk metadata update failed; keeping memory-only copy");
            d.disk = None;
        }
    }

    /// Flush the body to `disk`. Returns `false` on failure, which leaves the
    /// object as it was.
    pub(crate) fn write_out(&self, disk: &mut dyn DiskCache) -> bool {
        let link = self.0.borrow().disk;
        match disk.write_out(self, link) {
            Ok(link) => {
                self.0.borrow_mut().disk = Some(link);
                true
            }
            Err(err) => {
                warn!(key = %self.key(), error = %err, "disk write-out failed; keeping memory-only copy");
                false
            }
        }
    }

    /// Drop in-memory chunks the disk copy already covers. Returns the
    /// buffer bytes released.
    pub(crate) fn discard_written_chunks(&self) -> usize {
        let mut d = self.0.borrow_mut();
        let Some(link) = d.disk else {
            return 0;
        };
        let freed = d.chunks.discard_covered(link.size);
        if let Some(ctx) = d.ctx.upgrade() {
            ctx.credit_chunks(freed);
        }
        freed
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(d) => f
                .debug_struct("Object")
                .field("key", &d.key)
                .field("phase", &d.phase)
                .field("visibility", &d.visibility)
                .field("length", &d.length)
                .field("refcount", &Rc::strong_count(&self.0))
                .finish(),
            Err(_) => f.write_str("Object(<borrowed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::disk::InMemoryDiskCache;
    use hoard_types::Directives;
    use std::cell::Cell;

    const T: i64 = 1_700_000_000;

    fn small_config() -> CacheConfig {
        CacheConfig {
            chunk_size: 8,
            ..CacheConfig::default()
        }
    }

    fn cache() -> Cache {
        Cache::builder(small_config())
            .clock(ManualClock::new(T))
            .build()
            .unwrap()
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::http(s).unwrap()
    }

    fn public(cache: &Cache, k: &str) -> Object {
        cache.find_or_create(key(k), Visibility::Public, None).unwrap()
    }

    fn counting_waiter(hits: &Rc<Cell<u32>>) -> Waiter {
        let hits = Rc::clone(hits);
        Box::new(move |_: &Object, _: Notification| hits.set(hits.get() + 1))
    }

    // =========================================================================
    // Body data
    // =========================================================================

    #[test]
    fn overlapping_writes_materialize_once() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let body: Vec<u8> = (0u8..15).collect();
        obj.set_length(Some(15));
        assert_eq!(obj.add_data(0, &body[0..10]).unwrap(), 10);
        assert_eq!(obj.add_data(5, &body[5..15]).unwrap(), 5);
        assert!(obj.has_data(0, 15));
        assert_eq!(obj.stored_bytes(), 15);
        assert_eq!(obj.read(0, usize::MAX), body);
        assert_eq!(obj.completeness(), Completeness::Complete);
        assert_eq!(cache.stats().chunk_bytes, 16);
    }

    #[test]
    fn data_past_declared_length_extends_it() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.set_length(Some(4));
        obj.add_data(0, b"abcdef").unwrap();
        assert_eq!(obj.length(), Some(6));
    }

    #[test]
    fn hole_size_zero_exactly_when_byte_present() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.set_length(Some(32));
        obj.add_data(0, b"0123456789").unwrap();
        obj.add_data(16, b"gh").unwrap();
        for offset in 0..32 {
            let hole = obj.hole_size(offset);
            assert_eq!(hole == Some(0), obj.has_data(offset, offset + 1), "offset {offset}");
        }
        assert_eq!(obj.hole_size(10), Some(6));
        assert_eq!(obj.hole_size(18), Some(14));
    }

    #[test]
    fn append_fmt_writes_text() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let n = obj.append_fmt(0, format_args!("{} {}", 404, "Not Found")).unwrap();
        assert_eq!(n, 13);
        let m = obj.append_fmt(n, format_args!("!")).unwrap();
        assert_eq!(obj.read(0, n + m), b"404 Not Found!");
    }

    #[test]
    fn chunk_locks_guard_resizing() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.add_data(0, &[7u8; 16]).unwrap();
        obj.lock_chunk(1).unwrap();
        assert!(obj.is_chunk_locked(1));
        let err = obj.set_chunk_count(1).unwrap_err();
        assert!(err.is_lock_violation());
        obj.unlock_chunk(1).unwrap();
        assert!(obj.unlock_chunk(1).unwrap_err().is_lock_violation());
        obj.set_chunk_count(1).unwrap();
        assert_eq!(obj.chunk_count(), 1);
        assert_eq!(cache.stats().chunk_bytes, 8);
    }

    #[test]
    fn overflowing_offset_fails_before_allocating() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let err = obj.add_data(usize::MAX, b"xy").unwrap_err();
        assert!(matches!(err, CacheError::RangeOverflow { offset: usize::MAX, len: 2 }));
        assert_eq!(obj.chunk_count(), 0);
        assert_eq!(cache.stats().chunk_bytes, 0);
        assert_eq!(cache.stats().slot_bytes, 0);
        assert_eq!(obj.add_data(0, b"ok").unwrap(), 2);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn mark_partial_leaves_initial_and_notifies() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let hits = Rc::new(Cell::new(0));
        obj.add_waiter(counting_waiter(&hits));
        let headers = cache.atoms().intern(b"Content-Type: text/plain").unwrap();

        let view = obj.mark_partial(Some(100), headers).unwrap();
        assert!(Object::ptr_eq(&view, &obj));
        assert_eq!(obj.phase(), Phase::Ready);
        assert_eq!(obj.length(), Some(100));
        assert_eq!(hits.get(), 1);
        assert_eq!(obj.completeness(), Completeness::Partial);
    }

    #[test]
    fn mark_partial_with_too_much_data_aborts() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.add_data(0, b"0123456789").unwrap();
        let headers = cache.atoms().intern(b"X: y").unwrap();
        let err = obj.mark_partial(Some(4), headers).unwrap_err();
        assert!(matches!(
            err,
            CacheError::InconsistentLength {
                declared: 4,
                materialized: 10
            }
        ));
        assert_eq!(obj.phase(), Phase::Aborted);
        assert_eq!(obj.code(), 502);
        assert_eq!(obj.message().unwrap().as_bytes(), b"Inconsistent Content-Length");
    }

    #[test]
    fn abort_wakes_every_waiter_once() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            obj.add_waiter(Box::new(move |_: &Object, n: Notification| seen.borrow_mut().push(n)));
        }
        let msg = cache.atoms().intern(b"Connection refused").unwrap();
        assert!(obj.abort(503, msg.clone()));
        assert_eq!(*seen.borrow(), vec![Notification::Aborted { code: 503 }; 3]);

        assert!(!obj.abort(500, msg));
        assert_eq!(seen.borrow().len(), 3);
        assert_eq!(obj.code(), 503);
        assert!(cache.find(&key("http://a/")).is_none());
        assert!(matches!(obj.add_data(0, b"x"), Err(CacheError::Aborted { code: 503 })));
        assert!(matches!(obj.set_chunk_count(2), Err(CacheError::Aborted { code: 503 })));
    }

    #[test]
    fn abort_during_fetch_clears_progress_and_wakes_once() {
        let handler = |_: &Object, _: &FetchRequest| FetchOutcome::Pending;
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Public, Some(Box::new(handler)))
            .unwrap();
        obj.request_fetch(FetchRequest::conditional()).unwrap();
        let status = obj.status();
        assert!(status.in_progress && status.validating);

        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..3 {
            let seen = Rc::clone(&seen);
            obj.add_waiter(Box::new(move |_: &Object, n: Notification| seen.borrow_mut().push(n)));
        }
        let msg = cache.atoms().intern(b"Upstream reset").unwrap();
        assert!(obj.abort(502, msg));

        assert_eq!(*seen.borrow(), vec![Notification::Aborted { code: 502 }; 3]);
        let status = obj.status();
        assert!(!status.in_progress);
        assert!(!status.validating);
        assert!(matches!(
            obj.request_fetch(FetchRequest::get()),
            Err(CacheError::Aborted { code: 502 })
        ));
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn waiters_may_reregister() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        obj.add_waiter(Box::new(move |o: &Object, _: Notification| {
            h.set(h.get() + 1);
            let h = Rc::clone(&h);
            o.add_waiter(Box::new(move |_: &Object, _: Notification| h.set(h.get() + 10)));
        }));
        obj.notify();
        assert_eq!(hits.get(), 1);
        assert_eq!(obj.waiter_count(), 1);
        obj.notify();
        assert_eq!(hits.get(), 11);
        assert_eq!(obj.waiter_count(), 0);
    }

    #[test]
    fn cancelled_waiter_is_not_woken() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let hits = Rc::new(Cell::new(0));
        let id = obj.add_waiter(counting_waiter(&hits));
        assert!(obj.cancel_waiter(id));
        obj.notify();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn release_and_notify_drops_reference() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let hits = Rc::new(Cell::new(0));
        obj.add_waiter(counting_waiter(&hits));
        let extra = obj.retain();
        assert_eq!(obj.refcount(), 3);
        extra.release_and_notify();
        assert_eq!(obj.refcount(), 2);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn supersede_detaches_but_keeps_holders_valid() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.add_data(0, b"payload").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        obj.add_waiter(Box::new(move |_: &Object, n: Notification| s.borrow_mut().push(n)));

        obj.supersede();
        assert!(obj.status().superseded);
        assert!(cache.find(&key("http://a/")).is_none());
        assert_eq!(obj.refcount(), 1);
        assert_eq!(obj.read(0, 100), b"payload");
        assert_eq!(*seen.borrow(), vec![Notification::Superseded]);

        obj.supersede();
        assert_eq!(seen.borrow().len(), 1);

        let fresh = public(&cache, "http://a/");
        assert!(!Object::ptr_eq(&fresh, &obj));
    }

    #[test]
    fn last_release_destroys() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.add_data(0, b"abc").unwrap();
        let weak = obj.downgrade();
        obj.supersede();
        assert_eq!(cache.stats().public_objects, 1);
        drop(obj);
        assert!(weak.upgrade().is_none());
        assert_eq!(cache.stats().public_objects, 0);
        assert_eq!(cache.stats().chunk_bytes, 0);
    }

    #[test]
    fn privatize_moves_counts_and_leaves_table() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.privatize(false);
        assert_eq!(obj.visibility(), Visibility::Private);
        assert!(cache.find(&key("http://a/")).is_none());
        let stats = cache.stats();
        assert_eq!(stats.public_objects, 0);
        assert_eq!(stats.private_objects, 1);

        obj.privatize(true);
        assert_eq!(obj.visibility(), Visibility::Linear);
        assert_eq!(cache.stats().private_objects, 1);
    }

    #[test]
    fn linear_objects_belong_to_one_requestor() {
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Linear, None)
            .unwrap();
        let owner: RequestHandle = Rc::new(1u32);
        let other: RequestHandle = Rc::new(2u32);
        obj.set_requestor(Rc::clone(&owner));
        assert!(obj.usable_by(&owner));
        assert!(!obj.usable_by(&other));

        let shared = public(&cache, "http://b/");
        assert!(shared.usable_by(&other));
    }

    #[test]
    fn mutating_clear_wakes_readers() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        let hits = Rc::new(Cell::new(0));
        obj.set_mutating(true);
        obj.add_waiter(counting_waiter(&hits));
        obj.set_mutating(true);
        assert_eq!(hits.get(), 0);
        obj.set_mutating(false);
        assert_eq!(hits.get(), 1);
    }

    // =========================================================================
    // Freshness
    // =========================================================================

    #[test]
    fn initial_objects_are_never_stale() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        assert!(!obj.is_stale(&CacheControl::none(), T + 1_000_000));
    }

    #[test]
    fn staleness_follows_max_age() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        obj.set_metadata(CacheMetadata {
            date: Some(T),
            control: CacheControl::none().max_age(10),
            ..CacheMetadata::default()
        });
        obj.finish_fetch();
        let none = CacheControl::none();
        assert!(!obj.is_stale(&none, T + 5));
        assert!(obj.is_stale(&none, T + 15));
        assert!(obj.is_stale(&CacheControl::none().min_fresh(5), T + 9));
        assert!(!obj.must_revalidate(&none, T + 5));
        assert!(obj.must_revalidate(&CacheControl::with_flags(Directives::NO_CACHE), T + 5));
    }

    // =========================================================================
    // Fetching
    // =========================================================================

    #[test]
    fn request_fetch_drives_handler() {
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let handler = move |obj: &Object, req: &FetchRequest| {
            c.set(c.get() + 1);
            assert!(obj.status().in_progress);
            assert_eq!(req.op, FetchOp::Get);
            FetchOutcome::Pending
        };
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Public, Some(Box::new(handler)))
            .unwrap();

        assert_eq!(obj.request_fetch(FetchRequest::get()).unwrap(), FetchOutcome::Pending);
        assert_eq!(obj.request_fetch(FetchRequest::get()).unwrap(), FetchOutcome::Pending);
        assert_eq!(calls.get(), 1);

        obj.add_data(0, b"body").unwrap();
        obj.finish_fetch();
        assert!(!obj.status().in_progress);
        assert_eq!(obj.phase(), Phase::Ready);
    }

    #[test]
    fn synchronous_handler_completes() {
        let handler = |obj: &Object, _: &FetchRequest| {
            obj.add_data(0, b"hi").unwrap();
            FetchOutcome::Completed
        };
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Public, Some(Box::new(handler)))
            .unwrap();
        let hits = Rc::new(Cell::new(0));
        obj.add_waiter(counting_waiter(&hits));
        assert_eq!(obj.request_fetch(FetchRequest::get()).unwrap(), FetchOutcome::Completed);
        assert!(!obj.status().in_progress);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn conditional_fetch_sets_validating() {
        let handler = |_: &Object, _: &FetchRequest| FetchOutcome::Pending;
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Public, Some(Box::new(handler)))
            .unwrap();
        obj.request_fetch(FetchRequest::conditional()).unwrap();
        assert!(obj.status().validating);
        obj.mark_failed();
        let status = obj.status();
        assert!(status.failed && !status.validating && !status.in_progress);
        obj.add_data(0, b"x").unwrap();
        assert!(!obj.status().failed);
    }

    #[test]
    fn refused_fetch_clears_progress() {
        let handler = |_: &Object, _: &FetchRequest| FetchOutcome::Refused;
        let cache = cache();
        let obj = cache
            .find_or_create(key("http://a/"), Visibility::Public, Some(Box::new(handler)))
            .unwrap();
        assert_eq!(obj.request_fetch(FetchRequest::get()).unwrap(), FetchOutcome::Refused);
        assert!(!obj.status().in_progress);
    }

    #[test]
    fn fetch_errors() {
        let cache = cache();
        let obj = public(&cache, "http://a/");
        assert!(matches!(
            obj.request_fetch(FetchRequest::get()),
            Err(CacheError::NoFetcher)
        ));
        obj.supersede();
        assert!(matches!(
            obj.request_fetch(FetchRequest::get()),
            Err(CacheError::Superseded)
        ));
    }

    // =========================================================================
    // Disk
    // =========================================================================

    #[test]
    fn residency_tracks_disk_copy() {
        let disk = InMemoryDiskCache::new();
        let cache = Cache::builder(small_config())
            .clock(ManualClock::new(T))
            .disk(disk.clone())
            .build()
            .unwrap();
        let obj = public(&cache, "http://a/");
        obj.set_length(Some(20));
        obj.add_data(0, &[1u8; 20]).unwrap();
        assert_eq!(cache.write_out_all(), 1);
        let link = obj.disk_link().unwrap();
        assert!(link.complete);
        assert!(obj.status().disk_entry_complete);
        assert_eq!(disk.entry_body(link.handle).unwrap(), vec![1u8; 20]);

        assert_eq!(obj.discard_written_chunks(), 24);
        assert_eq!(obj.residency(0, 20), Residency::Disk);
        assert_eq!(obj.residency(0, 21), Residency::Missing);
        assert_eq!(obj.completeness(), Completeness::Complete);

        obj.metadata_changed(true);
        assert!(!obj.status().disk_entry_complete);
        assert_eq!(disk.metadata_updates(), 1);
    }

    #[test]
    fn destroy_detaches_disk_entry() {
        let disk = InMemoryDiskCache::new();
        let cache = Cache::builder(small_config())
            .clock(ManualClock::new(T))
            .disk(disk.clone())
            .build()
            .unwrap();
        let obj = public(&cache, "http://a/");
        obj.add_data(0, b"abc").unwrap();
        cache.write_out_all();
        let handle = obj.disk_link().unwrap().handle;
        obj.supersede();
        drop(obj);
        assert_eq!(disk.destroyed(), vec![(handle, true)]);
    }
}
