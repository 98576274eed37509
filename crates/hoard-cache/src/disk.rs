//! Disk persistence seam.
//!
//! The engine treats the disk copy as write-through metadata: it records a
//! [`DiskLink`] on each object and asks the [`DiskCache`] collaborator to
//! write bodies out, update metadata and forget entries. Byte-level disk I/O
//! lives entirely behind the trait.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

use crate::object::Object;

/// Opaque identifier of a disk entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiskHandle(pub u64);

/// An object's link to its disk entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskLink {
    pub handle: DiskHandle,
    /// The whole declared body is durable.
    pub complete: bool,
    /// Body bytes durable on disk, starting at offset 0.
    pub size: usize,
}

impl DiskLink {
    /// Returns `true` if `[from, to)` is covered by the disk copy.
    pub fn covers(&self, from: usize, to: usize) -> bool {
        from <= to && to <= self.size
    }
}

/// External disk persistence collaborator.
pub trait DiskCache {
    /// Flush the object's materialized body. `link` is the existing entry, if
    /// any. Returns the updated link.
    fn write_out(&mut self, object: &Object, link: Option<DiskLink>) -> io::Result<DiskLink>;

    /// Persist changed headers or timing fields.
    fn metadata_changed(&mut self, link: &DiskLink, object: &Object) -> io::Result<()>;

    /// Forget the entry. With `delete` the durable copy goes too.
    fn destroy_entry(&mut self, link: DiskLink, delete: bool);
}

#[derive(Default)]
struct DiskEntry {
    key: String,
    body: Vec<u8>,
}

#[derive(Default)]
struct DiskState {
    next_handle: u64,
    entries: HashMap<DiskHandle, DiskEntry>,
    fail_writes: bool,
    writes: usize,
    metadata_updates: usize,
    destroyed: Vec<(DiskHandle, bool)>,
}

/// Disk collaborator that keeps "durable" bodies in memory.
///
/// Clones share state, so a test can inspect what the cache wrote.
#[derive(Clone, Default)]
pub struct InMemoryDiskCache {
    state: Rc<RefCell<DiskState>>,
}

impl InMemoryDiskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `write_out` fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }

    /// Durable body of an entry.
    pub fn entry_body(&self, handle: DiskHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .entries
            .get(&handle)
            .map(|e| e.body.clone())
    }

    /// Key the entry was written for.
    pub fn entry_key(&self, handle: DiskHandle) -> Option<String> {
        self.state
            .borrow()
            .entries
            .get(&handle)
            .map(|e| e.key.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.state.borrow().entries.len()
    }

    /// Successful `write_out` calls.
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }

    pub fn metadata_updates(&self) -> usize {
        self.state.borrow().metadata_updates
    }

    /// `(handle, delete)` for every `destroy_entry` call, in order.
    pub fn destroyed(&self) -> Vec<(DiskHandle, bool)> {
        self.state.borrow().destroyed.clone()
    }
}

impl DiskCache for InMemoryDiskCache {
    fn write_out(&mut self, object: &Object, link: Option<DiskLink>) -> io::Result<DiskLink> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            return Err(io::Error::other("disk write failed"));
        }
        let handle = match link {
            Some(link) if state.entries.contains_key(&link.handle) => link.handle,
            _ => {
                state.next_handle += 1;
                let handle = DiskHandle(state.next_handle);
                state.entries.insert(
                    handle,
                    DiskEntry {
                        key: object.key().to_string(),
                        body: Vec::new(),
                    },
                );
                handle
            }
        };
        let entry = state
            .entries
            .get_mut(&handle)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "disk entry vanished"))?;
        let tail = object.read(entry.body.len(), usize::MAX);
        entry.body.extend_from_slice(&tail);
        let size = entry.body.len();
        state.writes += 1;
        Ok(DiskLink {
            handle,
            complete: object.length().is_some_and(|len| size >= len),
            size,
        })
    }

    fn metadata_changed(&mut self, link: &DiskLink, _object: &Object) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.entries.contains_key(&link.handle) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such disk entry"));
        }
        state.metadata_updates += 1;
        Ok(())
    }

    fn destroy_entry(&mut self, link: DiskLink, delete: bool) {
        let mut state = self.state.borrow_mut();
        if delete {
            state.entries.remove(&link.handle);
        }
        state.destroyed.push((link.handle, delete));
    }
}

impl fmt::Debug for InMemoryDiskCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("InMemoryDiskCache")
            .field("entries", &state.entries.len())
            .field("writes", &state.writes)
            .finish()
    }
}
