use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::{AtomError, AtomResult};
use crate::hasher::AtomHasher;

/// Refcounts at or above this value mark an atom as pinned: retain and
/// release leave it untouched and it is never unlinked.
pub const PINNED_REFCOUNT: u32 = 0xFFFF_FF00;

/// Placeholder returned by [`atom_str`] for a missing atom.
pub const NULL_ATOM_STR: &str = "(null)";

struct AtomCell {
    hash: u64,
    bytes: Box<[u8]>,
    refcount: Cell<u32>,
}

/// Hash-chained intern table. Chain members with equal hashes are compared
/// byte-for-byte.
#[derive(Default)]
struct AtomTable {
    chains: HashMap<u64, Vec<Rc<AtomCell>>>,
    live: usize,
    bytes: usize,
}

impl AtomTable {
    fn lookup(&self, hash: u64, bytes: &[u8]) -> Option<&Rc<AtomCell>> {
        self.chains
            .get(&hash)?
            .iter()
            .find(|cell| &*cell.bytes == bytes)
    }

    fn link(&mut self, cell: Rc<AtomCell>) {
        self.live += 1;
        self.bytes += cell.bytes.len();
        self.chains.entry(cell.hash).or_default().push(cell);
    }

    fn unlink(&mut self, cell: &AtomCell) -> bool {
        let Some(chain) = self.chains.get_mut(&cell.hash) else {
            return false;
        };
        let Some(pos) = chain.iter().position(|c| std::ptr::eq(&**c, cell)) else {
            return false;
        };
        chain.swap_remove(pos);
        if chain.is_empty() {
            self.chains.remove(&cell.hash);
        }
        self.live -= 1;
        self.bytes -= cell.bytes.len();
        true
    }
}

/// Interning table mapping byte content to a single shared [`Atom`].
///
/// `AtomStore` is a cheap handle: clones share the same table. Atoms keep a
/// weak link back to the table so that the last release can unlink them.
#[derive(Clone, Default)]
pub struct AtomStore {
    table: Rc<RefCell<AtomTable>>,
}

impl AtomStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `bytes`, returning the canonical atom with its refcount raised
    /// by one (or a fresh atom with refcount 1).
    pub fn intern(&self, bytes: &[u8]) -> AtomResult<Atom> {
        let hash = AtomHasher::ATOM.hash(bytes);
        let mut table = self.table.borrow_mut();
        if let Some(cell) = table.lookup(hash, bytes) {
            let cell = Rc::clone(cell);
            drop(table);
            retain_cell(&cell);
            return Ok(Atom {
                cell,
                table: Rc::downgrade(&self.table),
            });
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(bytes.len())
            .map_err(|_| AtomError::OutOfMemory {
                requested: bytes.len(),
            })?;
        buf.extend_from_slice(bytes);
        let cell = Rc::new(AtomCell {
            hash,
            bytes: buf.into_boxed_slice(),
            refcount: Cell::new(1),
        });
        table.link(Rc::clone(&cell));
        Ok(Atom {
            cell,
            table: Rc::downgrade(&self.table),
        })
    }

    /// Intern an ASCII-lowercased copy of `bytes`.
    ///
    /// The result is distinct storage from the original-case atom of the same
    /// content, and identical to the atom of the already-lowercase content.
    pub fn intern_lower(&self, bytes: &[u8]) -> AtomResult<Atom> {
        self.intern(&bytes.to_ascii_lowercase())
    }

    /// Intern formatted text: `store.intern_fmt(format_args!("{code} {reason}"))`.
    pub fn intern_fmt(&self, args: fmt::Arguments<'_>) -> AtomResult<Atom> {
        match args.as_str() {
            Some(s) => self.intern(s.as_bytes()),
            None => self.intern(args.to_string().as_bytes()),
        }
    }

    /// Intern formatted text suffixed with `": "` and the OS error description.
    pub fn intern_error(&self, err: &io::Error, args: fmt::Arguments<'_>) -> AtomResult<Atom> {
        self.intern(format!("{args}: {err}").as_bytes())
    }

    /// Intern `atom`'s content followed by `suffix`.
    ///
    /// `atom` is left untouched. The returned handle is a separate counted
    /// reference; for an empty suffix it refers to the same canonical atom as
    /// `atom`, since identical content is never stored twice.
    pub fn concat(&self, atom: &Atom, suffix: &[u8]) -> AtomResult<Atom> {
        let total = atom.len() + suffix.len();
        let mut buf = Vec::new();
        buf.try_reserve_exact(total)
            .map_err(|_| AtomError::OutOfMemory { requested: total })?;
        buf.extend_from_slice(atom.as_bytes());
        buf.extend_from_slice(suffix);
        self.intern(&buf)
    }

    /// Split `atom` at the first occurrence of `sep`.
    ///
    /// Returns the content before and after the separator (the separator
    /// itself is dropped), or `None` if `sep` does not occur.
    pub fn split(&self, atom: &Atom, sep: u8) -> AtomResult<Option<(Atom, Atom)>> {
        let bytes = atom.as_bytes();
        let Some(pos) = bytes.iter().position(|&b| b == sep) else {
            return Ok(None);
        };
        let head = self.intern(&bytes[..pos])?;
        let tail = self.intern(&bytes[pos + 1..])?;
        Ok(Some((head, tail)))
    }

    /// Look up existing content without creating an atom.
    pub fn find(&self, bytes: &[u8]) -> Option<Atom> {
        let hash = AtomHasher::ATOM.hash(bytes);
        let table = self.table.borrow();
        let cell = Rc::clone(table.lookup(hash, bytes)?);
        drop(table);
        retain_cell(&cell);
        Some(Atom {
            cell,
            table: Rc::downgrade(&self.table),
        })
    }

    /// Number of live atoms.
    pub fn len(&self) -> usize {
        self.table.borrow().live
    }

    /// Returns `true` if no atoms are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total content bytes across live atoms.
    pub fn total_bytes(&self) -> usize {
        self.table.borrow().bytes
    }
}

impl fmt::Debug for AtomStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("AtomStore")
            .field("atom_count", &table.live)
            .field("total_bytes", &table.bytes)
            .finish()
    }
}

fn retain_cell(cell: &AtomCell) {
    let rc = cell.refcount.get();
    if rc < PINNED_REFCOUNT {
        cell.refcount.set(rc + 1);
    }
}

/// A counted reference to interned, immutable bytes.
///
/// `Clone` retains and `Drop` releases. Equality compares content; use
/// [`Atom::ptr_eq`] for identity.
pub struct Atom {
    cell: Rc<AtomCell>,
    table: Weak<RefCell<AtomTable>>,
}

impl Atom {
    /// The atom's content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.cell.bytes
    }

    /// Content viewed as text, replacing invalid UTF-8.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.cell.bytes)
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.cell.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.bytes.is_empty()
    }

    /// Current reference count.
    pub fn refcount(&self) -> u32 {
        self.cell.refcount.get()
    }

    /// Take another counted reference to the same atom.
    pub fn retain(&self) -> Atom {
        self.clone()
    }

    /// Give up this reference. Equivalent to dropping the handle.
    pub fn release(self) {}

    /// Mark the atom as never freed.
    pub fn pin(&self) {
        self.cell.refcount.set(PINNED_REFCOUNT);
    }

    /// Returns `true` if the atom is pinned.
    pub fn is_pinned(&self) -> bool {
        self.cell.refcount.get() >= PINNED_REFCOUNT
    }

    /// Returns `true` if both handles refer to the same stored atom.
    pub fn ptr_eq(a: &Atom, b: &Atom) -> bool {
        Rc::ptr_eq(&a.cell, &b.cell)
    }
}

impl Clone for Atom {
    fn clone(&self) -> Self {
        retain_cell(&self.cell);
        Self {
            cell: Rc::clone(&self.cell),
            table: Weak::clone(&self.table),
        }
    }
}

impl Drop for Atom {
    fn drop(&mut self) {
        let rc = self.cell.refcount.get();
        if rc >= PINNED_REFCOUNT || rc == 0 {
            return;
        }
        self.cell.refcount.set(rc - 1);
        if rc > 1 {
            return;
        }
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let borrowed = table.try_borrow_mut();
        match borrowed {
            Ok(mut table) => {
                table.unlink(&self.cell);
                trace!(len = self.cell.bytes.len(), "atom freed");
            }
            Err(_) => warn!(len = self.cell.bytes.len(), "atom table busy; leaking atom"),
        };
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        Atom::ptr_eq(self, other) || self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl AsRef<[u8]> for Atom {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?}, rc={})", self.as_str(), self.refcount())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Text view of an optional atom; `"(null)"` when absent.
pub fn atom_str(atom: Option<&Atom>) -> Cow<'_, str> {
    match atom {
        Some(atom) => atom.as_str(),
        None => Cow::Borrowed(NULL_ATOM_STR),
    }
}
