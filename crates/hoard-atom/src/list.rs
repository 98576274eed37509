use std::slice;

use crate::store::Atom;

/// Ordered, growable sequence of atom references.
///
/// The list owns one counted reference per element. Construction and
/// [`push`](AtomList::push) take ownership of the handles they are given and
/// never retain on their own: callers that want to keep using an atom must
/// [`retain`](Atom::retain) it before handing it over. Dropping the list
/// releases every element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AtomList {
    atoms: Vec<Atom>,
}

impl AtomList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list that takes over the given references without changing
    /// their refcounts.
    pub fn from_owned(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    /// Append `atom`, taking over its reference.
    pub fn push(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Returns `true` if this exact atom is a member.
    pub fn contains(&self, atom: &Atom) -> bool {
        self.atoms.iter().any(|a| Atom::ptr_eq(a, atom))
    }

    pub fn get(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Atom> {
        self.atoms.iter()
    }

    /// Give the references back to the caller.
    pub fn into_vec(self) -> Vec<Atom> {
        self.atoms
    }
}

impl FromIterator<Atom> for AtomList {
    fn from_iter<I: IntoIterator<Item = Atom>>(iter: I) -> Self {
        Self::from_owned(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AtomList {
    type Item = &'a Atom;
    type IntoIter = slice::Iter<'a, Atom>;

    fn into_iter(self) -> Self::IntoIter {
        self.atoms.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AtomStore;

    #[test]
    fn construction_takes_ownership_without_retaining() {
        let store = AtomStore::new();
        let a = store.intern(b"gzip").unwrap();
        let b = store.intern(b"deflate").unwrap();
        let list = AtomList::from_owned(vec![a, b]);
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|atom| atom.refcount() == 1));
    }

    #[test]
    fn dropping_list_releases_every_member() {
        let store = AtomStore::new();
        let list: AtomList = ["a", "b", "c"]
            .iter()
            .map(|s| store.intern(s.as_bytes()).unwrap())
            .collect();
        assert_eq!(store.len(), 3);
        drop(list);
        assert!(store.is_empty());
    }

    #[test]
    fn push_transfers_reference() {
        let store = AtomStore::new();
        let keep = store.intern(b"identity").unwrap();
        let mut list = AtomList::new();
        list.push(keep.retain());
        assert_eq!(keep.refcount(), 2);
        assert!(list.contains(&keep));
        drop(list);
        assert_eq!(keep.refcount(), 1);
    }

    #[test]
    fn membership_is_by_identity_within_store() {
        let store = AtomStore::new();
        let other_store = AtomStore::new();
        let list = AtomList::from_owned(vec![store.intern(b"x").unwrap()]);

        let same = store.intern(b"x").unwrap();
        let foreign = other_store.intern(b"x").unwrap();
        assert!(list.contains(&same));
        assert!(!list.contains(&foreign));
    }

    #[test]
    fn into_vec_hands_references_back() {
        let store = AtomStore::new();
        let list = AtomList::from_owned(vec![store.intern(b"v").unwrap()]);
        let atoms = list.into_vec();
        assert_eq!(atoms[0].refcount(), 1);
        assert_eq!(store.len(), 1);
    }
}
