use std::collections::HashMap;

use hoard_types::CacheKey;

use crate::object::Object;

/// Lookup map from cache key to the live public object.
///
/// The table owns one counted reference per entry. Only public objects are
/// ever inserted, and only at creation time.
#[derive(Default)]
pub(crate) struct ObjectTable {
    objects: HashMap<CacheKey, Object>,
}

impl ObjectTable {
    pub(crate) fn find(&self, key: &CacheKey) -> Option<Object> {
        self.objects.get(key).cloned()
    }

    /// Map `key` to `object`, returning whatever it displaced.
    pub(crate) fn insert(&mut self, key: CacheKey, object: Object) -> Option<Object> {
        self.objects.insert(key, object)
    }

    pub(crate) fn remove(&mut self, key: &CacheKey) -> Option<Object> {
        self.objects.remove(key)
    }

    /// Remove the entry for `key` only if it is this very object.
    pub(crate) fn remove_if_same(&mut self, key: &CacheKey, object: &Object) -> Option<Object> {
        match self.objects.get(key) {
            Some(current) if Object::ptr_eq(current, object) => self.objects.remove(key),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&CacheKey, &Object)> {
        self.objects.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::CacheConfig;
    use crate::status::Visibility;

    #[test]
    fn remove_if_same_ignores_other_objects() {
        let cache = Cache::new(CacheConfig::default()).unwrap();
        let key = CacheKey::http("http://a/").unwrap();
        let a = cache.find_or_create(key.clone(), Visibility::Private, None).unwrap();
        let b = cache.find_or_create(key.clone(), Visibility::Private, None).unwrap();

        let mut table = ObjectTable::default();
        assert!(table.insert(key.clone(), a.clone()).is_none());
        assert!(table.remove_if_same(&key, &b).is_none());
        assert_eq!(table.len(), 1);
        assert!(Object::ptr_eq(&table.find(&key).unwrap(), &a));
        assert!(table.remove_if_same(&key, &a).is_some());
        assert!(table.find(&key).is_none());
        assert!(table.remove(&key).is_none());
    }
}
