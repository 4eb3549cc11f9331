//! A bounded path lookup cache (specification §3's `LRU_CACHE_SIZE`).
//!
//! Backed by `moka::sync::Cache` rather than a hand-rolled LRU list (see
//! `SPEC_FULL.md` §3 and `DESIGN.md`): every hit is revalidated against the
//! trie before being trusted, so the eviction policy moka actually runs is
//! free to differ from a textbook LRU without breaking the invariant the
//! specification cares about — "if cached, the cache's entry agrees with the
//! trie."

use moka::sync::Cache;

pub struct PathCache {
    inner: Cache<String, usize>,
}

impl PathCache {
    pub fn new(capacity: u64) -> Self {
        Self { inner: Cache::new(capacity) }
    }

    /// Returns the cached index for `path` only if `trie_lookup` still agrees
    /// with it; otherwise evicts the stale entry and returns `None`.
    pub fn get_validated(&self, path: &str, trie_lookup: impl FnOnce() -> Option<usize>) -> Option<usize> {
        match self.inner.get(path) {
            Some(idx) => match trie_lookup() {
                Some(current) if current == idx => Some(idx),
                _ => {
                    self.inner.invalidate(path);
                    None
                }
            },
            None => None,
        }
    }

    pub fn insert(&self, path: String, file_idx: usize) {
        self.inner.insert(path, file_idx);
    }

    pub fn invalidate(&self, path: &str) {
        self.inner.invalidate(path);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_entry_is_rejected_and_evicted() {
        let cache = PathCache::new(16);
        cache.insert("a.txt".to_string(), 1);
        assert_eq!(cache.get_validated("a.txt", || Some(1)), Some(1));
        // trie now disagrees (file was deleted and the slot reused)
        assert_eq!(cache.get_validated("a.txt", || Some(2)), None);
        assert_eq!(cache.get_validated("a.txt", || Some(2)), None);
    }
}
