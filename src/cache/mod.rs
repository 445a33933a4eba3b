//! Thread-safe keyed cache.
//!
//! [`KeyedCache`] is the concurrent key→value store underneath the
//! configuration cache and the compiled-template cache. It is a thin policy-
//! free wrapper over a concurrent map: readers and writers may race freely,
//! mutations are serialized per shard by the map itself, and nothing ever
//! expires implicitly. Eviction is explicit (`remove`/`clear`) or happens at
//! process exit.
//!
//! Keys are `String`s; the type system rules out null keys. Policy concerns
//! (empty-key rejection, protected entries, per-principal bypass) live in
//! [`crate::config::cache::ConfigCache`].

use dashmap::DashMap;

/// A process-lifetime key→value store safe for concurrent access.
///
/// Values are cloned out on read, so `V` is typically a cheap handle
/// (`Arc<...>`) rather than a large owned structure.
#[derive(Debug)]
pub struct KeyedCache<V: Clone> {
    entries: DashMap<String, V>,
}

impl<V: Clone> KeyedCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Returns the value for `key`, or `None` if there is no mapping.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts a key-value pair, returning the previous value if any.
    pub fn put(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(key.into(), value)
    }

    /// Tests whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the mapping for `key`, returning the previous value if any.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Removes all mappings.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of key-value pairs currently cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the cache holds no mappings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for KeyedCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cache: KeyedCache<String> = KeyedCache::new();
        assert!(cache.get("a").is_none());

        cache.put("a", "alpha".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("alpha"));
        assert!(cache.contains_key("a"));

        assert_eq!(cache.remove("a").as_deref(), Some("alpha"));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn put_replaces_and_returns_previous() {
        let cache: KeyedCache<u32> = KeyedCache::new();
        assert_eq!(cache.put("k", 1), None);
        assert_eq!(cache.put("k", 2), Some(1));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: KeyedCache<u32> = KeyedCache::new();
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
