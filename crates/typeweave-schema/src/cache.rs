//! Memoisation for type-keyed lookups.
//!
//! Entries are keyed by a type identity and an optional discriminator (for
//! example a namespace name). Population is lazy and writes are idempotent:
//! when two threads compute the same entry concurrently, the first insert
//! wins and both observe the same value afterwards. Caches are only emptied
//! by an explicit clear, which the engine does whenever registrations change.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::types::TypeId;

/// Cache key: a type plus an optional discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub ty: TypeId,
    pub discriminator: Option<String>,
}

impl CacheKey {
    pub fn of(ty: TypeId) -> Self {
        Self {
            ty,
            discriminator: None,
        }
    }

    pub fn with(ty: TypeId, discriminator: impl Into<String>) -> Self {
        Self {
            ty,
            discriminator: Some(discriminator.into()),
        }
    }
}

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub name: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

pub(crate) struct Cache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(cache = self.name, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Return the cached value or compute and store it. Errors are not cached.
    ///
    /// `compute` runs without holding the lock, so it may itself consult this
    /// or other caches.
    pub(crate) fn get_or_try_insert_with<E>(
        &self,
        key: &K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.entry(key.clone()).or_insert(value).clone())
    }

    pub(crate) fn get_or_insert_with(&self, key: &K, compute: impl FnOnce() -> V) -> V {
        match self.get_or_try_insert_with::<std::convert::Infallible>(key, || Ok(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    pub(crate) fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn info(&self) -> CacheInfo {
        CacheInfo {
            name: self.name,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hits_and_misses() {
        let cache: Cache<u32, String> = Cache::new("test");
        assert_eq!(cache.get_or_insert_with(&1, || "one".to_string()), "one");
        assert_eq!(cache.get_or_insert_with(&1, || "uno".to_string()), "one");
        let info = cache.info();
        assert_eq!((info.hits, info.misses, info.size), (1, 1, 1));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache: Cache<u32, u32> = Cache::new("test");
        let result: Result<u32, &str> = cache.get_or_try_insert_with(&7, || Err("boom"));
        assert!(result.is_err());
        assert_eq!(cache.info().size, 0);
        let result: Result<u32, &str> = cache.get_or_try_insert_with(&7, || Ok(49));
        assert_eq!(result, Ok(49));
    }

    #[test]
    fn test_clear() {
        let cache: Cache<u32, u32> = Cache::new("test");
        cache.get_or_insert_with(&1, || 1);
        cache.clear();
        assert_eq!(cache.info().size, 0);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn test_concurrent_population_is_idempotent() {
        let cache: Arc<Cache<u32, u64>> = Arc::new(Cache::new("test"));
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_insert_with(&0, || i))
            })
            .collect();
        let seen: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let stored = cache.get(&0).unwrap();
        assert!(seen.iter().all(|v| *v == stored));
        assert_eq!(cache.get_or_insert_with(&0, || 99), stored);
    }
}
