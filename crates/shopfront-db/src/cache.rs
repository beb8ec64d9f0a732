//! Read-through cache for hot catalog reads.
//!
//! Values are stored as JSON bytes behind the [`KvStore`] trait. The default
//! backend is an in-process map; a networked store only needs to implement
//! the four trait methods. Every catalog mutation invalidates the keys it
//! affects, so a cached value is never served after the write that changed it
//! has committed.
//!
//! Each key carries a generation that invalidation bumps. A load records the
//! generation before it queries and only stores its result if the generation
//! is unchanged, so a read that overlapped a write cannot re-fill the cache
//! with the pre-write value.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::{de::DeserializeOwned, Serialize};

use crate::DbError;

const PREFIX: &str = "product";

/// A cache key together with the components it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    fn from_parts(parts: &[&str]) -> Self {
        let mut key = String::from(PREFIX);
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        Self { key }
    }

    #[must_use]
    pub fn product_images(product_id: i64) -> Self {
        Self::from_parts(&["product", &product_id.to_string(), "images"])
    }

    #[must_use]
    pub fn product_variants(product_id: i64) -> Self {
        Self::from_parts(&["product", &product_id.to_string(), "variant"])
    }

    #[must_use]
    pub fn attribute_values(attribute_id: i64) -> Self {
        Self::from_parts(&["attribute", "values", &attribute_id.to_string()])
    }

    #[must_use]
    pub fn category_children(category_id: i64) -> Self {
        Self::from_parts(&["category", &category_id.to_string(), "children"])
    }

    #[must_use]
    pub fn featured(limit: i64) -> Self {
        Self::from_parts(&["featured", &limit.to_string()])
    }

    /// Prefix shared by every featured-products key regardless of limit.
    #[must_use]
    pub fn featured_prefix() -> String {
        format!("{PREFIX}:featured:")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Byte-level key/value backend.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>);
    /// Returns whether a value was removed.
    fn delete(&self, key: &str) -> bool;
    /// Returns the number of values removed.
    fn delete_prefix(&self, prefix: &str) -> usize;
}

/// Process-local store. The lock is never held across an `.await`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn delete_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }
}

/// Typed JSON cache over a shared [`KvStore`].
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KvStore>,
    generations: Arc<Mutex<HashMap<String, u64>>>,
}

impl fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadThroughCache").finish_non_exhaustive()
    }
}

impl Default for ReadThroughCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ReadThroughCache {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            generations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        *self.generations().entry(key.as_str().to_string()).or_default()
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Cached value for `key`. An entry that no longer decodes as `T` is
    /// dropped and reported as a miss.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.store.get(key.as_str())?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                self.store.delete(key.as_str());
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.store.set(key.as_str(), bytes),
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to encode cache entry"),
        }
    }

    /// Return the cached value, or run `load`, store its result, and return it.
    /// Errors from `load` are returned without caching anything.
    ///
    /// # Errors
    ///
    /// Returns whatever `load` returns.
    pub async fn get_or_load<T, F, Fut>(&self, key: &CacheKey, load: F) -> Result<T, DbError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        if let Some(hit) = self.get(key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit);
        }
        let seen = self.generation(key);
        let value = load().await?;

        // Held across the compare and the store so no invalidation slips in
        // between them.
        let generations = self.generations();
        if generations.get(key.as_str()) == Some(&seen) {
            self.set(key, &value);
        } else {
            tracing::debug!(key = %key, "key invalidated during load; not caching");
        }
        Ok(value)
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut generations = self.generations();
        *generations.entry(key.as_str().to_string()).or_default() += 1;
        self.store.delete(key.as_str())
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut generations = self.generations();
        for (key, generation) in generations.iter_mut() {
            if key.starts_with(prefix) {
                *generation += 1;
            }
        }
        self.store.delete_prefix(prefix)
    }

    // -----------------------------------------------------------------------
    // Invalidation sets for catalog writes
    // -----------------------------------------------------------------------

    /// Drop everything derived from one product.
    pub fn invalidate_product(&self, product_id: i64) {
        self.invalidate(&CacheKey::product_images(product_id));
        self.invalidate(&CacheKey::product_variants(product_id));
        self.invalidate_prefix(&CacheKey::featured_prefix());
    }

    /// Drop the children lists of `category_id` and of its old and new parents.
    pub fn invalidate_category(&self, category_id: i64, parents: &[Option<i64>]) {
        self.invalidate(&CacheKey::category_children(category_id));
        for parent in parents.iter().flatten() {
            self.invalidate(&CacheKey::category_children(*parent));
        }
    }

    pub fn invalidate_attribute(&self, attribute_id: i64) {
        self.invalidate(&CacheKey::attribute_values(attribute_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_the_product_namespace() {
        assert_eq!(CacheKey::product_images(7).as_str(), "product:product:7:images");
        assert_eq!(CacheKey::product_variants(7).as_str(), "product:product:7:variant");
        assert_eq!(
            CacheKey::attribute_values(3).as_str(),
            "product:attribute:values:3"
        );
        assert_eq!(
            CacheKey::category_children(2).to_string(),
            "product:category:2:children"
        );
        assert!(CacheKey::featured(8)
            .as_str()
            .starts_with(&CacheKey::featured_prefix()));
    }

    #[test]
    fn set_then_get_returns_value() {
        let cache = ReadThroughCache::in_memory();
        let key = CacheKey::product_images(1);
        cache.set(&key, &vec!["a.png".to_string()]);
        assert_eq!(cache.get::<Vec<String>>(&key), Some(vec!["a.png".to_string()]));
    }

    #[test]
    fn undecodable_entry_is_a_miss_and_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let cache = ReadThroughCache::new(store.clone());
        let key = CacheKey::product_images(1);
        store.set(key.as_str(), b"not json".to_vec());
        assert_eq!(cache.get::<Vec<String>>(&key), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn get_or_load_runs_loader_once() {
        let cache = ReadThroughCache::in_memory();
        let key = CacheKey::attribute_values(4);

        let first: Vec<i64> = cache
            .get_or_load(&key, || async { Ok(vec![1, 2]) })
            .await
            .expect("first load");
        let second: Vec<i64> = cache
            .get_or_load(&key, || async { Err(DbError::NotFound) })
            .await
            .expect("served from cache");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache = ReadThroughCache::in_memory();
        let key = CacheKey::featured(8);
        let miss: Result<Vec<i64>, DbError> =
            cache.get_or_load(&key, || async { Err(DbError::NotFound) }).await;
        assert!(matches!(miss, Err(DbError::NotFound)));
        assert_eq!(cache.get::<Vec<i64>>(&key), None);
    }

    #[tokio::test]
    async fn load_overlapping_an_invalidation_is_not_stored() {
        let cache = ReadThroughCache::in_memory();
        let key = CacheKey::product_variants(1);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let loader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(&key, || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(vec!["old-stock".to_string()])
                    })
                    .await
            })
        };

        started_rx.await.expect("loader started");
        cache.invalidate_product(1);
        release_tx.send(()).expect("loader waiting");

        let served = loader.await.expect("join").expect("load");
        assert_eq!(served, vec!["old-stock".to_string()]);
        assert_eq!(cache.get::<Vec<String>>(&key), None);

        let fresh: Vec<String> = cache
            .get_or_load(&key, || async { Ok(vec!["new-stock".to_string()]) })
            .await
            .expect("reload");
        assert_eq!(fresh, vec!["new-stock".to_string()]);
        assert_eq!(cache.get::<Vec<String>>(&key), Some(fresh));
    }

    #[tokio::test]
    async fn prefix_invalidation_also_discards_inflight_loads() {
        let cache = ReadThroughCache::in_memory();
        let key = CacheKey::featured(8);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let loader = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(&key, || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(vec![1_i64])
                    })
                    .await
            })
        };

        started_rx.await.expect("loader started");
        cache.invalidate_prefix(&CacheKey::featured_prefix());
        release_tx.send(()).expect("loader waiting");

        loader.await.expect("join").expect("load");
        assert_eq!(cache.get::<Vec<i64>>(&key), None);
    }

    #[test]
    fn invalidate_product_clears_its_keys_and_featured_lists() {
        let store = Arc::new(MemoryStore::new());
        let cache = ReadThroughCache::new(store.clone());
        cache.set(&CacheKey::product_images(1), &1);
        cache.set(&CacheKey::product_variants(1), &1);
        cache.set(&CacheKey::featured(4), &1);
        cache.set(&CacheKey::featured(8), &1);
        cache.set(&CacheKey::product_images(2), &2);

        cache.invalidate_product(1);

        assert_eq!(store.len(), 1);
        assert_eq!(cache.get::<i32>(&CacheKey::product_images(2)), Some(2));
    }

    #[test]
    fn invalidate_category_clears_old_and_new_parents() {
        let cache = ReadThroughCache::in_memory();
        for id in [1, 2, 3] {
            cache.set(&CacheKey::category_children(id), &Vec::<i64>::new());
        }
        cache.invalidate_category(3, &[Some(1), None]);
        assert!(cache.get::<Vec<i64>>(&CacheKey::category_children(3)).is_none());
        assert!(cache.get::<Vec<i64>>(&CacheKey::category_children(1)).is_none());
        assert!(cache.get::<Vec<i64>>(&CacheKey::category_children(2)).is_some());
    }
}
