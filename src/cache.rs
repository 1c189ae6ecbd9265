//! In-process caching: a bounded LRU of decoded scan slices, and a
//! separate short-TTL cache for whole query responses.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::entry::Entry;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlobSliceKey {
    blob_path: String,
    min_depth: u32,
    max_depth: u32,
}

struct Slot<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded LRU of `(blob_path, depth_range) -> entries`, evicting the
/// oldest entry once `capacity` is exceeded and expiring entries after
/// `ttl` regardless of recency.
pub struct ParquetCache {
    inner: Mutex<LruCache<BlobSliceKey, Slot<std::sync::Arc<Vec<Entry>>>>>,
    ttl: Duration,
}

impl ParquetCache {
    pub const DEFAULT_CAPACITY: usize = 10;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        ParquetCache {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, blob_path: &str, min_depth: u32, max_depth: u32) -> Option<std::sync::Arc<Vec<Entry>>> {
        let key = BlobSliceKey { blob_path: blob_path.to_string(), min_depth, max_depth };
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.get(&key) {
            if slot.inserted_at.elapsed() <= self.ttl {
                return Some(std::sync::Arc::clone(&slot.value));
            }
            inner.pop(&key);
        }
        None
    }

    pub fn put(&self, blob_path: &str, min_depth: u32, max_depth: u32, entries: Vec<Entry>) {
        let key = BlobSliceKey { blob_path: blob_path.to_string(), min_depth, max_depth };
        let slot = Slot { value: std::sync::Arc::new(entries), inserted_at: Instant::now() };
        self.inner.lock().unwrap().put(key, slot);
    }

    /// Drops every cached slice for a given blob, used after a delete
    /// rewrites that blob's contents.
    pub fn invalidate_blob(&self, blob_path: &str) {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<BlobSliceKey> = inner.iter().filter(|(k, _)| k.blob_path == blob_path).map(|(k, _)| k.clone()).collect();
        for key in stale {
            inner.pop(&key);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl Default for ParquetCache {
    fn default() -> Self {
        ParquetCache::new(Self::DEFAULT_CAPACITY, Self::DEFAULT_TTL)
    }
}

/// Short-TTL cache for whole query responses (list-scans, compare, …),
/// keyed by the caller-supplied composite string.
pub struct ResponseCache<V: Clone> {
    inner: Mutex<std::collections::HashMap<String, Slot<V>>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(ttl: Duration) -> Self {
        ResponseCache { inner: Mutex::new(std::collections::HashMap::new()), ttl }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let inner = self.inner.lock().unwrap();
        inner.get(key).filter(|slot| slot.inserted_at.elapsed() <= self.ttl).map(|slot| slot.value.clone())
    }

    pub fn put(&self, key: String, value: V) {
        self.inner.lock().unwrap().insert(key, Slot { value, inserted_at: Instant::now() });
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        ResponseCache::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryKind;

    fn sample_entry() -> Entry {
        Entry { path: ".".into(), parent: "".into(), uri: "/t".into(), kind: EntryKind::Dir, size: 0, mtime: 0.0, n_desc: 1, n_children: 0, depth: 0 }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = ParquetCache::default();
        cache.put("/t.parquet", 0, 2, vec![sample_entry()]);
        let got = cache.get("/t.parquet", 0, 2).unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ParquetCache::new(10, Duration::from_millis(1));
        cache.put("/t.parquet", 0, 2, vec![sample_entry()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("/t.parquet", 0, 2).is_none());
    }

    #[test]
    fn invalidate_blob_drops_all_its_slices() {
        let cache = ParquetCache::default();
        cache.put("/t.parquet", 0, 1, vec![sample_entry()]);
        cache.put("/t.parquet", 0, 2, vec![sample_entry()]);
        cache.invalidate_blob("/t.parquet");
        assert!(cache.get("/t.parquet", 0, 1).is_none());
        assert!(cache.get("/t.parquet", 0, 2).is_none());
    }

    #[test]
    fn response_cache_expires() {
        let cache: ResponseCache<String> = ResponseCache::new(Duration::from_millis(1));
        cache.put("k".into(), "v".into());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }
}
