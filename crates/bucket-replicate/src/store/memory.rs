//! In-process bucket backed by a sorted map.
//!
//! Listing follows S3 marker semantics (keys strictly greater than the marker,
//! lexicographic order). Failures can be injected per listing cursor and per key,
//! and an artificial per-call latency makes concurrency observable in tests.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ListPage, ObjectRecord, ObjectStore, StoreError};

/// Pending injected failures, keyed by cursor (list) or object key (get/put).
#[derive(Debug, Default)]
struct Faults {
    list: HashMap<String, usize>,
    get: HashMap<String, usize>,
    put: HashMap<String, usize>,
}

/// Consume one pending failure for `name`, if any.
fn take_fault(faults: &mut HashMap<String, usize>, name: &str) -> bool {
    match faults.get_mut(name) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrements the in-flight counter when a call finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// ObjectStore held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Bytes>>,
    faults: Mutex<Faults>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    gets_in_flight: AtomicUsize,
    max_gets_in_flight: AtomicUsize,
    put_log: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Create an empty bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(Faults::default()),
            latency: None,
            list_calls: AtomicUsize::new(0),
            gets_in_flight: AtomicUsize::new(0),
            max_gets_in_flight: AtomicUsize::new(0),
            put_log: Mutex::new(Vec::new()),
        }
    }

    /// Delay every get and put by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store an object directly, bypassing fault injection and the put log.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        lock(&self.objects).insert(key.into(), data.into());
    }

    /// Contents of an object, if present.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        lock(&self.objects).get(key).cloned()
    }

    /// All keys in listing order.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Whether the bucket holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail the next `times` listing calls made with `cursor`.
    pub fn fail_list_at(&self, cursor: impl Into<String>, times: usize) {
        lock(&self.faults).list.insert(cursor.into(), times);
    }

    /// Fail the next `times` gets of `key`.
    pub fn fail_get(&self, key: impl Into<String>, times: usize) {
        lock(&self.faults).get.insert(key.into(), times);
    }

    /// Fail the next `times` puts of `key`.
    pub fn fail_put(&self, key: impl Into<String>, times: usize) {
        lock(&self.faults).put.insert(key.into(), times);
    }

    /// Number of listing calls served (including failed ones).
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Highest number of gets that were running at the same time.
    pub fn max_concurrent_gets(&self) -> usize {
        self.max_gets_in_flight.load(Ordering::SeqCst)
    }

    /// Keys of successful puts, in completion order.
    pub fn put_log(&self) -> Vec<String> {
        lock(&self.put_log).clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: &str,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if take_fault(&mut lock(&self.faults).list, cursor) {
            return Err(StoreError::Network {
                message: format!("injected listing failure at marker '{}'", cursor),
            });
        }

        let objects = lock(&self.objects);
        let lower = if cursor.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(cursor.to_string())
        };

        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .filter(|(key, _)| key.starts_with(prefix));

        let records: Vec<ObjectRecord> = matching
            .by_ref()
            .take(page_size)
            .map(|(key, data)| ObjectRecord::new(key.clone(), data.len() as u64))
            .collect();

        let next_cursor = match (matching.next(), records.last()) {
            (Some(_), Some(last)) => last.key.clone(),
            _ => String::new(),
        };

        Ok(ListPage {
            records,
            next_cursor,
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let running = self.gets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.gets_in_flight);
        self.max_gets_in_flight.fetch_max(running, Ordering::SeqCst);

        self.simulate_latency().await;

        if take_fault(&mut lock(&self.faults).get, key) {
            return Err(StoreError::Network {
                message: format!("injected get failure for {}", key),
            });
        }

        self.object(key).ok_or_else(|| StoreError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        self.simulate_latency().await;

        if take_fault(&mut lock(&self.faults).put, key) {
            return Err(StoreError::Network {
                message: format!("injected put failure for {}", key),
            });
        }

        lock(&self.objects).insert(key.to_string(), data);
        lock(&self.put_log).push(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::new("memory-bucket");
        for key in keys {
            store.insert(*key, format!("body of {}", key));
        }
        store
    }

    #[tokio::test]
    async fn test_list_pages_with_marker() {
        let store = store_with(&["a", "b", "c", "d", "e"]);

        let first = store.list("", "", 2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_cursor, "b");

        let second = store.list("", &first.next_cursor, 2).await.unwrap();
        assert_eq!(second.records[0].key, "c");
        assert_eq!(second.next_cursor, "d");

        let last = store.list("", &second.next_cursor, 2).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert!(last.is_last());
    }

    #[tokio::test]
    async fn test_exact_page_boundary_ends_listing() {
        let store = store_with(&["a", "b"]);
        let page = store.list("", "", 2).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.is_last());
    }

    #[tokio::test]
    async fn test_list_honours_prefix() {
        let store = store_with(&["logs/1", "logs/2", "media/1"]);
        let page = store.list("logs/", "", 10).await.unwrap();
        let keys: Vec<_> = page.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/1", "logs/2"]);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let store = store_with(&["a"]);
        store.fail_put("a", 1);

        assert!(store.put("a", Bytes::from_static(b"x")).await.is_err());
        assert!(store.put("a", Bytes::from_static(b"x")).await.is_ok());
        assert_eq!(store.put_log(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing_object_is_not_found() {
        let store = MemoryStore::new("memory-bucket");
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
