//! Source bucket enumeration.
//!
//! The [`Paginator`] turns an opaque listing cursor into bounded pages of
//! [`ObjectRecord`](crate::store::ObjectRecord)s, preserving the order the backend returns them in.

use crate::config::MAX_KEYS_CEILING;
use crate::error::{ReplicateError, Result};
use crate::store::{ListPage, SharedStore};
use tracing::debug;

/// Paginated listing over the source bucket.
pub struct Paginator {
    store: SharedStore,
    prefix: String,
    page_size: usize,
}

impl Paginator {
    /// Create a paginator; the page size is clamped to `1..=1000`.
    pub fn new(store: SharedStore, prefix: impl Into<String>, page_size: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            page_size: page_size.clamp(1, MAX_KEYS_CEILING),
        }
    }

    /// Effective records-per-call.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch the page that follows `cursor`.
    ///
    /// A backend failure and a page without records are both listing errors;
    /// an empty page is not treated as the end of the enumeration, only an
    /// empty next cursor is.
    pub async fn fetch_page(&self, cursor: &str) -> Result<ListPage> {
        let page = self
            .store
            .list(&self.prefix, cursor, self.page_size)
            .await
            .map_err(|e| ReplicateError::listing(cursor, e.to_string()))?;

        if page.records.is_empty() {
            return Err(ReplicateError::listing(cursor, "empty listing"));
        }

        debug!(
            "Listed {} objects from {} after marker '{}' (next: '{}')",
            page.records.len(),
            self.store.bucket(),
            cursor,
            page.next_cursor
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, START_CURSOR};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn bucket(count: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::new("origin");
        for i in 0..count {
            store.insert(format!("obj/{:04}", i), vec![b'x'; i % 7]);
        }
        Arc::new(store)
    }

    async fn drain(paginator: &Paginator) -> Vec<String> {
        let mut keys = Vec::new();
        let mut cursor = START_CURSOR.to_string();
        loop {
            let page = paginator.fetch_page(&cursor).await.unwrap();
            keys.extend(page.records.iter().map(|r| r.key.clone()));
            if page.is_last() {
                return keys;
            }
            cursor = page.next_cursor;
        }
    }

    #[tokio::test]
    async fn test_visits_every_key_once_in_ceil_k_over_p_calls() {
        for (count, page_size) in [(10, 3), (9, 3), (1, 1000), (2500, 1000)] {
            let store = bucket(count);
            let paginator = Paginator::new(store.clone(), "", page_size);

            let keys = drain(&paginator).await;

            let unique: HashSet<_> = keys.iter().collect();
            assert_eq!(keys.len(), count);
            assert_eq!(unique.len(), count);
            assert_eq!(store.list_calls(), count.div_ceil(page_size));
            assert_eq!(keys, store.keys(), "listing order must be preserved");
        }
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let store = bucket(1);
        assert_eq!(Paginator::new(store.clone(), "", 5000).page_size(), 1000);
        assert_eq!(Paginator::new(store, "", 0).page_size(), 1);
    }

    #[tokio::test]
    async fn test_prefix_limits_enumeration() {
        let store = MemoryStore::new("origin");
        store.insert("logs/a", "1");
        store.insert("media/a", "2");
        store.insert("media/b", "3");
        let paginator = Paginator::new(Arc::new(store), "media/", 10);

        assert_eq!(drain(&paginator).await, vec!["media/a", "media/b"]);
    }

    #[tokio::test]
    async fn test_empty_page_is_listing_error() {
        let paginator = Paginator::new(bucket(0), "", 10);
        let err = paginator.fetch_page(START_CURSOR).await.unwrap_err();
        assert!(matches!(err, ReplicateError::Listing { ref message, .. } if message == "empty listing"));
    }

    #[tokio::test]
    async fn test_stale_cursor_is_listing_error() {
        let paginator = Paginator::new(bucket(3), "", 10);
        let err = paginator.fetch_page("zzz").await.unwrap_err();
        assert!(matches!(err, ReplicateError::Listing { ref cursor, .. } if cursor == "zzz"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_listing_error() {
        let store = bucket(5);
        store.fail_list_at("obj/0001", 1);
        let paginator = Paginator::new(store, "", 2);

        let first = paginator.fetch_page(START_CURSOR).await.unwrap();
        let err = paginator.fetch_page(&first.next_cursor).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
