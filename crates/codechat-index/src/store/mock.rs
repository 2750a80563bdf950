//! Test-only store doubles.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{BoxFuture, SearchHit, StoreError, VectorPoint, VectorStore};

/// A store whose backend never answers: every call fails with
/// [`StoreError::Connection`].
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore {
    calls: Arc<AtomicUsize>,
}

impl UnavailableStore {
    /// Number of store calls attempted so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn refuse<T: Send + 'static>(&self) -> BoxFuture<'_, Result<T, StoreError>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { Err(StoreError::Connection("connection refused".into())) })
    }
}

impl VectorStore for UnavailableStore {
    fn ensure_collection(&self, _vector_size: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        self.refuse()
    }

    fn upsert(&self, _points: Vec<VectorPoint>) -> BoxFuture<'_, Result<(), StoreError>> {
        self.refuse()
    }

    fn search(
        &self,
        _vector: Vec<f32>,
        _limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>> {
        self.refuse()
    }

    fn search_file(
        &self,
        _vector: Vec<f32>,
        _file_path: &str,
        _limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>> {
        self.refuse()
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        self.refuse()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        self.refuse()
    }

    fn file_hashes(
        &self,
        _file_path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, StoreError>> {
        self.refuse()
    }

    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        self.refuse()
    }

    fn delete(&self, _ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>> {
        self.refuse()
    }

    fn language_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        self.refuse()
    }

    fn kind_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        self.refuse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_call_is_a_connection_error() {
        let store = UnavailableStore::default();
        assert!(matches!(store.count().await, Err(StoreError::Connection(_))));
        assert!(matches!(
            store.search(vec![0.0; 4], 3).await,
            Err(StoreError::Connection(_))
        ));
        assert_eq!(store.calls(), 2);
    }
}
