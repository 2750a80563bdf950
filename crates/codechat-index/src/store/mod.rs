//! Persistent similarity index backends.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod qdrant;
mod sqlite;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;

pub use qdrant::{DEFAULT_COLLECTION, QdrantStore};
pub use sqlite::SqliteStore;

use crate::chunker::Chunk;
pub use crate::error::StoreError;

/// A chunk with its embedding, as written to the index.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A stored chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk: Chunk,
    /// Cosine similarity, higher is closer.
    pub score: f32,
}

/// Future returned by [`VectorStore`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable vector index keyed by chunk id.
///
/// Every write is persisted before its future resolves. Implementations are
/// responsible for their own concurrency safety.
pub trait VectorStore: Send + Sync {
    /// Create the backing collection for `vector_size`-dimensional vectors if
    /// it does not exist yet.
    fn ensure_collection(&self, vector_size: u64) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Insert or overwrite points by chunk id.
    fn upsert(&self, points: Vec<VectorPoint>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Up to `limit` nearest records, nearest first.
    fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>>;

    /// Up to `limit` nearest records of one file, nearest first.
    fn search_file(
        &self,
        vector: Vec<f32>,
        file_path: &str,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>>;

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>>;

    /// Remove every record.
    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Chunk id to content hash for every record of one file.
    fn file_hashes(
        &self,
        file_path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, StoreError>>;

    /// Distinct file paths with at least one record.
    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>>;

    fn delete(&self, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Record count per language id.
    fn language_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>>;

    /// Record count per stored chunk kind label.
    fn kind_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
pub(crate) fn sample_chunk(file_path: &str, start_line: usize, content: &str) -> Chunk {
    let start_byte = start_line * 100;
    Chunk {
        id: crate::chunker::chunk_id(file_path, start_byte),
        file_path: file_path.to_owned(),
        language: crate::languages::detect_language(std::path::Path::new(file_path)),
        kind: "function_definition".into(),
        entity_name: Some(format!("f{start_line}")),
        start_line,
        end_line: start_line + 4,
        start_byte,
        content: content.to_owned(),
        content_hash: crate::chunker::content_hash(content),
        repo_name: Some("demo".into()),
        git_branch: Some("main".into()),
    }
}
