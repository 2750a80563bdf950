//! Embedding/index service: embeds chunks and queries through a [`VectorStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use codechat_llm::provider::LlmProvider;

use crate::chunker::{Chunk, base_kind};
use crate::context::contextualize_for_embedding;
use crate::error::{IndexError, Result};
use crate::store::{SearchHit, VectorPoint, VectorStore};

/// Pairs one embedding provider with one persistent store, so indexing and
/// querying always share a vector space.
pub struct EmbeddingIndex<P: LlmProvider> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
}

impl<P: LlmProvider> Clone for EmbeddingIndex<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<P: LlmProvider> EmbeddingIndex<P> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<P>) -> Self {
        Self { store, provider }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Embed and write `chunks`, overwriting any record with the same id.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] naming the failing chunk, or
    /// [`IndexError::Store`] if the write fails.
    pub async fn upsert(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let text = contextualize_for_embedding(chunk);
            let vector =
                self.provider
                    .embed(&text)
                    .await
                    .map_err(|source| IndexError::Embedding {
                        context: format!(
                            "chunk {} ({}:{}-{})",
                            chunk.id, chunk.file_path, chunk.start_line, chunk.end_line
                        ),
                        source,
                    })?;
            points.push(VectorPoint {
                chunk: chunk.clone(),
                vector,
            });
        }

        let vector_size = points.first().map_or(0, |p| p.vector.len() as u64);
        self.store
            .ensure_collection(vector_size)
            .await
            .map_err(IndexError::store("ensure collection"))?;

        let written = points.len();
        self.store
            .upsert(points)
            .await
            .map_err(IndexError::store(format!("upsert of {written} chunks")))?;
        tracing::debug!(written, "upserted chunks");
        Ok(written)
    }

    /// The `k` records nearest to `text`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] if `k` is 0, otherwise embedding
    /// or store failures.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        let vector = self
            .provider
            .embed(text)
            .await
            .map_err(|source| IndexError::Embedding {
                context: format!("query {text:?}"),
                source,
            })?;
        let mut hits = self
            .store
            .search(vector, k as u64)
            .await
            .map_err(IndexError::store(format!("search for {text:?}")))?;
        hits.truncate(k);
        tracing::debug!(k, returned = hits.len(), "index query");
        Ok(hits)
    }

    /// The `k` records of `file_path` nearest to `text`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidArgument`] if `k` is 0, otherwise embedding
    /// or store failures.
    pub async fn query_file(&self, text: &str, file_path: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument("k must be at least 1".into()));
        }
        let vector = self
            .provider
            .embed(text)
            .await
            .map_err(|source| IndexError::Embedding {
                context: format!("query {text:?} in {file_path}"),
                source,
            })?;
        let mut hits = self
            .store
            .search_file(vector, file_path, k as u64)
            .await
            .map_err(IndexError::store(format!("search in {file_path}")))?;
        hits.truncate(k);
        tracing::debug!(k, file_path, returned = hits.len(), "file query");
        Ok(hits)
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn count(&self) -> Result<u64> {
        self.store.count().await.map_err(IndexError::store("count"))
    }

    /// Remove every record. A following [`count`](Self::count) returns 0.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be cleared.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await.map_err(IndexError::store("clear"))?;
        tracing::info!("index cleared");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn file_hashes(&self, file_path: &str) -> Result<HashMap<String, String>> {
        self.store
            .file_hashes(file_path)
            .await
            .map_err(IndexError::store(format!("hash lookup for {file_path}")))
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn indexed_files(&self) -> Result<Vec<String>> {
        self.store
            .indexed_files()
            .await
            .map_err(IndexError::store("list indexed files"))
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the delete fails.
    pub async fn delete(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let n = ids.len();
        self.store
            .delete(ids)
            .await
            .map_err(IndexError::store(format!("delete of {n} chunks")))
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn language_counts(&self) -> Result<BTreeMap<String, u64>> {
        self.store
            .language_counts()
            .await
            .map_err(IndexError::store("language counts"))
    }

    /// Record count per unit kind, with merged labels folded into their kind.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Store`] if the store cannot be read.
    pub async fn kind_counts(&self) -> Result<BTreeMap<String, u64>> {
        let labels = self
            .store
            .kind_counts()
            .await
            .map_err(IndexError::store("kind counts"))?;
        let mut counts = BTreeMap::new();
        for (label, n) in labels {
            *counts.entry(base_kind(&label).to_owned()).or_insert(0) += n;
        }
        Ok(counts)
    }
}
