use std::collections::{BTreeMap, HashMap};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, PointsIdsList,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};

use super::{BoxFuture, SearchHit, StoreError, VectorPoint, VectorStore};
use crate::chunker::Chunk;
use crate::languages::Lang;

pub const DEFAULT_COLLECTION: &str = "codechat_chunks";

const SCROLL_PAGE: u32 = 256;

type Payload = HashMap<String, Value>;

/// Index stored in a `Qdrant` collection, one point per chunk.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl QdrantStore {
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the client cannot be built.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            collection: collection.into(),
        })
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn create_if_missing(&self, vector_size: u64) -> Result<(), StoreError> {
        if self.exists().await? {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| StoreError::Collection(e.to_string()))?;
        for field in ["file_path", "language"] {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    FieldType::Keyword,
                ))
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
        }
        tracing::info!(collection = %self.collection, vector_size, "created qdrant collection");
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let points = points
            .into_iter()
            .map(|p| {
                let payload = chunk_to_payload(&p.chunk)?;
                Ok(PointStruct::new(p.chunk.id, p.vector, payload))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| StoreError::Upsert(e.to_string()))?;
        Ok(())
    }

    async fn search_points(
        &self,
        vector: Vec<f32>,
        file_path: Option<String>,
        limit: u64,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }
        let mut request =
            SearchPointsBuilder::new(&self.collection, vector, limit).with_payload(true);
        if let Some(path) = file_path {
            request = request.filter(Filter::must([Condition::matches("file_path", path)]));
        }
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| StoreError::Search(e.to_string()))?;
        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let chunk = chunk_from_payload(&point.payload);
                if chunk.is_none() {
                    tracing::warn!(collection = %self.collection, "skipping point with malformed payload");
                }
                chunk.map(|chunk| SearchHit {
                    chunk,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn count_points(&self) -> Result<u64, StoreError> {
        if !self.exists().await? {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        if !self.exists().await? {
            return Ok(());
        }
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        tracing::info!(collection = %self.collection, "dropped qdrant collection");
        Ok(())
    }

    /// Every payload matching `filter`, following scroll pages to the end.
    async fn scroll_payloads(&self, filter: Option<Filter>) -> Result<Vec<Payload>, StoreError> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }
        let mut payloads = Vec::new();
        let mut offset: Option<PointId> = None;
        loop {
            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .with_payload(true)
                .with_vectors(false)
                .limit(SCROLL_PAGE);
            if let Some(f) = &filter {
                builder = builder.filter(f.clone());
            }
            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }
            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| StoreError::Read(e.to_string()))?;
            payloads.extend(response.result.into_iter().map(|p| p.payload));
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(payloads)
    }

    async fn hashes_for(&self, file_path: String) -> Result<HashMap<String, String>, StoreError> {
        let filter = Filter::must([Condition::matches("file_path", file_path)]);
        let payloads = self.scroll_payloads(Some(filter)).await?;
        Ok(payloads
            .iter()
            .filter_map(|p| Some((get_str(p, "chunk_id")?, get_str(p, "content_hash")?)))
            .collect())
    }

    async fn distinct_files(&self) -> Result<Vec<String>, StoreError> {
        let payloads = self.scroll_payloads(None).await?;
        let mut files: Vec<String> = payloads
            .iter()
            .filter_map(|p| get_str(p, "file_path"))
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }

    async fn delete_ids(&self, ids: Vec<String>) -> Result<(), StoreError> {
        if ids.is_empty() || !self.exists().await? {
            return Ok(());
        }
        let ids: Vec<PointId> = ids.into_iter().map(Into::into).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        Ok(())
    }

    /// Record count per value of a string payload field.
    async fn count_by(&self, field: &'static str) -> Result<BTreeMap<String, u64>, StoreError> {
        let payloads = self.scroll_payloads(None).await?;
        let mut counts = BTreeMap::new();
        for value in payloads.iter().filter_map(|p| get_str(p, field)) {
            *counts.entry(value).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

impl VectorStore for QdrantStore {
    fn ensure_collection(&self, vector_size: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.create_if_missing(vector_size))
    }

    fn upsert(&self, points: Vec<VectorPoint>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.upsert_points(points))
    }

    fn search(
        &self,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>> {
        Box::pin(self.search_points(vector, None, limit))
    }

    fn search_file(
        &self,
        vector: Vec<f32>,
        file_path: &str,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, StoreError>> {
        Box::pin(self.search_points(vector, Some(file_path.to_owned()), limit))
    }

    fn count(&self) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(self.count_points())
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.drop_collection())
    }

    fn file_hashes(
        &self,
        file_path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, StoreError>> {
        Box::pin(self.hashes_for(file_path.to_owned()))
    }

    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(self.distinct_files())
    }

    fn delete(&self, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.delete_ids(ids))
    }

    fn language_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        Box::pin(self.count_by("language"))
    }

    fn kind_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        Box::pin(self.count_by("kind"))
    }
}

fn chunk_to_payload(chunk: &Chunk) -> Result<Payload, StoreError> {
    serde_json::from_value(serde_json::json!({
        "chunk_id": chunk.id,
        "file_path": chunk.file_path,
        "language": chunk.language.id(),
        "kind": chunk.kind,
        "entity_name": chunk.entity_name,
        "start_line": chunk.start_line,
        "end_line": chunk.end_line,
        "start_byte": chunk.start_byte,
        "content": chunk.content,
        "content_hash": chunk.content_hash,
        "repo_name": chunk.repo_name,
        "git_branch": chunk.git_branch,
    }))
    .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn chunk_from_payload(payload: &Payload) -> Option<Chunk> {
    Some(Chunk {
        id: get_str(payload, "chunk_id")?,
        file_path: get_str(payload, "file_path")?,
        language: Lang::from_id(&get_str(payload, "language")?),
        kind: get_str(payload, "kind")?,
        entity_name: get_str(payload, "entity_name"),
        start_line: get_usize(payload, "start_line")?,
        end_line: get_usize(payload, "end_line")?,
        start_byte: get_usize(payload, "start_byte")?,
        content: get_str(payload, "content")?,
        content_hash: get_str(payload, "content_hash")?,
        repo_name: get_str(payload, "repo_name"),
        git_branch: get_str(payload, "git_branch"),
    })
}

fn get_str(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).cloned()
}

fn get_usize(payload: &Payload, key: &str) -> Option<usize> {
    payload
        .get(key)
        .and_then(Value::as_integer)
        .and_then(|v| usize::try_from(v).ok())
}
