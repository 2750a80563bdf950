use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use super::{BoxFuture, SearchHit, StoreError, VectorPoint, VectorStore, cosine_similarity};
use crate::chunker::Chunk;
use crate::languages::Lang;

const DIMENSION_KEY: &str = "vector_size";

/// Embedded index backed by a single `SQLite` file.
///
/// Vectors are stored as little-endian `f32` blobs and searched by brute-force
/// cosine similarity, which is adequate for a single repository.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: String,
    file_path: String,
    language: String,
    kind: String,
    entity_name: Option<String>,
    start_line: i64,
    end_line: i64,
    start_byte: i64,
    content: String,
    content_hash: String,
    vector: Vec<u8>,
    repo_name: Option<String>,
    git_branch: Option<String>,
}

impl ChunkRow {
    fn into_chunk(self) -> (Chunk, Vec<u8>) {
        let chunk = Chunk {
            id: self.id,
            file_path: self.file_path,
            language: Lang::from_id(&self.language),
            kind: self.kind,
            entity_name: self.entity_name,
            start_line: usize::try_from(self.start_line).unwrap_or_default(),
            end_line: usize::try_from(self.end_line).unwrap_or_default(),
            start_byte: usize::try_from(self.start_byte).unwrap_or_default(),
            content: self.content,
            content_hash: self.content_hash,
            repo_name: self.repo_name,
            git_branch: self.git_branch,
        };
        (chunk, self.vector)
    }
}

impl SqliteStore {
    /// Open (or create) the index database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the database cannot be opened or
    /// migrated.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // every in-memory connection is a separate database
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::debug!(path, "opened sqlite index");
        Ok(Self { pool })
    }

    async fn stored_dimension(&self) -> Result<Option<u64>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM index_meta WHERE key = ?")
            .bind(DIMENSION_KEY)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(v,)| {
            v.parse::<u64>()
                .map_err(|e| StoreError::Serialization(format!("stored vector size: {e}")))
        })
        .transpose()
    }

    async fn ensure_dimension(&self, vector_size: u64) -> Result<(), StoreError> {
        match self.stored_dimension().await? {
            Some(existing) if existing != vector_size => Err(StoreError::Collection(format!(
                "index holds {existing}-dimensional vectors, got {vector_size}"
            ))),
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
                    .bind(DIMENSION_KEY)
                    .bind(vector_size.to_string())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StoreError::Collection(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn upsert_points(&self, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Upsert(e.to_string()))?;
        for VectorPoint { chunk, vector } in points {
            sqlx::query(
                "INSERT OR REPLACE INTO chunks \
                 (id, file_path, language, kind, entity_name, start_line, end_line, \
                  start_byte, content, content_hash, vector, repo_name, git_branch) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.file_path)
            .bind(chunk.language.id())
            .bind(&chunk.kind)
            .bind(&chunk.entity_name)
            .bind(to_i64(chunk.start_line)?)
            .bind(to_i64(chunk.end_line)?)
            .bind(to_i64(chunk.start_byte)?)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(encode_vector(&vector))
            .bind(&chunk.repo_name)
            .bind(&chunk.git_branch)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Upsert(e.to_string()))?;
        }
        tx.commit()
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
        let rows: Vec<ChunkRow> = match &file_path {
            Some(path) => {
                sqlx::query_as("SELECT * FROM chunks WHERE file_path = ?")
                    .bind(path)
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query_as("SELECT * FROM chunks").fetch_all(&self.pool).await,
        }
        .map_err(|e| StoreError::Search(e.to_string()))?;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|row| {
                let (chunk, blob) = row.into_chunk();
                let score = cosine_similarity(&vector, &decode_vector(&blob));
                SearchHit { chunk, score }
            })
            .collect();
        // ties broken by id so results are stable across calls
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(hits)
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        Ok(())
    }

    async fn delete_ids(&self, ids: Vec<String>) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        for id in &ids {
            sqlx::query("DELETE FROM chunks WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Delete(e.to_string()))?;
        Ok(())
    }
}

impl VectorStore for SqliteStore {
    fn ensure_collection(&self, vector_size: u64) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.ensure_dimension(vector_size))
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
        Box::pin(async move {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await?;
            Ok(u64::try_from(n).unwrap_or_default())
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.clear_all())
    }

    fn file_hashes(
        &self,
        file_path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>, StoreError>> {
        let file_path = file_path.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT id, content_hash FROM chunks WHERE file_path = ?")
                    .bind(&file_path)
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().collect())
        })
    }

    fn indexed_files(&self) -> BoxFuture<'_, Result<Vec<String>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT DISTINCT file_path FROM chunks ORDER BY file_path")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows.into_iter().map(|(p,)| p).collect())
        })
    }

    fn delete(&self, ids: Vec<String>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.delete_ids(ids))
    }

    fn language_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT language, COUNT(*) FROM chunks GROUP BY language")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows
                .into_iter()
                .map(|(lang, n)| (lang, u64::try_from(n).unwrap_or_default()))
                .collect())
        })
    }

    fn kind_counts(&self) -> BoxFuture<'_, Result<BTreeMap<String, u64>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT kind, COUNT(*) FROM chunks GROUP BY kind")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows
                .into_iter()
                .map(|(kind, n)| (kind, u64::try_from(n).unwrap_or_default()))
                .collect())
        })
    }
}

fn to_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
