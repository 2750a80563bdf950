//! Error types for codechat-index.

use std::path::PathBuf;

use codechat_llm::LlmError;

/// Failures of a vector store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("collection operation failed: {0}")]
    Collection(String),

    #[error("upsert failed: {0}")]
    Upsert(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Read(e.to_string())
    }
}

impl From<Box<qdrant_client::QdrantError>> for StoreError {
    fn from(e: Box<qdrant_client::QdrantError>) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Errors that can occur during indexing, walking and querying.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Ingestion root does not exist, is not a directory, or cannot be listed.
    #[error("path not found or not readable: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding service failed for the text identified by `context`.
    #[error("embedding failed for {context}: {source}")]
    Embedding {
        context: String,
        #[source]
        source: LlmError,
    },

    /// The persistent index could not be reached or written.
    #[error("index unavailable during {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl IndexError {
    pub(crate) fn store(context: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let context = context.into();
        move |source| Self::Store { context, source }
    }
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
