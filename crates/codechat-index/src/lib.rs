//! Code chunking, repository walking and the embedding index.
//!
//! Source files are split into line-bounded chunks (tree-sitter units where a
//! grammar is available, sliding windows otherwise), embedded through an
//! [`codechat_llm::LlmProvider`] and stored in a [`store::VectorStore`].

pub mod chunker;
pub mod context;
pub mod error;
pub mod git;
pub mod index;
pub mod languages;
pub mod store;
pub mod walker;

pub use chunker::{Chunk, Chunker, ChunkerConfig, SkipReason};
pub use error::{IndexError, Result};
pub use git::{RepoInfo, repo_info};
pub use index::EmbeddingIndex;
pub use languages::{Lang, detect_language};
pub use store::{QdrantStore, SearchHit, SqliteStore, StoreError, VectorStore};
pub use walker::{WalkOutcome, WalkerConfig, walk};
