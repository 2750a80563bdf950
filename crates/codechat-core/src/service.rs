//! The `CodeChat` facade: the only operations a transport or UI layer calls.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use codechat_index::chunker::Chunker;
use codechat_index::walker::WalkerConfig;
use codechat_index::{EmbeddingIndex, SearchHit};
use codechat_llm::{LlmProvider, Message};
use serde::Serialize;

use crate::config::Config;
use crate::error::{CodeChatError, Result};
use crate::job::{IngestOptions, IngestionManager, JobHandle, JobStatus};
use crate::rag::{Answer, RagConfig, RagEngine};
use crate::watch::RepoWatcher;

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_chunks: u64,
    /// Chunk count per language id.
    pub languages: BTreeMap<String, u64>,
    /// Chunk count per chunk type (`function_item`, `block`, `window`, ...).
    pub kinds: BTreeMap<String, u64>,
    pub files: usize,
}

pub struct CodeChat<P: LlmProvider> {
    index: EmbeddingIndex<P>,
    jobs: IngestionManager<P>,
    rag: RagEngine<P>,
    walker: WalkerConfig,
    default_k: usize,
    watch_debounce: Duration,
}

impl<P: LlmProvider + 'static> CodeChat<P> {
    /// Wire the job manager and answer synthesizer around one index.
    #[must_use]
    pub fn new(index: EmbeddingIndex<P>, config: &Config) -> Self {
        let walker = config.walker_config();
        let jobs = IngestionManager::new(
            index.clone(),
            Chunker::new(config.chunker_config()),
            walker.clone(),
            IngestOptions {
                batch_size: config.ingest.batch_size,
                git_metadata: config.ingest.git_metadata,
            },
        );
        let rag = RagEngine::new(
            index.clone(),
            RagConfig {
                score_threshold: config.retrieval.score_threshold,
                history_budget_tokens: config.retrieval.history_budget_tokens,
                system_prompt: config
                    .retrieval
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| RagConfig::default().system_prompt),
            },
        );
        Self {
            index,
            jobs,
            rag,
            walker,
            default_k: config.retrieval.default_k,
            watch_debounce: Duration::from_millis(config.ingest.watch_debounce_ms),
        }
    }

    /// Start ingesting `root` in the background.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::PathNotFound`] or
    /// [`CodeChatError::JobAlreadyRunning`]; neither starts a run.
    pub fn ingest(&self, root: &Path) -> Result<JobHandle> {
        self.jobs.start(root)
    }

    /// Watch `root` and re-ingest incrementally after file changes.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be watched.
    pub fn watch(&self, root: &Path) -> anyhow::Result<RepoWatcher> {
        RepoWatcher::start(root, self.jobs.clone(), &self.walker, self.watch_debounce)
    }
}

impl<P: LlmProvider> CodeChat<P> {
    #[must_use]
    pub fn job_status(&self) -> JobStatus {
        self.jobs.status()
    }

    /// Cancel the run in progress, if any.
    pub fn cancel(&self) -> bool {
        self.jobs.cancel()
    }

    #[must_use]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        self.index.provider()
    }

    /// Answer `question` from the index. `k` falls back to the configured default.
    ///
    /// # Errors
    ///
    /// See [`RagEngine::answer`].
    pub async fn query(
        &self,
        question: &str,
        k: Option<usize>,
        history: &[Message],
    ) -> Result<Answer> {
        self.rag
            .answer(question, k.unwrap_or(self.default_k), history)
            .await
    }

    /// Raw nearest-neighbour retrieval, without generation or thresholding.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::InvalidArgument`] for empty text or `k == 0`,
    /// otherwise embedding or index failures.
    pub async fn search(&self, text: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        if text.trim().is_empty() {
            return Err(CodeChatError::InvalidArgument(
                "search text must not be empty".into(),
            ));
        }
        Ok(self.index.query(text, k.unwrap_or(self.default_k)).await?)
    }

    /// Like [`search`](Self::search), restricted to chunks of one indexed file.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::InvalidArgument`] for empty text, an empty
    /// path or `k == 0`, otherwise embedding or index failures.
    pub async fn search_in_file(
        &self,
        text: &str,
        file_path: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        if text.trim().is_empty() {
            return Err(CodeChatError::InvalidArgument(
                "search text must not be empty".into(),
            ));
        }
        let file_path = file_path.trim().trim_start_matches("./");
        if file_path.is_empty() {
            return Err(CodeChatError::InvalidArgument(
                "file path must not be empty".into(),
            ));
        }
        Ok(self
            .index
            .query_file(text, file_path, k.unwrap_or(self.default_k))
            .await?)
    }

    /// # Errors
    ///
    /// Returns [`CodeChatError::IndexUnavailable`] if the index cannot be read.
    pub async fn stats(&self) -> Result<IndexStats> {
        let total_chunks = self.index.count().await?;
        let languages = self.index.language_counts().await?;
        let kinds = self.index.kind_counts().await?;
        let files = self.index.indexed_files().await?.len();
        Ok(IndexStats {
            total_chunks,
            languages,
            kinds,
            files,
        })
    }

    /// Clear the index and return the job record to `idle`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::JobAlreadyRunning`] while a run is processing.
    pub async fn reset(&self) -> Result<()> {
        self.jobs.reset().await
    }
}
