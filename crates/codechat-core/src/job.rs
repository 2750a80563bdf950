//! Ingestion job manager: one cancellable, pollable ingestion run at a time.
//!
//! The job record lives behind a short-lived mutex so status polls never wait
//! on I/O. The run itself is a background task that walks the repository,
//! chunks each file, and writes changed chunks to the index in batches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use codechat_index::chunker::{Chunk, Chunker, SkipReason};
use codechat_index::walker::{self, SkippedFile, SourceFile, WalkerConfig};
use codechat_index::{EmbeddingIndex, IndexError, RepoInfo};
use codechat_llm::LlmProvider;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CodeChatError, FailureKind, JobFailure, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Idle,
    Processing,
    Completed,
    Error,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        })
    }
}

/// Snapshot of the current or most recent ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    /// 0 until the first run starts.
    pub run_id: u64,
    pub root: Option<PathBuf>,
    /// Repository name, branch and head commit, read when the run starts.
    pub repo: Option<RepoInfo>,
    /// Files visited over eligible files, in `[0, 1]`.
    pub progress: f32,
    pub files_seen: usize,
    /// Files chunked and written. Never counts a skipped file.
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_produced: usize,
    /// Chunks whose id and content hash were already indexed.
    pub chunks_unchanged: usize,
    pub chunks_removed: usize,
    pub error: Option<JobFailure>,
    pub duration_ms: u64,
}

impl JobStatus {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Error)
    }
}

#[derive(Default)]
struct JobSlot {
    status: JobStatus,
    cancel: Option<CancellationToken>,
    resetting: bool,
    last_run_id: u64,
}

/// Tuning for ingestion runs.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    /// Chunks embedded and written per index call.
    pub batch_size: usize,
    /// Tag chunks with the repository name and git branch.
    pub git_metadata: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 64,
            git_metadata: true,
        }
    }
}

struct Shared<P: LlmProvider> {
    index: EmbeddingIndex<P>,
    chunker: Chunker,
    walker: WalkerConfig,
    batch_size: usize,
    git_metadata: bool,
    slot: Mutex<JobSlot>,
    state_tx: watch::Sender<JobState>,
}

impl<P: LlmProvider> Shared<P> {
    fn lock(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the status of `run_id` if it is still the current run.
    fn update(&self, run_id: u64, f: impl FnOnce(&mut JobStatus)) {
        let mut slot = self.lock();
        if slot.status.run_id == run_id && slot.status.state == JobState::Processing {
            f(&mut slot.status);
        }
    }

    fn finish(&self, run_id: u64, started: Instant, failure: Option<JobFailure>) -> JobStatus {
        let mut slot = self.lock();
        if slot.status.run_id == run_id && slot.status.state == JobState::Processing {
            let status = &mut slot.status;
            status.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match failure {
                None => {
                    status.state = JobState::Completed;
                    status.progress = 1.0;
                }
                Some(failure) => {
                    status.state = JobState::Error;
                    status.error = Some(failure);
                }
            }
            slot.cancel = None;
            let state = slot.status.state;
            self.state_tx.send_replace(state);
        }
        slot.status.clone()
    }
}

/// Handle to one started run.
pub struct JobHandle {
    run_id: u64,
    cancel: CancellationToken,
    task: JoinHandle<JobStatus>,
}

impl JobHandle {
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Request cooperative cancellation. Takes effect at the next file boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish and return its final status.
    pub async fn wait(self) -> JobStatus {
        match self.task.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(run_id = self.run_id, "ingestion supervisor failed: {e}");
                JobStatus {
                    state: JobState::Error,
                    run_id: self.run_id,
                    error: Some(JobFailure {
                        kind: FailureKind::Internal,
                        message: e.to_string(),
                    }),
                    ..JobStatus::default()
                }
            }
        }
    }
}

/// Owns the job record and starts ingestion runs against one index.
pub struct IngestionManager<P: LlmProvider> {
    shared: Arc<Shared<P>>,
}

impl<P: LlmProvider> Clone for IngestionManager<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: LlmProvider + 'static> IngestionManager<P> {
    #[must_use]
    pub fn new(
        index: EmbeddingIndex<P>,
        chunker: Chunker,
        walker: WalkerConfig,
        options: IngestOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(JobState::Idle);
        Self {
            shared: Arc::new(Shared {
                index,
                chunker,
                walker,
                batch_size: options.batch_size.max(1),
                git_metadata: options.git_metadata,
                slot: Mutex::new(JobSlot::default()),
                state_tx,
            }),
        }
    }

    /// Start a background ingestion run over `root`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::PathNotFound`] if `root` is not a readable
    /// directory, or [`CodeChatError::JobAlreadyRunning`] if a run is in
    /// progress. Neither starts a run nor touches the current one.
    pub fn start(&self, root: &Path) -> Result<JobHandle> {
        let root = walker::ensure_root(root)?;

        let (run_id, cancel) = {
            let mut slot = self.shared.lock();
            if slot.status.state == JobState::Processing {
                return Err(CodeChatError::JobAlreadyRunning {
                    run_id: slot.status.run_id,
                });
            }
            if slot.resetting {
                return Err(CodeChatError::InvalidArgument(
                    "index reset in progress".into(),
                ));
            }
            slot.last_run_id += 1;
            let run_id = slot.last_run_id;
            let cancel = CancellationToken::new();
            slot.status = JobStatus {
                state: JobState::Processing,
                run_id,
                root: Some(root.clone()),
                ..JobStatus::default()
            };
            slot.cancel = Some(cancel.clone());
            (run_id, cancel)
        };
        self.shared.state_tx.send_replace(JobState::Processing);
        tracing::info!(run_id, root = %root.display(), "ingestion started");

        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let worker = tokio::spawn(run(Arc::clone(&shared), root, run_id, token));
            let failure = match worker.await {
                Ok(outcome) => outcome.err(),
                Err(e) => {
                    tracing::error!(run_id, "ingestion task died: {e}");
                    Some(JobFailure {
                        kind: FailureKind::Internal,
                        message: e.to_string(),
                    })
                }
            };
            let status = shared.finish(run_id, started, failure);
            match &status.error {
                None => tracing::info!(
                    run_id,
                    files = status.files_processed,
                    skipped = status.files_skipped,
                    chunks = status.chunks_produced,
                    unchanged = status.chunks_unchanged,
                    removed = status.chunks_removed,
                    duration_ms = status.duration_ms,
                    "ingestion completed"
                ),
                Some(f) => tracing::warn!(run_id, kind = ?f.kind, "ingestion failed: {}", f.message),
            }
            status
        });

        Ok(JobHandle {
            run_id,
            cancel,
            task,
        })
    }
}

impl<P: LlmProvider> IngestionManager<P> {
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.shared.lock().status.clone()
    }

    /// Cancel the run in progress, if any. Returns whether one was signalled.
    pub fn cancel(&self) -> bool {
        let slot = self.shared.lock();
        match &slot.cancel {
            Some(token) if slot.status.state == JobState::Processing => {
                token.cancel();
                tracing::info!(run_id = slot.status.run_id, "ingestion cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Resolve once no run is processing.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.state_tx.subscribe();
        // the sender lives in `shared`, so the channel cannot close here
        let _ = rx.wait_for(|s| *s != JobState::Processing).await;
    }

    /// Clear the index and return the job record to `idle`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::JobAlreadyRunning`] while a run is processing,
    /// or [`CodeChatError::IndexUnavailable`] if the index cannot be cleared.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut slot = self.shared.lock();
            if slot.status.state == JobState::Processing {
                return Err(CodeChatError::JobAlreadyRunning {
                    run_id: slot.status.run_id,
                });
            }
            slot.resetting = true;
        }

        let cleared = self.shared.index.clear().await;

        let mut slot = self.shared.lock();
        slot.resetting = false;
        cleared?;
        slot.status = JobStatus::default();
        slot.cancel = None;
        drop(slot);
        self.shared.state_tx.send_replace(JobState::Idle);
        tracing::info!("index and job state reset");
        Ok(())
    }
}

/// Chunks waiting to be embedded and written.
struct Batch {
    chunks: Vec<Chunk>,
    limit: usize,
}

impl Batch {
    fn is_full(&self) -> bool {
        self.chunks.len() >= self.limit
    }

    async fn flush<P: LlmProvider>(&mut self, index: &EmbeddingIndex<P>) -> Result<()> {
        if self.chunks.is_empty() {
            return Ok(());
        }
        index.upsert(&self.chunks).await?;
        self.chunks.clear();
        Ok(())
    }
}

enum FileOutcome {
    Indexed,
    Skipped(SkipReason),
}

/// Files whose records survive the end-of-run sweep even though this run did
/// not index them.
#[derive(Debug, Default)]
struct Retained {
    files: HashSet<String>,
    /// Unreadable directories, as `dir/` prefixes.
    dirs: Vec<String>,
    /// An unreadable entry without a path: nothing can be proven gone.
    everything: bool,
}

impl Retained {
    /// Seed from walk entries that could not be read.
    fn from_walk(root: &Path, skipped: &[SkippedFile]) -> Self {
        let mut retained = Self::default();
        for entry in skipped.iter().filter(|s| s.reason == SkipReason::Unreadable) {
            let rel = walker::relative_path(root, &entry.path);
            if rel.is_empty() {
                retained.everything = true;
                continue;
            }
            retained.dirs.push(format!("{rel}/"));
            retained.files.insert(rel);
        }
        retained
    }

    fn contains(&self, file: &str) -> bool {
        self.everything
            || self.files.contains(file)
            || self.dirs.iter().any(|d| file.starts_with(d.as_str()))
    }
}

async fn run<P: LlmProvider + 'static>(
    shared: Arc<Shared<P>>,
    root: PathBuf,
    run_id: u64,
    cancel: CancellationToken,
) -> std::result::Result<(), JobFailure> {
    let walk_config = shared.walker.clone();
    let walk_root = root.clone();
    let git_metadata = shared.git_metadata;
    let (outcome, repo) = tokio::task::spawn_blocking(move || {
        let repo = git_metadata.then(|| codechat_index::repo_info(&walk_root));
        walker::walk(&walk_root, &walk_config).map(|outcome| (outcome, repo))
    })
    .await
    .map_err(|e| JobFailure {
        kind: FailureKind::Internal,
        message: format!("repository walk panicked: {e}"),
    })?
    .map_err(|e| JobFailure::from(&CodeChatError::from(e)))?;

    for skipped in &outcome.skipped {
        tracing::debug!(path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
    }
    let total = outcome.files.len();
    shared.update(run_id, |s| {
        s.files_seen = total + outcome.skipped.len();
        s.files_skipped = outcome.skipped.len();
        s.repo.clone_from(&repo);
    });
    tracing::info!(
        run_id,
        total,
        skipped = outcome.skipped.len(),
        branch = repo.as_ref().and_then(|r| r.branch.as_deref()),
        "repository walked"
    );

    let mut batch = Batch {
        chunks: Vec::with_capacity(shared.batch_size),
        limit: shared.batch_size,
    };
    let mut retained = Retained::from_walk(&root, &outcome.skipped);
    let mut indexed = 0usize;

    for (i, file) in outcome.files.iter().enumerate() {
        if cancel.is_cancelled() {
            // keep what was already chunked; the next run skips it by hash
            batch
                .flush(&shared.index)
                .await
                .map_err(|e| JobFailure::from(&e))?;
            tracing::info!(run_id, visited = i, total, "ingestion cancelled");
            return Err(JobFailure::cancelled());
        }

        let result = ingest_file(&shared, run_id, file, repo.as_ref(), &mut batch).await;
        match result {
            Ok(FileOutcome::Indexed) => {
                indexed += 1;
                retained.files.insert(file.rel_path.clone());
            }
            Ok(FileOutcome::Skipped(reason)) => {
                tracing::warn!(file = %file.rel_path, %reason, "skipping file");
                // a read failure says nothing about the file's indexed content
                if reason == SkipReason::Unreadable {
                    retained.files.insert(file.rel_path.clone());
                }
                shared.update(run_id, |s| s.files_skipped += 1);
            }
            Err(e) => {
                tracing::error!(file = %file.rel_path, "ingestion aborted: {e}");
                return Err(JobFailure::from(&e));
            }
        }

        let visited = i + 1;
        shared.update(run_id, |s| {
            s.files_processed = indexed;
            s.progress = fraction(visited, total);
        });
        tracing::debug!(file = %file.rel_path, progress = format_args!("{visited}/{total}"));
    }

    batch
        .flush(&shared.index)
        .await
        .map_err(|e| JobFailure::from(&e))?;

    let removed = remove_vanished_files(&shared.index, &retained)
        .await
        .map_err(|e| JobFailure::from(&CodeChatError::from(e)))?;
    shared.update(run_id, |s| s.chunks_removed += removed);
    Ok(())
}

async fn ingest_file<P: LlmProvider>(
    shared: &Shared<P>,
    run_id: u64,
    file: &SourceFile,
    repo: Option<&RepoInfo>,
    batch: &mut Batch,
) -> Result<FileOutcome> {
    let bytes = match tokio::fs::read(&file.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(file = %file.rel_path, "read failed: {e}");
            return Ok(FileOutcome::Skipped(SkipReason::Unreadable));
        }
    };
    let source = match shared.chunker.decode(&bytes) {
        Ok(source) => source,
        Err(reason) => return Ok(FileOutcome::Skipped(reason)),
    };
    let mut chunks: Vec<Chunk> = match shared.chunker.chunk(&file.rel_path, source, file.language) {
        Ok(iter) => iter.collect(),
        Err(reason) => return Ok(FileOutcome::Skipped(reason)),
    };
    if let Some(repo) = repo {
        for chunk in &mut chunks {
            chunk.repo_name = Some(repo.name.clone());
            chunk.git_branch.clone_from(&repo.branch);
        }
    }

    let existing = shared.index.file_hashes(&file.rel_path).await?;
    let current: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let stale: Vec<String> = existing
        .keys()
        .filter(|id| !current.contains(id.as_str()))
        .cloned()
        .collect();
    let removed = stale.len();
    shared.index.delete(stale).await?;

    let produced = chunks.len();
    let mut unchanged = 0usize;
    for chunk in chunks {
        if existing.get(&chunk.id) == Some(&chunk.content_hash) {
            unchanged += 1;
            continue;
        }
        batch.chunks.push(chunk);
        if batch.is_full() {
            batch.flush(&shared.index).await?;
        }
    }

    shared.update(run_id, |s| {
        s.chunks_produced += produced;
        s.chunks_unchanged += unchanged;
        s.chunks_removed += removed;
    });
    tracing::debug!(file = %file.rel_path, produced, unchanged, removed, "file chunked");
    Ok(FileOutcome::Indexed)
}

/// Delete records of files that were indexed before but neither indexed nor
/// retained by this run.
async fn remove_vanished_files<P: LlmProvider>(
    index: &EmbeddingIndex<P>,
    retained: &Retained,
) -> std::result::Result<usize, IndexError> {
    if retained.everything {
        tracing::warn!("walk hit an unreadable entry without a path, keeping all indexed files");
        return Ok(0);
    }
    let mut removed = 0;
    for file in index.indexed_files().await? {
        if retained.contains(&file) {
            continue;
        }
        let ids: Vec<String> = index.file_hashes(&file).await?.into_keys().collect();
        removed += ids.len();
        index.delete(ids).await?;
        tracing::debug!(file, "removed chunks of vanished file");
    }
    Ok(removed)
}

#[allow(clippy::cast_precision_loss)]
fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (done as f32 / total as f32).min(1.0)
}
