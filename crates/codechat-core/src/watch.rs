//! Re-ingest a repository after debounced file-system changes.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use codechat_index::walker::WalkerConfig;
use codechat_llm::LlmProvider;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::CodeChatError;
use crate::job::{IngestionManager, JobStatus};

/// Decides which changed paths should trigger re-ingestion.
#[derive(Debug, Clone)]
struct ChangeFilter {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude_dirs: HashSet<String>,
}

impl ChangeFilter {
    fn new(root: &Path, config: &WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude_dirs: config.exclude_dirs.iter().cloned().collect(),
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let mut components = rel.components().peekable();
        while let Some(component) = components.next() {
            let Component::Normal(name) = component else {
                continue;
            };
            let is_last = components.peek().is_none();
            if !is_last
                && name
                    .to_str()
                    .is_some_and(|n| self.exclude_dirs.contains(n) || n.starts_with('.'))
            {
                return false;
            }
        }
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Background watcher over one ingestion root.
///
/// Each burst of relevant changes starts one incremental run. Changes that
/// arrive while a run is processing are coalesced into a single follow-up run.
pub struct RepoWatcher {
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl RepoWatcher {
    /// Start watching `root`. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the file-system watcher cannot be initialized or
    /// `root` cannot be watched.
    pub fn start<P: LlmProvider + 'static>(
        root: &Path,
        manager: IngestionManager<P>,
        walker: &WalkerConfig,
        debounce: Duration,
    ) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(root).map_err(|_| CodeChatError::PathNotFound {
            path: root.to_path_buf(),
        })?;
        let filter = ChangeFilter::new(&root, walker);
        // capacity 1: a pending signal already means "run again"
        let (change_tx, change_rx) = mpsc::channel::<()>(1);

        let mut debouncer = new_debouncer(
            debounce,
            move |events: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("repository watcher error: {e}");
                        return;
                    }
                };
                let relevant = events
                    .iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any)
                    .any(|e| filter.is_relevant(&e.path));
                if relevant {
                    let _ = change_tx.try_send(());
                }
            },
        )?;
        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching repository for changes");

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            watch_loop(root, manager, change_rx, token).await;
        });

        Ok(Self { shutdown, handle })
    }

    /// Stop watching. A run already started is left to finish.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let _ = self.handle.await;
    }
}

async fn watch_loop<P: LlmProvider + 'static>(
    root: PathBuf,
    manager: IngestionManager<P>,
    mut changes: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            change = changes.recv() => {
                if change.is_none() {
                    break;
                }
            }
        }

        loop {
            match manager.start(&root) {
                Ok(handle) => {
                    tracing::info!(run_id = handle.run_id(), "re-ingesting after file changes");
                    log_outcome(&handle.wait().await);
                }
                Err(CodeChatError::JobAlreadyRunning { run_id }) => {
                    tracing::debug!(run_id, "change during ingestion, queued follow-up run");
                    manager.wait_idle().await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("cannot re-ingest after file changes: {e}");
                }
            }
            // changes seen while the run was processing collapse into one more run
            if changes.try_recv().is_err() {
                break;
            }
        }
    }
    tracing::debug!("repository watcher stopped");
}

fn log_outcome(status: &JobStatus) {
    match &status.error {
        None => tracing::info!(
            run_id = status.run_id,
            chunks = status.chunks_produced,
            unchanged = status.chunks_unchanged,
            removed = status.chunks_removed,
            "incremental ingestion finished"
        ),
        Some(f) => tracing::warn!(run_id = status.run_id, "incremental ingestion failed: {}", f.message),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use codechat_index::chunker::{Chunker, ChunkerConfig};
    use codechat_index::store::SqliteStore;
    use codechat_index::EmbeddingIndex;
    use codechat_llm::mock::MockProvider;

    use super::*;
    use crate::job::IngestOptions;

    fn filter() -> ChangeFilter {
        ChangeFilter::new(Path::new("/repo"), &WalkerConfig::default())
    }

    #[test]
    fn filter_accepts_allowed_extensions() {
        let f = filter();
        assert!(f.is_relevant(Path::new("/repo/src/auth.py")));
        assert!(f.is_relevant(Path::new("/repo/README.MD")));
        assert!(!f.is_relevant(Path::new("/repo/logo.png")));
        assert!(!f.is_relevant(Path::new("/repo/src")));
    }

    #[test]
    fn filter_rejects_excluded_and_hidden_dirs() {
        let f = filter();
        assert!(!f.is_relevant(Path::new("/repo/node_modules/x/index.js")));
        assert!(!f.is_relevant(Path::new("/repo/target/debug/build.rs")));
        assert!(!f.is_relevant(Path::new("/repo/.git/hooks/pre-commit.sh")));
    }

    async fn manager() -> IngestionManager<MockProvider> {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let index = EmbeddingIndex::new(Arc::new(store), Arc::new(MockProvider::default()));
        IngestionManager::new(
            index,
            Chunker::new(ChunkerConfig::default()),
            WalkerConfig::default(),
            IngestOptions {
                batch_size: 16,
                ..IngestOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn start_with_valid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = RepoWatcher::start(
            dir.path(),
            manager().await,
            &WalkerConfig::default(),
            Duration::from_millis(50),
        )
        .unwrap();
        watcher.stop().await;
    }

    #[tokio::test]
    async fn start_with_nonexistent_directory_fails() {
        let result = RepoWatcher::start(
            Path::new("/nonexistent/path/xyz"),
            manager().await,
            &WalkerConfig::default(),
            Duration::from_millis(50),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn queued_change_runs_once_after_current_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def a():\n    return 1\n").unwrap();
        let manager = manager().await;
        let (tx, rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let root = std::fs::canonicalize(dir.path()).unwrap();

        tx.send(()).await.unwrap();
        let task = tokio::spawn(watch_loop(root, manager.clone(), rx, shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.status().run_id == 0 || !manager.status().is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(manager.status().run_id, 1);
        assert!(manager.status().chunks_produced >= 1);
        assert!(manager.status().error.is_none());
    }
}
