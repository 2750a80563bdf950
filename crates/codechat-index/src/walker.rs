//! Repository walk: eligible files under a root, in a stable order.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::chunker::SkipReason;
use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "js", "jsx", "ts", "tsx", "java", "c", "h", "cpp", "hpp", "go", "rs", "rb", "php", "sh",
    "md", "txt", "json", "yaml", "yml", "toml",
];

pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "env",
    "build",
    "dist",
    "target",
    ".pytest_cache",
    ".vscode",
    ".idea",
];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Allowed extensions, without the leading dot. Matched case-insensitively.
    pub extensions: Vec<String>,
    /// Directory names pruned wherever they appear below the root.
    pub exclude_dirs: Vec<String>,
    pub max_file_size: u64,
    pub follow_gitignore: bool,
    pub include_hidden: bool,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| (*s).to_owned()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| (*s).to_owned()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            follow_gitignore: true,
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Relative to the walk root, `/`-separated.
    pub rel_path: String,
    pub language: Lang,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Resolve the ingestion root, failing if it is missing, not a directory, or
/// not listable.
///
/// # Errors
///
/// Returns [`IndexError::PathNotFound`].
pub fn ensure_root(root: &Path) -> Result<PathBuf> {
    let not_found = || IndexError::PathNotFound {
        path: root.to_path_buf(),
    };
    let canonical = std::fs::canonicalize(root).map_err(|_| not_found())?;
    if !canonical.is_dir() {
        return Err(not_found());
    }
    std::fs::read_dir(&canonical).map_err(|_| not_found())?;
    Ok(canonical)
}

/// Walk `root` and collect eligible files sorted by relative path.
///
/// Individual entries that cannot be read are recorded in
/// [`WalkOutcome::skipped`], never returned as errors.
///
/// # Errors
///
/// Returns [`IndexError::PathNotFound`] if the root itself is unusable.
pub fn walk(root: &Path, config: &WalkerConfig) -> Result<WalkOutcome> {
    let root = ensure_root(root)?;
    let extensions: HashSet<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let excluded: HashSet<String> = config.exclude_dirs.iter().cloned().collect();

    let walker = ignore::WalkBuilder::new(&root)
        .hidden(!config.include_hidden)
        .git_ignore(config.follow_gitignore)
        .git_exclude(config.follow_gitignore)
        .git_global(false)
        .require_git(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && entry.file_name().to_str().is_some_and(|n| excluded.contains(n)))
        })
        .build();

    let mut outcome = WalkOutcome::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                outcome.skipped.push(SkippedFile {
                    path: error_path(&e).unwrap_or_else(|| root.clone()),
                    reason: SkipReason::Unreadable,
                });
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if !has_allowed_extension(path, &extensions) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping file without metadata: {e}");
                outcome.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: SkipReason::Unreadable,
                });
                continue;
            }
        };
        let reason = if size == 0 {
            Some(SkipReason::Empty)
        } else if size > config.max_file_size {
            Some(SkipReason::TooLarge)
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::debug!(path = %path.display(), size, %reason, "skipping file");
            outcome.skipped.push(SkippedFile {
                path: path.to_path_buf(),
                reason,
            });
            continue;
        }

        outcome.files.push(SourceFile {
            rel_path: relative_path(&root, path),
            language: detect_language(path),
            path: path.to_path_buf(),
            size,
        });
    }

    outcome.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    tracing::debug!(
        root = %root.display(),
        files = outcome.files.len(),
        skipped = outcome.skipped.len(),
        "walk finished"
    );
    Ok(outcome)
}

fn has_allowed_extension(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.contains(&ext.to_ascii_lowercase()))
}

/// `/`-separated path of `path` relative to `root`.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}
