//! Repository metadata attached to ingested chunks.

use std::path::Path;

use serde::Serialize;

/// Length of the abbreviated commit id.
const SHORT_SHA_LEN: usize = 8;

/// Name, branch and head commit of an ingested repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoInfo {
    /// Directory name of the ingestion root.
    pub name: String,
    /// `None` outside git, on a detached head, or before the first commit.
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Read repository metadata for `root`. Never fails: a directory that is not
/// a git work tree only gets its name.
#[must_use]
pub fn repo_info(root: &Path) -> RepoInfo {
    let name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut info = RepoInfo {
        name,
        ..RepoInfo::default()
    };

    let repo = match git2::Repository::open(root) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!(root = %root.display(), "no git metadata: {}", e.message());
            return info;
        }
    };
    match repo.head() {
        Ok(head) => {
            if head.is_branch() {
                info.branch = head.shorthand().map(str::to_owned);
            }
            info.commit = head.peel_to_commit().ok().map(|c| {
                let mut sha = c.id().to_string();
                sha.truncate(SHORT_SHA_LEN);
                sha
            });
        }
        Err(e) => tracing::debug!(root = %root.display(), "repository has no HEAD: {}", e.message()),
    }
    tracing::debug!(name = %info.name, branch = ?info.branch, commit = ?info.commit, "repository metadata");
    info
}
