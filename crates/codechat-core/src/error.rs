use std::path::PathBuf;

use codechat_index::{IndexError, StoreError};
use codechat_llm::LlmError;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodeChatError {
    /// Ingestion root is missing or unreadable. No job was started.
    #[error("path not found or not readable: {}", path.display())]
    PathNotFound { path: PathBuf },

    /// An ingestion run is already in progress. It is left untouched.
    #[error("ingestion run {run_id} is already processing")]
    JobAlreadyRunning { run_id: u64 },

    /// Rejected before any service call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index unavailable during {context}: {source}")]
    IndexUnavailable {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("generation failed for question {question:?}: {source}")]
    GenerationService {
        question: String,
        #[source]
        source: LlmError,
    },

    #[error("embedding failed for {context}: {source}")]
    EmbeddingService {
        context: String,
        #[source]
        source: LlmError,
    },
}

impl From<IndexError> for CodeChatError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::PathNotFound { path } => Self::PathNotFound { path },
            IndexError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            IndexError::Embedding { context, source } => Self::EmbeddingService { context, source },
            IndexError::Store { context, source } => Self::IndexUnavailable { context, source },
        }
    }
}

impl CodeChatError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PathNotFound { .. } => FailureKind::PathNotFound,
            Self::JobAlreadyRunning { .. } => FailureKind::JobAlreadyRunning,
            Self::InvalidArgument(_) => FailureKind::InvalidArgument,
            Self::IndexUnavailable { .. } => FailureKind::IndexUnavailable,
            Self::GenerationService { .. } => FailureKind::GenerationService,
            Self::EmbeddingService { .. } => FailureKind::EmbeddingService,
        }
    }
}

/// Classification of a failed ingestion run, kept in the job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PathNotFound,
    JobAlreadyRunning,
    InvalidArgument,
    IndexUnavailable,
    GenerationService,
    EmbeddingService,
    /// Stopped by a cancellation request.
    Cancelled,
    /// The ingestion task itself died.
    Internal,
}

/// Why the last run ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "cancelled".into(),
        }
    }
}

impl From<&CodeChatError> for JobFailure {
    fn from(e: &CodeChatError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodeChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_errors_map_onto_taxonomy() {
        let e: CodeChatError = IndexError::InvalidArgument("k must be at least 1".into()).into();
        assert_eq!(e.kind(), FailureKind::InvalidArgument);

        let e: CodeChatError = IndexError::Store {
            context: "count".into(),
            source: StoreError::Connection("refused".into()),
        }
        .into();
        assert_eq!(e.kind(), FailureKind::IndexUnavailable);
        assert!(e.to_string().contains("count"));

        let e: CodeChatError = IndexError::Embedding {
            context: "chunk 42 (a.py:1-3)".into(),
            source: LlmError::EmptyResponse { provider: "ollama" },
        }
        .into();
        assert_eq!(e.kind(), FailureKind::EmbeddingService);
        assert!(e.to_string().contains("a.py:1-3"));
    }

    #[test]
    fn failure_serializes_with_snake_case_kind() {
        let json = serde_json::to_value(JobFailure::cancelled()).unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["message"], "cancelled");
    }

    #[test]
    fn failure_from_error_keeps_message() {
        let err = CodeChatError::PathNotFound {
            path: PathBuf::from("/missing"),
        };
        let failure = JobFailure::from(&err);
        assert_eq!(failure.kind, FailureKind::PathNotFound);
        assert!(failure.message.contains("/missing"));
    }
}
