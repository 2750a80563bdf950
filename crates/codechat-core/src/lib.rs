//! Ingestion jobs, answer synthesis and configuration for codechat.
//!
//! [`CodeChat`] is the produced interface: ingest a repository in the
//! background, poll its status, and ask questions answered from the index
//! with file and line citations.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod job;
pub mod rag;
pub mod service;
pub mod watch;

pub use config::Config;
pub use error::{CodeChatError, FailureKind, JobFailure, Result};
pub use job::{IngestOptions, IngestionManager, JobHandle, JobState, JobStatus};
pub use rag::{Answer, Citation, NO_CONTEXT_ANSWER, RagConfig, RagEngine};
pub use service::{CodeChat, IndexStats};
pub use watch::RepoWatcher;
