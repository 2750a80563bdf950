use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// API key or token whose value never appears in logs or `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Secrets read from the environment, never from the config file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub claude_api_key: Option<Secret>,
    pub openai_api_key: Option<Secret>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunker: ChunkerSection,
    #[serde(default)]
    pub walker: WalkerSection,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Claude,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Claude => "claude",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}

fn default_embedding_model() -> String {
    "qwen3-embedding".into()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    /// Ollama endpoint. Also serves embeddings when the chat provider has none.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature sent with every chat request.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude: Option<ClaudeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            claude: None,
            openai: None,
        }
    }
}

fn default_claude_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClaudeConfig {
    #[serde(default = "default_claude_model")]
    pub model: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            model: default_claude_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.groq.com/openai/v1".into()
}

fn default_openai_model() -> String {
    "llama-3.3-70b-versatile".into()
}

/// Any OpenAI-compatible endpoint. Groq by default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    /// When unset, embeddings go to Ollama instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            embedding_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    #[default]
    Sqlite,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_sqlite_path() -> String {
    "./data/codechat.db".into()
}

fn default_collection() -> String {
    codechat_index::store::DEFAULT_COLLECTION.into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            qdrant_url: default_qdrant_url(),
            sqlite_path: default_sqlite_path(),
            collection: default_collection(),
        }
    }
}

fn default_window_size() -> usize {
    codechat_index::chunker::DEFAULT_WINDOW_SIZE
}

fn default_window_overlap() -> usize {
    codechat_index::chunker::DEFAULT_WINDOW_OVERLAP
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkerSection {
    /// Characters per sliding window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_window_overlap")]
    pub window_overlap: usize,
    /// Split on functions and classes when a grammar is available.
    #[serde(default = "default_true")]
    pub structural: bool,
}

impl Default for ChunkerSection {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            window_overlap: default_window_overlap(),
            structural: true,
        }
    }
}

fn default_extensions() -> Vec<String> {
    codechat_index::walker::DEFAULT_EXTENSIONS
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    codechat_index::walker::DEFAULT_EXCLUDE_DIRS
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_max_file_size() -> u64 {
    codechat_index::walker::DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WalkerSection {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    /// Bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_true")]
    pub follow_gitignore: bool,
}

impl Default for WalkerSection {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            max_file_size: default_max_file_size(),
            follow_gitignore: true,
        }
    }
}

fn default_batch_size() -> usize {
    64
}

fn default_watch_debounce_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Chunks embedded and written per index call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
    /// Tag chunks with the repository name and current git branch.
    #[serde(default = "default_true")]
    pub git_metadata: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            watch_debounce_ms: default_watch_debounce_ms(),
            git_metadata: true,
        }
    }
}

fn default_k() -> usize {
    5
}

fn default_history_budget_tokens() -> usize {
    512
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    /// Retrieved chunks scoring below this are left out of the prompt.
    #[serde(default)]
    pub score_threshold: f32,
    #[serde(default = "default_history_budget_tokens")]
    pub history_budget_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            score_threshold: 0.0,
            history_budget_tokens: default_history_budget_tokens(),
            system_prompt: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn chunker_config(&self) -> codechat_index::ChunkerConfig {
        codechat_index::ChunkerConfig {
            window_size: self.chunker.window_size,
            window_overlap: self.chunker.window_overlap,
            max_file_size: usize::try_from(self.walker.max_file_size).unwrap_or(usize::MAX),
            structural: self.chunker.structural,
            ..codechat_index::ChunkerConfig::default()
        }
    }

    #[must_use]
    pub fn walker_config(&self) -> codechat_index::WalkerConfig {
        codechat_index::WalkerConfig {
            extensions: self.walker.extensions.clone(),
            exclude_dirs: self.walker.exclude_dirs.clone(),
            max_file_size: self.walker.max_file_size,
            follow_gitignore: self.walker.follow_gitignore,
            include_hidden: false,
        }
    }

    /// `sqlite_path` as a filesystem path, for creating its parent directory.
    #[must_use]
    pub fn sqlite_path(&self) -> PathBuf {
        PathBuf::from(&self.index.sqlite_path)
    }
}
