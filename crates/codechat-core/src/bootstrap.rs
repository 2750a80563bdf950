//! Application bootstrap: config resolution, provider and index construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use codechat_index::store::{QdrantStore, SqliteStore, VectorStore};
use codechat_index::EmbeddingIndex;
use codechat_llm::AnyProvider;
use codechat_llm::claude::ClaudeProvider;
use codechat_llm::ollama::OllamaProvider;
use codechat_llm::openai::OpenAiProvider;
use codechat_llm::split::SplitProvider;

use crate::config::{Config, IndexBackend, ProviderKind};
use crate::service::CodeChat;

const DEFAULT_CONFIG_PATH: &str = "config/codechat.toml";

/// Priority: CLI `--config` > `CODECHAT_CONFIG` env > `config/codechat.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODECHAT_CONFIG")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn ollama_provider(config: &Config) -> OllamaProvider {
    OllamaProvider::new(
        &config.llm.base_url,
        config.llm.model.clone(),
        config.llm.embedding_model.clone(),
    )
    .with_temperature(config.llm.temperature)
}

/// Build the configured provider. Providers without embeddings are paired
/// with an embedding provider so indexing and querying share one vector space.
///
/// # Errors
///
/// Returns an error if the selected cloud provider has no API key.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(ollama_provider(config))),
        ProviderKind::Claude => {
            let key = config
                .secrets
                .claude_api_key
                .as_ref()
                .context("CODECHAT_CLAUDE_API_KEY not found")?;
            let claude_cfg = config.llm.claude.clone().unwrap_or_default();
            let chat = AnyProvider::Claude(ClaudeProvider::new(
                key.expose().to_owned(),
                claude_cfg.model,
                config.llm.max_tokens,
            )
            .with_temperature(config.llm.temperature));
            Ok(AnyProvider::Split(Box::new(SplitProvider::new(
                chat,
                embedding_fallback(config),
            ))))
        }
        ProviderKind::OpenAi => {
            let key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("CODECHAT_OPENAI_API_KEY not found")?;
            let openai_cfg = config.llm.openai.clone().unwrap_or_default();
            let has_embeddings = openai_cfg.embedding_model.is_some();
            let openai = AnyProvider::OpenAi(OpenAiProvider::new(
                key.expose().to_owned(),
                openai_cfg.base_url,
                openai_cfg.model,
                config.llm.max_tokens,
                openai_cfg.embedding_model,
            )
            .with_temperature(config.llm.temperature));
            if has_embeddings {
                Ok(openai)
            } else {
                Ok(AnyProvider::Split(Box::new(SplitProvider::new(
                    openai,
                    AnyProvider::Ollama(ollama_provider(config)),
                ))))
            }
        }
    }
}

/// Embeddings for a chat-only provider: the OpenAI-compatible endpoint when it
/// has an embedding model and a key, otherwise local Ollama.
fn embedding_fallback(config: &Config) -> AnyProvider {
    if let Some(openai_cfg) = &config.llm.openai
        && let Some(model) = &openai_cfg.embedding_model
        && let Some(key) = &config.secrets.openai_api_key
    {
        return AnyProvider::OpenAi(OpenAiProvider::new(
            key.expose().to_owned(),
            openai_cfg.base_url.clone(),
            openai_cfg.model.clone(),
            config.llm.max_tokens,
            Some(model.clone()),
        )
        .with_temperature(config.llm.temperature));
    }
    AnyProvider::Ollama(ollama_provider(config))
}

/// Open the configured persistent index.
///
/// # Errors
///
/// Returns an error if the Qdrant client cannot be built or the SQLite
/// database cannot be created or migrated.
pub async fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    match config.index.backend {
        IndexBackend::Qdrant => {
            let store = QdrantStore::new(&config.index.qdrant_url, config.index.collection.clone())
                .with_context(|| format!("failed to connect to Qdrant at {}", config.index.qdrant_url))?;
            tracing::info!(url = %config.index.qdrant_url, collection = store.collection(), "using qdrant index");
            Ok(Arc::new(store))
        }
        IndexBackend::Sqlite => {
            let path = config.sqlite_path();
            if config.index.sqlite_path != ":memory:"
                && let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create index directory {}", parent.display())
                })?;
            }
            let store = SqliteStore::open(&config.index.sqlite_path)
                .await
                .with_context(|| format!("failed to open SQLite index {}", path.display()))?;
            tracing::info!(path = %path.display(), "using sqlite index");
            Ok(Arc::new(store))
        }
    }
}

/// Log whether the local Ollama server answers. Never fails.
pub async fn health_check(provider: &AnyProvider) {
    let AnyProvider::Ollama(ollama) = provider else {
        return;
    };
    match ollama.health_check().await {
        Ok(()) => tracing::info!("ollama health check passed"),
        Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
    }
}

/// Build the full facade from configuration.
///
/// # Errors
///
/// Returns an error if the provider or index cannot be constructed.
pub async fn build_codechat(config: &Config) -> anyhow::Result<CodeChat<AnyProvider>> {
    let provider = create_provider(config)?;
    tracing::info!(provider = %config.llm.provider, "llm provider configured");
    health_check(&provider).await;
    let store = create_store(config).await?;
    let index = EmbeddingIndex::new(store, Arc::new(provider));
    Ok(CodeChat::new(index, config))
}

#[cfg(test)]
mod tests {
    use codechat_llm::LlmProvider;
    use serial_test::serial;

    use super::*;
    use crate::config::{OpenAiConfig, Secret};

    #[test]
    fn create_provider_ollama_by_default() {
        let provider = create_provider(&Config::default()).unwrap();
        assert!(matches!(provider, AnyProvider::Ollama(_)));
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn create_provider_claude_without_api_key_errors() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Claude;
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("CODECHAT_CLAUDE_API_KEY"));
    }

    #[test]
    fn claude_is_paired_with_ollama_embeddings() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Claude;
        config.secrets.claude_api_key = Some(Secret::new("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::Split(_)));
        assert_eq!(provider.name(), "claude");
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn openai_with_embedding_model_is_used_directly() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::OpenAi;
        config.llm.openai = Some(OpenAiConfig {
            embedding_model: Some("text-embedding-3-small".into()),
            ..OpenAiConfig::default()
        });
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::OpenAi(_)));
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn openai_without_embedding_model_falls_back_to_ollama() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::OpenAi;
        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::Split(_)));
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn create_provider_openai_without_api_key_errors() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::OpenAi;
        assert!(create_provider(&config).is_err());
    }

    #[tokio::test]
    async fn sqlite_store_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/data/index.db");
        let mut config = Config::default();
        config.index.sqlite_path = db.to_string_lossy().into_owned();

        let store = create_store(&config).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(db.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn in_memory_sqlite_store_opens() {
        let mut config = Config::default();
        config.index.sqlite_path = ":memory:".into();
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    #[serial]
    fn config_path_prefers_cli_then_env() {
        unsafe { std::env::set_var("CODECHAT_CONFIG", "/etc/codechat.toml") };
        assert_eq!(
            resolve_config_path(Some(Path::new("cli.toml"))),
            PathBuf::from("cli.toml")
        );
        assert_eq!(
            resolve_config_path(None),
            PathBuf::from("/etc/codechat.toml")
        );
        unsafe { std::env::remove_var("CODECHAT_CONFIG") };
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
