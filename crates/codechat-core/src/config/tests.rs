use std::io::Write;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 20] = [
    "CODECHAT_LLM_PROVIDER",
    "CODECHAT_LLM_BASE_URL",
    "CODECHAT_LLM_MODEL",
    "CODECHAT_LLM_EMBEDDING_MODEL",
    "CODECHAT_LLM_MAX_TOKENS",
    "CODECHAT_LLM_TEMPERATURE",
    "CODECHAT_INDEX_BACKEND",
    "CODECHAT_QDRANT_URL",
    "CODECHAT_SQLITE_PATH",
    "CODECHAT_INDEX_COLLECTION",
    "CODECHAT_CHUNKER_WINDOW_SIZE",
    "CODECHAT_CHUNKER_WINDOW_OVERLAP",
    "CODECHAT_CHUNKER_STRUCTURAL",
    "CODECHAT_WALKER_MAX_FILE_SIZE",
    "CODECHAT_INGEST_BATCH_SIZE",
    "CODECHAT_INGEST_GIT_METADATA",
    "CODECHAT_RETRIEVAL_K",
    "CODECHAT_RETRIEVAL_SCORE_THRESHOLD",
    "CODECHAT_CLAUDE_API_KEY",
    "CODECHAT_OPENAI_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codechat.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{content}").unwrap();
    (dir, path)
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert_eq!(config.llm.max_tokens, 2000);
    assert!((config.llm.temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(config.index.backend, IndexBackend::Sqlite);
    assert_eq!(config.index.qdrant_url, "http://localhost:6334");
    assert_eq!(config.chunker.window_size, 1000);
    assert_eq!(config.chunker.window_overlap, 200);
    assert!(config.chunker.structural);
    assert_eq!(config.walker.max_file_size, 1_000_000);
    assert!(config.walker.follow_gitignore);
    assert!(config.walker.exclude_dirs.iter().any(|d| d == "node_modules"));
    assert_eq!(config.ingest.batch_size, 64);
    assert!(config.ingest.git_metadata);
    assert_eq!(config.retrieval.default_k, 5);
    assert!(config.retrieval.score_threshold.abs() < f32::EPSILON);
    assert_eq!(config.retrieval.history_budget_tokens, 512);
    assert!(config.llm.claude.is_none());
    config.validate().unwrap();
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let config = Config::load(std::path::Path::new("/no/such/codechat.toml")).unwrap();
    assert_eq!(config.retrieval.default_k, 5);
}

#[test]
#[serial]
fn parse_partial_toml_keeps_other_defaults() {
    let (_dir, path) = write_config(
        r#"
[llm]
provider = "openai"
model = "llama3:8b"

[llm.openai]
model = "llama-3.1-8b-instant"

[index]
backend = "qdrant"
collection = "my_repo"

[chunker]
window_size = 600
window_overlap = 100

[retrieval]
score_threshold = 0.3
system_prompt = "Answer tersely."
"#,
    );
    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    assert_eq!(config.llm.model, "llama3:8b");
    let openai = config.llm.openai.as_ref().unwrap();
    assert_eq!(openai.model, "llama-3.1-8b-instant");
    assert_eq!(openai.base_url, "https://api.groq.com/openai/v1");
    assert_eq!(config.index.backend, IndexBackend::Qdrant);
    assert_eq!(config.index.collection, "my_repo");
    assert_eq!(config.chunker.window_size, 600);
    assert_eq!(config.chunker.window_overlap, 100);
    assert!(config.chunker.structural);
    assert_eq!(config.ingest.batch_size, 64);
    assert_eq!(config.retrieval.system_prompt.as_deref(), Some("Answer tersely."));
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    let (_dir, path) = write_config("[llm\nprovider = ");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    unsafe { std::env::set_var("CODECHAT_LLM_MODEL", "phi3:mini") };
    unsafe { std::env::set_var("CODECHAT_INDEX_BACKEND", "qdrant") };
    unsafe { std::env::set_var("CODECHAT_RETRIEVAL_K", "9") };
    unsafe { std::env::set_var("CODECHAT_CHUNKER_STRUCTURAL", "false") };
    unsafe { std::env::set_var("CODECHAT_LLM_TEMPERATURE", "0.7") };
    unsafe { std::env::set_var("CODECHAT_INGEST_GIT_METADATA", "false") };
    let config = Config::load(std::path::Path::new("/no/such/codechat.toml")).unwrap();
    clear_env();

    assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
    assert!(!config.ingest.git_metadata);

    assert_eq!(config.llm.model, "phi3:mini");
    assert_eq!(config.index.backend, IndexBackend::Qdrant);
    assert_eq!(config.retrieval.default_k, 9);
    assert!(!config.chunker.structural);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe { std::env::set_var("CODECHAT_LLM_PROVIDER", "skynet") };
    unsafe { std::env::set_var("CODECHAT_INGEST_BATCH_SIZE", "lots") };
    unsafe { std::env::set_var("CODECHAT_RETRIEVAL_SCORE_THRESHOLD", "high") };
    let config = Config::load(std::path::Path::new("/no/such/codechat.toml")).unwrap();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.ingest.batch_size, 64);
    assert!(config.retrieval.score_threshold.abs() < f32::EPSILON);
}

#[test]
#[serial]
fn secrets_come_from_env_and_are_redacted() {
    clear_env();
    unsafe { std::env::set_var("CODECHAT_CLAUDE_API_KEY", "sk-ant-secret") };
    unsafe { std::env::set_var("CODECHAT_OPENAI_API_KEY", "  ") };
    let config = Config::load(std::path::Path::new("/no/such/codechat.toml")).unwrap();
    clear_env();

    let key = config.secrets.claude_api_key.as_ref().unwrap();
    assert_eq!(key.expose(), "sk-ant-secret");
    assert!(config.secrets.openai_api_key.is_none());
    assert!(!format!("{config:?}").contains("sk-ant-secret"));
}

#[test]
#[serial]
fn secrets_are_never_serialized() {
    clear_env();
    unsafe { std::env::set_var("CODECHAT_CLAUDE_API_KEY", "sk-ant-secret") };
    let config = Config::load(std::path::Path::new("/no/such/codechat.toml")).unwrap();
    clear_env();

    let dumped = toml::to_string(&config).unwrap();
    assert!(!dumped.contains("sk-ant-secret"));
    assert!(dumped.contains("[retrieval]"));
}

#[test]
#[serial]
fn overlap_not_below_window_is_rejected() {
    let (_dir, path) = write_config("[chunker]\nwindow_size = 100\nwindow_overlap = 100\n");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("window_overlap"));
}

#[test]
fn validate_rejects_zero_k_and_batch() {
    let mut config = Config::default();
    config.retrieval.default_k = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.ingest.batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.retrieval.score_threshold = 1.5;
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn out_of_range_temperature_is_rejected() {
    let (_dir, path) = write_config("[llm]\ntemperature = 3.5\n");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("llm.temperature"));

    let mut config = Config::default();
    config.llm.temperature = -0.1;
    assert!(config.validate().is_err());
    config.llm.temperature = 0.0;
    config.validate().unwrap();
}

#[test]
fn chunker_and_walker_configs_follow_sections() {
    let mut config = Config::default();
    config.chunker.window_size = 300;
    config.walker.max_file_size = 4096;
    config.walker.follow_gitignore = false;

    let chunker = config.chunker_config();
    assert_eq!(chunker.window_size, 300);
    assert_eq!(chunker.max_file_size, 4096);

    let walker = config.walker_config();
    assert_eq!(walker.max_file_size, 4096);
    assert!(!walker.follow_gitignore);
}

#[test]
fn shipped_sample_config_matches_defaults() {
    let config: Config = toml::from_str(include_str!("../../../../config/codechat.toml")).unwrap();
    config.validate().unwrap();
    let defaults = Config::default();
    assert_eq!(config.llm.model, defaults.llm.model);
    assert_eq!(config.index.backend, defaults.index.backend);
    assert_eq!(config.chunker.window_size, defaults.chunker.window_size);
    assert_eq!(config.retrieval.default_k, defaults.retrieval.default_k);
    assert!((config.llm.temperature - defaults.llm.temperature).abs() < f32::EPSILON);
    assert_eq!(config.ingest.git_metadata, defaults.ingest.git_metadata);
    assert!(config.llm.openai.unwrap().embedding_model.is_none());
}
