use super::{Config, IndexBackend, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_overrides_pipeline();
        self.apply_env_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("CODECHAT_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid CODECHAT_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("CODECHAT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("CODECHAT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("CODECHAT_LLM_MAX_TOKENS") {
            match v.parse::<u32>() {
                Ok(n) => self.llm.max_tokens = n,
                Err(_) => tracing::warn!("ignoring invalid CODECHAT_LLM_MAX_TOKENS value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_LLM_TEMPERATURE") {
            match v.parse::<f32>() {
                Ok(t) => self.llm.temperature = t,
                Err(_) => tracing::warn!("ignoring invalid CODECHAT_LLM_TEMPERATURE value: {v}"),
            }
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("CODECHAT_INDEX_BACKEND") {
            if let Ok(backend) =
                serde_json::from_value::<IndexBackend>(serde_json::Value::String(v.clone()))
            {
                self.index.backend = backend;
            } else {
                tracing::warn!("ignoring invalid CODECHAT_INDEX_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("CODECHAT_SQLITE_PATH") {
            self.index.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("CODECHAT_INDEX_COLLECTION") {
            self.index.collection = v;
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("CODECHAT_CHUNKER_WINDOW_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.chunker.window_size = n,
                Err(_) => tracing::warn!("ignoring invalid CODECHAT_CHUNKER_WINDOW_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_CHUNKER_WINDOW_OVERLAP") {
            match v.parse::<usize>() {
                Ok(n) => self.chunker.window_overlap = n,
                Err(_) => {
                    tracing::warn!("ignoring invalid CODECHAT_CHUNKER_WINDOW_OVERLAP value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_CHUNKER_STRUCTURAL")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.chunker.structural = enabled;
        }
        if let Ok(v) = std::env::var("CODECHAT_WALKER_MAX_FILE_SIZE") {
            match v.parse::<u64>() {
                Ok(n) => self.walker.max_file_size = n,
                Err(_) => {
                    tracing::warn!("ignoring invalid CODECHAT_WALKER_MAX_FILE_SIZE value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_INGEST_BATCH_SIZE") {
            match v.parse::<usize>() {
                Ok(n) => self.ingest.batch_size = n,
                Err(_) => tracing::warn!("ignoring invalid CODECHAT_INGEST_BATCH_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_INGEST_GIT_METADATA")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.ingest.git_metadata = enabled;
        }
        if let Ok(v) = std::env::var("CODECHAT_RETRIEVAL_K") {
            match v.parse::<usize>() {
                Ok(n) => self.retrieval.default_k = n,
                Err(_) => tracing::warn!("ignoring invalid CODECHAT_RETRIEVAL_K value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("CODECHAT_RETRIEVAL_SCORE_THRESHOLD") {
            match v.parse::<f32>() {
                Ok(t) => self.retrieval.score_threshold = t,
                Err(_) => {
                    tracing::warn!("ignoring invalid CODECHAT_RETRIEVAL_SCORE_THRESHOLD value: {v}");
                }
            }
        }
    }

    fn apply_env_secrets(&mut self) {
        if let Ok(v) = std::env::var("CODECHAT_CLAUDE_API_KEY")
            && !v.trim().is_empty()
        {
            self.secrets.claude_api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("CODECHAT_OPENAI_API_KEY")
            && !v.trim().is_empty()
        {
            self.secrets.openai_api_key = Some(Secret::new(v));
        }
    }
}
