use crate::any::AnyProvider;
use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Sends generation to one provider and embeddings to another, e.g. Claude for
/// answers with a local Ollama embedding model.
#[derive(Debug, Clone)]
pub struct SplitProvider {
    chat: AnyProvider,
    embed: AnyProvider,
}

impl SplitProvider {
    #[must_use]
    pub fn new(chat: AnyProvider, embed: AnyProvider) -> Self {
        Self { chat, embed }
    }
}

impl LlmProvider for SplitProvider {
    // Boxed: `AnyProvider` contains `SplitProvider`, so the futures are recursive.
    fn chat(
        &self,
        messages: &[Message],
    ) -> impl std::future::Future<Output = Result<String, LlmError>> + Send {
        let provider = self.chat.clone();
        let messages = messages.to_vec();
        Box::pin(async move { provider.chat(&messages).await })
    }

    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, LlmError>> + Send {
        let provider = self.embed.clone();
        let text = text.to_owned();
        Box::pin(async move { provider.embed(&text).await })
    }

    fn supports_embeddings(&self) -> bool {
        self.embed.supports_embeddings()
    }

    fn name(&self) -> &str {
        self.chat.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claude::ClaudeProvider;
    use crate::ollama::OllamaProvider;

    #[test]
    fn name_and_embedding_support_come_from_each_side() {
        let split = SplitProvider::new(
            AnyProvider::Claude(ClaudeProvider::new("k".into(), "m".into(), 10)),
            AnyProvider::Ollama(OllamaProvider::new(
                "http://localhost:11434",
                "llama3".into(),
                "nomic-embed-text".into(),
            )),
        );
        assert_eq!(split.name(), "claude");
        assert!(split.supports_embeddings());
    }
}
