use crate::claude::ClaudeProvider;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, Message};
use crate::split::SplitProvider;

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::Claude($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Split($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

/// Provider selected at runtime from configuration.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    Claude(ClaudeProvider),
    OpenAi(OpenAiProvider),
    Split(Box<SplitProvider>),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_ollama_name() {
        let provider = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "test".into(),
            "embed".into(),
        ));
        assert_eq!(provider.name(), "ollama");
        assert!(provider.supports_embeddings());
    }

    #[test]
    fn any_claude_has_no_embeddings() {
        let provider = AnyProvider::Claude(ClaudeProvider::new("key".into(), "model".into(), 1024));
        assert_eq!(provider.name(), "claude");
        assert!(!provider.supports_embeddings());
    }

    #[test]
    fn any_openai_embeddings_follow_model() {
        let provider = AnyProvider::OpenAi(OpenAiProvider::new(
            "k".into(),
            "https://api.groq.com/openai/v1".into(),
            "llama-3.3-70b-versatile".into(),
            2000,
            None,
        ));
        assert_eq!(provider.name(), "openai");
        assert!(!provider.supports_embeddings());
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn any_mock_delegates_chat_and_embed() {
        let mock = MockProvider::with_responses(vec!["answer".into()]);
        let provider = AnyProvider::Mock(mock.clone());
        assert_eq!(
            provider.chat(&[Message::user("q")]).await.unwrap(),
            "answer"
        );
        assert!(!provider.embed("fn main").await.unwrap().is_empty());
        assert_eq!(mock.chat_calls(), 1);
        assert_eq!(mock.embed_calls(), 1);
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn split_routes_embeddings_to_second_provider() {
        let chat = MockProvider::with_responses(vec!["from chat side".into()]);
        let embed = MockProvider::default();
        let provider = AnyProvider::Split(Box::new(SplitProvider::new(
            AnyProvider::Mock(chat.clone()),
            AnyProvider::Mock(embed.clone()),
        )));

        provider.embed("text").await.unwrap();
        let answer = provider.chat(&[Message::user("q")]).await.unwrap();

        assert_eq!(answer, "from chat side");
        assert_eq!(embed.embed_calls(), 1);
        assert_eq!(chat.embed_calls(), 0);
        assert_eq!(embed.chat_calls(), 0);
    }
}
