//! LLM provider abstraction: chat generation and embeddings behind one trait,
//! with Ollama, Claude and OpenAI-compatible backends.

pub mod any;
pub mod claude;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod split;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::{DEFAULT_TEMPERATURE, LlmProvider, Message, Role};
