//! Answer synthesis: retrieve, build a grounded prompt, generate once, cite.

use std::collections::HashSet;
use std::fmt::Write;

use codechat_index::{EmbeddingIndex, SearchHit};
use codechat_llm::{LlmProvider, Message, Role};
use serde::Serialize;

use crate::error::{CodeChatError, Result};

/// Returned verbatim when retrieval finds nothing usable.
pub const NO_CONTEXT_ANSWER: &str =
    "No relevant context found in the indexed repository for this question.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are an expert code assistant helping developers understand their codebase.
Answer only from the code context provided in the user message. Each context block
is labeled like [S1]; reference sources by those labels when you use them.
If the context does not contain enough information, say so instead of guessing.
Be concise but thorough, and quote code from the context when it helps.";

/// Rough token count used for history budgeting.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// A pointer into the index backing part of an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Label used for this source in the prompt, e.g. `S1`.
    pub label: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    /// In similarity order.
    pub citations: Vec<Citation>,
    /// False when [`NO_CONTEXT_ANSWER`] was returned without generation.
    pub context_found: bool,
}

#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Retrieved chunks scoring below this are dropped before prompting.
    pub score_threshold: f32,
    pub history_budget_tokens: usize,
    pub system_prompt: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            history_budget_tokens: 512,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

pub struct RagEngine<P: LlmProvider> {
    index: EmbeddingIndex<P>,
    config: RagConfig,
}

impl<P: LlmProvider> RagEngine<P> {
    #[must_use]
    pub fn new(index: EmbeddingIndex<P>, config: RagConfig) -> Self {
        Self { index, config }
    }

    /// Answer `question` from the `k` most similar chunks.
    ///
    /// `history` is the prior conversation, oldest first. The most recent
    /// turns that fit the history budget are used both to steer retrieval
    /// and as conversation context for generation.
    ///
    /// # Errors
    ///
    /// Returns [`CodeChatError::InvalidArgument`] for an empty question or
    /// `k == 0`, before any service call. Index, embedding and generation
    /// failures are returned as their respective variants.
    pub async fn answer(&self, question: &str, k: usize, history: &[Message]) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(CodeChatError::InvalidArgument(
                "question must not be empty".into(),
            ));
        }
        if k == 0 {
            return Err(CodeChatError::InvalidArgument("k must be at least 1".into()));
        }

        let recent = select_history(history, self.config.history_budget_tokens);
        let retrieval_text = retrieval_text(question, recent);
        let hits = self.index.query(&retrieval_text, k).await?;

        let mut seen = HashSet::new();
        let hits: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| seen.insert(h.chunk.id.clone()))
            .filter(|h| h.score >= self.config.score_threshold)
            .collect();
        tracing::debug!(k, used = hits.len(), history = recent.len(), "retrieved context");

        if hits.is_empty() {
            return Ok(Answer {
                answer: NO_CONTEXT_ANSWER.into(),
                citations: Vec::new(),
                context_found: false,
            });
        }

        let mut messages = Vec::with_capacity(recent.len() + 2);
        messages.push(Message::system(self.config.system_prompt.clone()));
        messages.extend(recent.iter().filter(|m| m.role != Role::System).cloned());
        messages.push(Message::user(build_prompt(question, &hits)));

        let answer = self.index.provider().chat(&messages).await.map_err(|source| {
            tracing::error!("generation failed: {source}");
            CodeChatError::GenerationService {
                question: question.to_owned(),
                source,
            }
        })?;

        Ok(Answer {
            answer,
            citations: citations(&hits),
            context_found: true,
        })
    }
}

/// Longest suffix of `history` whose estimated size fits `budget_tokens`.
fn select_history(history: &[Message], budget_tokens: usize) -> &[Message] {
    let mut used = 0usize;
    let mut keep_from = history.len();
    for (i, message) in history.iter().enumerate().rev() {
        let cost = estimate_tokens(&message.content);
        if used + cost > budget_tokens {
            break;
        }
        used += cost;
        keep_from = i;
    }
    &history[keep_from..]
}

fn retrieval_text(question: &str, recent: &[Message]) -> String {
    let mut text = String::new();
    for message in recent.iter().filter(|m| m.role == Role::User) {
        text.push_str(&message.content);
        text.push('\n');
    }
    text.push_str(question);
    text
}

fn label(rank: usize) -> String {
    format!("S{}", rank + 1)
}

fn build_prompt(question: &str, hits: &[SearchHit]) -> String {
    let mut out = String::from("CONTEXT FROM REPOSITORY:\n\n");
    for (i, hit) in hits.iter().enumerate() {
        let chunk = &hit.chunk;
        let _ = writeln!(
            out,
            "[{}] {} (lines {}-{})",
            label(i),
            chunk.file_path,
            chunk.start_line,
            chunk.end_line
        );
        let _ = writeln!(out, "```{}", chunk.language.id());
        out.push_str(&chunk.content);
        out.push_str("\n```\n\n");
    }
    let _ = write!(
        out,
        "QUESTION:\n{question}\n\nAnswer using only the context above and cite sources by label."
    );
    out
}

/// Citations for the prompted chunks, one per distinct file and line range.
fn citations(hits: &[SearchHit]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    hits.iter()
        .enumerate()
        .filter(|(_, h)| {
            seen.insert((
                h.chunk.file_path.clone(),
                h.chunk.start_line,
                h.chunk.end_line,
            ))
        })
        .map(|(i, h)| Citation {
            label: label(i),
            file_path: h.chunk.file_path.clone(),
            start_line: h.chunk.start_line,
            end_line: h.chunk.end_line,
            chunk_id: h.chunk.id.clone(),
            score: h.score,
        })
        .collect()
}
