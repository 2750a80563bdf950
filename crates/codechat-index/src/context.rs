//! Contextualized embedding text generation.
//!
//! Embedding raw code alone gives poor retrieval for conceptual questions.
//! Prepending the file path, language and entity name lets a query such as
//! "where is auth handled?" match `auth.py` even when the body never says so.

use crate::chunker::Chunk;

/// Generate text optimized for embedding (not for display).
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.content.len() + 128);

    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push('\n');

    text.push_str("# Language: ");
    text.push_str(chunk.language.id());
    text.push('\n');

    if let Some(name) = &chunk.entity_name {
        text.push_str("# Entity: ");
        text.push_str(name);
        text.push('\n');
    }

    text.push_str(&chunk.content);
    text
}

/// Short header for display in search results and prompts.
#[must_use]
pub fn chunk_display_header(chunk: &Chunk) -> String {
    let name = chunk.entity_name.as_deref().unwrap_or(&chunk.kind);
    format!(
        "{} :: {name} (lines {}-{})",
        chunk.file_path, chunk.start_line, chunk.end_line
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Lang;

    fn sample_chunk() -> Chunk {
        Chunk {
            id: "id".into(),
            file_path: "src/lib.rs".into(),
            language: Lang::Rust,
            kind: "function_item".into(),
            entity_name: Some("hello".into()),
            start_line: 1,
            end_line: 3,
            start_byte: 0,
            content: "fn hello() { 42 }".into(),
            content_hash: "abc123".into(),
            repo_name: None,
            git_branch: None,
        }
    }

    #[test]
    fn contextualize_prefixes_path_language_and_entity() {
        let text = contextualize_for_embedding(&sample_chunk());
        assert_eq!(
            text,
            "# src/lib.rs\n# Language: rust\n# Entity: hello\nfn hello() { 42 }"
        );
    }

    #[test]
    fn contextualize_without_entity_skips_line() {
        let mut chunk = sample_chunk();
        chunk.entity_name = None;
        assert!(!contextualize_for_embedding(&chunk).contains("Entity"));
    }

    #[test]
    fn display_header_falls_back_to_kind() {
        let mut chunk = sample_chunk();
        assert_eq!(chunk_display_header(&chunk), "src/lib.rs :: hello (lines 1-3)");
        chunk.entity_name = None;
        assert_eq!(
            chunk_display_header(&chunk),
            "src/lib.rs :: function_item (lines 1-3)"
        );
    }
}
