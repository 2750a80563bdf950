//! Splits one source file into citable chunks.
//!
//! Files in languages with a grammar are first cut into segments along
//! top-level syntactic units (functions, classes, impls, tables...), with the
//! text between units kept as plain blocks so every line stays covered. Each
//! segment is then emitted as-is or, if larger than the window, as
//! line-aligned sliding windows with overlap. Languages without a grammar go
//! straight to the sliding window.
//!
//! Chunks are produced lazily by [`ChunkIter`] and always carry their exact
//! 1-based inclusive line span.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

use crate::languages::Lang;

pub const DEFAULT_WINDOW_SIZE: usize = 1000;
pub const DEFAULT_WINDOW_OVERLAP: usize = 200;
pub const DEFAULT_MAX_FILE_SIZE: usize = 1_000_000;
pub const DEFAULT_MIN_UNIT_SIZE: usize = 100;

/// Bytes inspected for NUL when deciding whether a file is binary.
const BINARY_SNIFF_LEN: usize = 8000;

/// One retrievable unit of source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// UUID v5 of `"{file_path}:{start_byte}"`.
    pub id: String,
    pub file_path: String,
    pub language: Lang,
    /// AST node kind (`function_item`, `class_definitionx2`), `block` for text
    /// between units, `window` for unstructured files.
    pub kind: String,
    pub entity_name: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub content: String,
    pub content_hash: String,
    /// Repository the file was ingested from, when known.
    #[serde(default)]
    pub repo_name: Option<String>,
    /// Checked-out branch at ingestion time.
    #[serde(default)]
    pub git_branch: Option<String>,
}

/// Why a file produced no chunks. Skips are counted, never raised as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    Binary,
    TooLarge,
    Encoding,
    Unreadable,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty file",
            Self::Binary => "binary file",
            Self::TooLarge => "file exceeds size limit",
            Self::Encoding => "not valid UTF-8",
            Self::Unreadable => "unreadable file",
        })
    }
}

/// Chunker configuration. Sizes are in characters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub window_size: usize,
    pub window_overlap: usize,
    pub max_file_size: usize,
    /// Adjacent syntactic units smaller than this (non-whitespace chars) are
    /// merged while the result still fits in one window.
    pub min_unit_size: usize,
    /// Use syntactic boundaries when a grammar is available.
    pub structural: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            window_overlap: DEFAULT_WINDOW_OVERLAP,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            min_unit_size: DEFAULT_MIN_UNIT_SIZE,
            structural: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Overlap is clamped below the window size so windows always advance.
    #[must_use]
    pub fn new(mut config: ChunkerConfig) -> Self {
        config.window_size = config.window_size.max(1);
        config.window_overlap = config.window_overlap.min(config.window_size - 1);
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Validate raw file bytes and view them as text.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] when the bytes are too large, binary, or not UTF-8.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<&'a str, SkipReason> {
        if bytes.len() > self.config.max_file_size {
            return Err(SkipReason::TooLarge);
        }
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if sniff.contains(&0) {
            return Err(SkipReason::Binary);
        }
        std::str::from_utf8(bytes).map_err(|_| SkipReason::Encoding)
    }

    /// Plan the chunks of one file. Parsing happens here; chunk text is cut
    /// on demand as the returned iterator advances.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] for empty, binary or oversized input.
    pub fn chunk<'a>(
        &self,
        file_path: &'a str,
        source: &'a str,
        lang: Lang,
    ) -> Result<ChunkIter<'a>, SkipReason> {
        if source.len() > self.config.max_file_size {
            return Err(SkipReason::TooLarge);
        }
        if source.contains('\0') {
            return Err(SkipReason::Binary);
        }
        if source.trim().is_empty() {
            return Err(SkipReason::Empty);
        }

        let lines = index_lines(source);
        let whole = Segment::plain(0, lines.len() - 1, "window");

        let segments = if self.config.structural && lang.is_structural() {
            structural_segments(source, lang, &lines, &self.config).unwrap_or_else(|| {
                tracing::debug!(file = file_path, %lang, "no syntactic units, using sliding window");
                vec![whole]
            })
        } else {
            vec![whole]
        };

        Ok(ChunkIter {
            file_path,
            source,
            lang,
            lines,
            segments: segments.into_iter(),
            current: None,
            window_size: self.config.window_size,
            window_overlap: self.config.window_overlap,
        })
    }
}

/// Deterministic chunk identifier: the same file and offset always map to the
/// same id, so re-ingesting overwrites instead of duplicating.
#[must_use]
pub fn chunk_id(file_path: &str, start_byte: usize) -> String {
    uuid::Uuid::new_v5(
        &uuid::Uuid::NAMESPACE_URL,
        format!("{file_path}:{start_byte}").as_bytes(),
    )
    .to_string()
}

/// Unit kind of a chunk label, without the `xN` merge count.
#[must_use]
pub fn base_kind(label: &str) -> &str {
    match label.rsplit_once('x') {
        Some((kind, count))
            if !kind.is_empty() && !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) =>
        {
            kind
        }
        _ => label,
    }
}

#[must_use]
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// Exclusive, without the line terminator.
    end: usize,
    /// Including the line terminator.
    chars: usize,
    blank: bool,
}

fn index_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in source.split_inclusive('\n') {
        let body = raw.strip_suffix('\n').unwrap_or(raw);
        let body = body.strip_suffix('\r').unwrap_or(body);
        lines.push(Line {
            start,
            end: start + body.len(),
            chars: raw.chars().count(),
            blank: body.trim().is_empty(),
        });
        start += raw.len();
    }
    lines
}

/// Inclusive 0-based row range with the label its chunks inherit.
#[derive(Debug, Clone)]
struct Segment {
    first: usize,
    last: usize,
    kind: String,
    entity_name: Option<String>,
    units: usize,
}

impl Segment {
    fn plain(first: usize, last: usize, kind: &str) -> Self {
        Self {
            first,
            last,
            kind: kind.to_owned(),
            entity_name: None,
            units: 0,
        }
    }

    fn label(&self) -> String {
        if self.units > 1 {
            format!("{}x{}", self.kind, self.units)
        } else {
            self.kind.clone()
        }
    }
}

fn structural_segments(
    source: &str,
    lang: Lang,
    lines: &[Line],
    config: &ChunkerConfig,
) -> Option<Vec<Segment>> {
    let grammar = lang.grammar()?;
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        tracing::warn!(%lang, "set_language failed: {e}");
        return None;
    }
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    let kinds = lang.entity_node_kinds();
    let leading_kinds = lang.leading_node_kinds();
    let last_row = lines.len() - 1;

    let mut units: Vec<Segment> = Vec::new();
    // Comments and attributes directly above the next unit, without a blank line.
    let mut leading: Option<(usize, usize)> = None;
    let mut prev_last: Option<usize> = None;
    let child_count = u32::try_from(root.named_child_count()).unwrap_or(u32::MAX);
    for i in 0..child_count {
        let Some(child) = root.named_child(i) else {
            continue;
        };
        let (first, last) = node_rows(&child, last_row);
        let trailing = prev_last.is_some_and(|p| first <= p);
        prev_last = Some(last);

        if leading_kinds.contains(&child.kind()) {
            // a comment on the line of the previous sibling belongs to it
            if trailing {
                continue;
            }
            leading = match leading {
                Some((lead_first, lead_last)) if first <= lead_last + 1 => {
                    Some((lead_first, last.max(lead_last)))
                }
                _ => Some((first, last)),
            };
            continue;
        }
        let lead = leading.take();
        if !kinds.contains(&child.kind()) {
            continue;
        }
        let first = match lead {
            Some((lead_first, lead_last)) if lead_last + 1 >= first => lead_first.min(first),
            _ => first,
        };

        // Two units sharing a line become one segment.
        if let Some(prev) = units.last_mut()
            && first <= prev.last
        {
            prev.last = prev.last.max(last);
            prev.units += 1;
            continue;
        }
        units.push(Segment {
            first,
            last,
            kind: child.kind().to_owned(),
            entity_name: entity_name(&child, source),
            units: 1,
        });
    }

    if units.is_empty() {
        return None;
    }
    let units = merge_small_units(units, source, lines, config);

    let mut segments = Vec::with_capacity(units.len() * 2 + 1);
    let mut cursor = 0;
    for unit in units {
        if unit.first > cursor {
            segments.push(Segment::plain(cursor, unit.first - 1, "block"));
        }
        cursor = unit.last + 1;
        segments.push(unit);
    }
    if cursor <= last_row {
        segments.push(Segment::plain(cursor, last_row, "block"));
    }
    Some(segments)
}

/// Inclusive 0-based rows of `node`. A node ending at column 0 ends on the
/// previous row.
fn node_rows(node: &Node, last_row: usize) -> (usize, usize) {
    let first = node.start_position().row.min(last_row);
    let end = node.end_position();
    let mut last = end.row;
    if end.column == 0 && last > first {
        last -= 1;
    }
    (first, last.min(last_row))
}

fn entity_name(node: &Node, source: &str) -> Option<String> {
    // impl_item uses "type"; decorated/exported wrappers keep the name on the inner node
    node.child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))
        .or_else(|| {
            node.child_by_field_name("definition")
                .or_else(|| node.child_by_field_name("declaration"))
                .and_then(|inner| inner.child_by_field_name("name"))
        })
        .map(|n| source[n.byte_range()].to_string())
}

fn non_ws_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

fn rows_text<'s>(source: &'s str, lines: &[Line], first: usize, last: usize) -> &'s str {
    &source[lines[first].start..lines[last].end]
}

/// Greedily fold a small unit into the next one when only blank lines
/// separate them and the result still fits in a window.
fn merge_small_units(
    units: Vec<Segment>,
    source: &str,
    lines: &[Line],
    config: &ChunkerConfig,
) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::with_capacity(units.len());
    for unit in units {
        if let Some(prev) = merged.last_mut() {
            let prev_size = non_ws_len(rows_text(source, lines, prev.first, prev.last));
            let unit_size = non_ws_len(rows_text(source, lines, unit.first, unit.last));
            let only_blank_between = lines[prev.last + 1..unit.first].iter().all(|l| l.blank);
            let combined_chars: usize = lines[prev.first..=unit.last].iter().map(|l| l.chars).sum();

            if prev_size < config.min_unit_size
                && only_blank_between
                && combined_chars <= config.window_size
                && prev_size + unit_size <= config.window_size
            {
                prev.last = unit.last;
                prev.units += unit.units;
                if prev.entity_name.is_none() {
                    prev.entity_name = unit.entity_name;
                }
                continue;
            }
        }
        merged.push(unit);
    }
    merged
}

/// Lazy, finite, non-restartable sequence of chunks for one file.
pub struct ChunkIter<'a> {
    file_path: &'a str,
    source: &'a str,
    lang: Lang,
    lines: Vec<Line>,
    segments: std::vec::IntoIter<Segment>,
    current: Option<Window>,
    window_size: usize,
    window_overlap: usize,
}

struct Window {
    segment: Segment,
    next: usize,
    last: usize,
}

impl ChunkIter<'_> {
    /// Number of lines in the source file.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn trim_blank(&self, mut first: usize, mut last: usize) -> Option<(usize, usize)> {
        while first <= last && self.lines[first].blank {
            first += 1;
        }
        while last > first && self.lines[last].blank {
            last -= 1;
        }
        (first <= last && !self.lines[first].blank).then_some((first, last))
    }

    fn window_end(&self, start: usize, last: usize) -> usize {
        let mut end = start;
        let mut size = self.lines[start].chars;
        while end < last && size + self.lines[end + 1].chars <= self.window_size {
            end += 1;
            size += self.lines[end].chars;
        }
        end
    }

    /// First row of the window after `start..=end`, stepping back over at most
    /// `window_overlap` characters but always past `start`.
    fn next_start(&self, start: usize, end: usize) -> usize {
        let mut next = end + 1;
        let mut size = 0;
        while next - 1 > start && size + self.lines[next - 1].chars <= self.window_overlap {
            next -= 1;
            size += self.lines[next].chars;
        }
        next
    }

    fn make_chunk(&self, segment: &Segment, first: usize, last: usize) -> Chunk {
        let start_byte = self.lines[first].start;
        let content = rows_text(self.source, &self.lines, first, last);
        Chunk {
            id: chunk_id(self.file_path, start_byte),
            file_path: self.file_path.to_owned(),
            language: self.lang,
            kind: segment.label(),
            entity_name: segment.entity_name.clone(),
            start_line: first + 1,
            end_line: last + 1,
            start_byte,
            content: content.to_owned(),
            content_hash: content_hash(content),
            repo_name: None,
            git_branch: None,
        }
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            let window = match self.current.take() {
                Some(window) => window,
                None => {
                    let segment = self.segments.next()?;
                    let Some((first, last)) = self.trim_blank(segment.first, segment.last) else {
                        continue;
                    };
                    Window {
                        segment,
                        next: first,
                        last,
                    }
                }
            };

            let start = window.next;
            let end = self.window_end(start, window.last);
            let all_blank = self.lines[start..=end].iter().all(|l| l.blank);
            let chunk = (!all_blank).then(|| self.make_chunk(&window.segment, start, end));

            if end < window.last {
                self.current = Some(Window {
                    next: self.next_start(start, end),
                    ..window
                });
            }
            if chunk.is_some() {
                return chunk;
            }
        }
    }
}

impl FusedIterator for ChunkIter<'_> {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(ChunkerConfig::default())
    }

    fn small_windows(window_size: usize, window_overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            window_size,
            window_overlap,
            ..ChunkerConfig::default()
        })
    }

    pub(crate) const AUTH_PY: &str = include_str!("../tests/fixtures/auth.py");

    #[test]
    fn empty_and_whitespace_files_are_skipped() {
        assert_eq!(chunker().chunk("a.py", "", Lang::Python).err(), Some(SkipReason::Empty));
        assert_eq!(
            chunker().chunk("a.py", "  \n\t\n", Lang::Python).err(),
            Some(SkipReason::Empty)
        );
    }

    #[test]
    fn decode_rejects_binary_large_and_invalid_utf8() {
        let c = small_windows(100, 10);
        assert_eq!(c.decode(b"ab\0cd").err(), Some(SkipReason::Binary));
        assert_eq!(c.decode(&[0xff, 0xfe, b'a']).err(), Some(SkipReason::Encoding));
        let big = vec![b'a'; DEFAULT_MAX_FILE_SIZE + 1];
        assert_eq!(c.decode(&big).err(), Some(SkipReason::TooLarge));
        assert_eq!(c.decode(b"fn main() {}").unwrap(), "fn main() {}");
    }

    #[test]
    fn oversized_source_is_skipped() {
        let c = Chunker::new(ChunkerConfig {
            max_file_size: 10,
            ..ChunkerConfig::default()
        });
        assert_eq!(
            c.chunk("a.txt", "0123456789abc", Lang::Text).err(),
            Some(SkipReason::TooLarge)
        );
    }

    #[test]
    fn small_text_file_is_one_window() {
        let chunks: Vec<_> = chunker()
            .chunk("notes.txt", "first\nsecond\nthird\n", Lang::Text)
            .unwrap()
            .collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, "window");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 3));
        assert_eq!(chunks[0].content, "first\nsecond\nthird");
    }

    #[test]
    fn windows_overlap_and_advance() {
        let source: String = (1..=40).map(|i| format!("line number {i:02}\n")).collect();
        // every line is 15 chars; 5 lines per window, 1 line of overlap
        let chunks: Vec<_> = small_windows(75, 20)
            .chunk("log.txt", &source, Lang::Text)
            .unwrap()
            .collect();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks.last().unwrap().end_line, 40);
        for pair in chunks.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
            assert!(pair[1].start_line <= pair[0].end_line, "windows must overlap");
        }
    }

    #[test]
    fn single_line_longer_than_window_is_still_emitted() {
        let long = "x".repeat(500);
        let source = format!("{long}\nshort\n");
        let chunks: Vec<_> = small_windows(100, 20)
            .chunk("a.txt", &source, Lang::Text)
            .unwrap()
            .collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 1));
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 2));
    }

    #[test]
    fn crlf_lines_keep_exact_spans() {
        let chunks: Vec<_> = chunker()
            .chunk("a.txt", "one\r\ntwo\r\n", Lang::Text)
            .unwrap()
            .collect();
        assert_eq!(chunks[0].content, "one\r\ntwo");
        assert_eq!(chunks[0].end_line, 2);
    }

    #[test]
    fn ids_are_deterministic_and_unique() {
        let source: String = (0..200).map(|i| format!("row {i}\n")).collect();
        let first: Vec<_> = small_windows(120, 30)
            .chunk("a.txt", &source, Lang::Text)
            .unwrap()
            .map(|c| c.id)
            .collect();
        let second: Vec<_> = small_windows(120, 30)
            .chunk("a.txt", &source, Lang::Text)
            .unwrap()
            .map(|c| c.id)
            .collect();
        assert_eq!(first, second);
        let unique: std::collections::HashSet<_> = first.iter().collect();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn base_kind_drops_merge_count() {
        assert_eq!(base_kind("const_itemx3"), "const_item");
        assert_eq!(base_kind("function_definition"), "function_definition");
        assert_eq!(base_kind("regex"), "regex");
        assert_eq!(base_kind("x2"), "x2");
    }

    #[test]
    fn chunk_id_depends_on_path_and_offset() {
        assert_eq!(chunk_id("a.rs", 0), chunk_id("a.rs", 0));
        assert_ne!(chunk_id("a.rs", 0), chunk_id("a.rs", 1));
        assert_ne!(chunk_id("a.rs", 0), chunk_id("b.rs", 0));
    }

    #[test]
    fn unstructured_mode_ignores_grammar() {
        let c = Chunker::new(ChunkerConfig {
            structural: false,
            ..ChunkerConfig::default()
        });
        let chunks: Vec<_> = c.chunk("auth.py", AUTH_PY, Lang::Python).unwrap().collect();
        assert!(chunks.iter().all(|ch| ch.kind == "window"));
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_function_is_its_own_chunk() {
        let chunks: Vec<_> = chunker().chunk("auth.py", AUTH_PY, Lang::Python).unwrap().collect();
        let auth = chunks
            .iter()
            .find(|c| c.entity_name.as_deref() == Some("authenticate_user"))
            .expect("authenticate_user chunk");
        assert_eq!(auth.kind, "function_definition");
        assert_eq!((auth.start_line, auth.end_line), (10, 25));
        assert!(auth.content.starts_with("def authenticate_user"));

        let header = &chunks[0];
        assert_eq!(header.kind, "block");
        assert_eq!(header.start_line, 1);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn rust_items_become_units_and_gaps_become_blocks() {
        let source = "\
use std::io;

// helpers
fn alpha() -> u32 {
    let value = 1;
    value + 41
}

struct Config {
    name: String,
    verbose: bool,
    retries: u32,
    timeout_secs: u64,
    endpoint: String,
    token: Option<String>,
}
";
        let chunks: Vec<_> = small_windows(1000, 200)
            .chunk("src/lib.rs", source, Lang::Rust)
            .unwrap()
            .collect();
        let spans: Vec<_> = chunks
            .iter()
            .map(|c| (c.kind.as_str(), c.start_line, c.end_line))
            .collect();
        assert_eq!(spans[0], ("block", 1, 1));
        // the comment directly above alpha starts its unit
        assert!(spans.iter().any(|s| s.0.starts_with("function_item") && s.1 == 3));
        assert_eq!(chunks.last().unwrap().end_line, 16);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn doc_comments_and_attributes_stay_with_their_item() {
        let body: String = (0..12).map(|i| format!("    let step_{i} = token.len() + {i};\n")).collect();
        let source = format!(
            "use std::io;\n\n/// Verify a bearer token.\n/// Returns the subject on success.\n#[must_use]\npub fn verify_token(token: &str) -> Option<String> {{\n{body}    None\n}}\n"
        );
        let chunks: Vec<_> = chunker().chunk("src/auth.rs", &source, Lang::Rust).unwrap().collect();

        let header = &chunks[0];
        assert_eq!(header.kind, "block");
        assert_eq!((header.start_line, header.end_line), (1, 1));

        let verify = chunks
            .iter()
            .find(|c| c.entity_name.as_deref() == Some("verify_token"))
            .expect("verify_token chunk");
        assert_eq!(verify.kind, "function_item");
        assert_eq!(verify.start_line, 3);
        assert!(verify.content.starts_with("/// Verify a bearer token."));
        assert!(verify.content.contains("#[must_use]"));
        assert_eq!(chunks.len(), 2);
    }

    #[cfg(feature = "lang-python")]
    #[test]
    fn python_comment_block_joins_the_def_below_it() {
        let source = "\
import os

# section: helpers

# Check a session token against the store.
# Expired tokens are rejected.
def check_token(token, store):
    entry = store.get(token)
    if entry is None:
        return False
    return not entry.expired()
";
        let chunks: Vec<_> = chunker().chunk("auth.py", source, Lang::Python).unwrap().collect();
        let check = chunks
            .iter()
            .find(|c| c.entity_name.as_deref() == Some("check_token"))
            .expect("check_token chunk");
        assert_eq!(check.start_line, 5);
        assert!(check.content.starts_with("# Check a session token"));

        // separated by a blank line, so it stays in the preceding block
        let header = &chunks[0];
        assert_eq!(header.kind, "block");
        assert_eq!((header.start_line, header.end_line), (1, 3));
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn oversized_unit_is_windowed_with_its_name() {
        let body: String = (0..80).map(|i| format!("    let v{i} = {i} * 2;\n")).collect();
        let source = format!("fn big() {{\n{body}}}\n");
        let chunks: Vec<_> = small_windows(300, 60)
            .chunk("src/big.rs", &source, Lang::Rust)
            .unwrap()
            .collect();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.entity_name.as_deref() == Some("big")));
        assert!(chunks.iter().all(|c| c.kind == "function_item"));
        assert_eq!(chunks.last().unwrap().end_line, 82);
    }

    #[cfg(feature = "lang-rust")]
    #[test]
    fn tiny_adjacent_units_are_merged() {
        let source = "const A: u8 = 1;\nconst B: u8 = 2;\nconst C: u8 = 3;\n";
        let chunks: Vec<_> = chunker().chunk("k.rs", source, Lang::Rust).unwrap().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, "const_itemx3");
        assert_eq!(chunks[0].entity_name.as_deref(), Some("A"));
    }

    fn assert_spans_cover(source: &str, chunks: &[Chunk]) {
        let lines: Vec<&str> = source.lines().collect();
        let n = lines.len();
        let mut covered = vec![false; n];
        for chunk in chunks {
            assert!(1 <= chunk.start_line && chunk.start_line <= chunk.end_line);
            assert!(chunk.end_line <= n);
            assert!(!chunk.content.is_empty());
            let expected = lines[chunk.start_line - 1..chunk.end_line].join("\n");
            assert_eq!(chunk.content, expected);
            for flag in &mut covered[chunk.start_line - 1..chunk.end_line] {
                *flag = true;
            }
        }
        for (i, line) in lines.iter().enumerate() {
            if !line.trim().is_empty() {
                assert!(covered[i], "line {} not covered", i + 1);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn windows_cover_every_non_blank_line(
            lines in prop::collection::vec("[a-z ]{0,60}", 1..120),
            window in 20usize..400,
            overlap in 0usize..120,
        ) {
            let source = lines.join("\n");
            prop_assume!(!source.trim().is_empty());
            let chunks: Vec<_> = small_windows(window, overlap)
                .chunk("p.txt", &source, Lang::Text)
                .unwrap()
                .collect();
            assert_spans_cover(&source, &chunks);
        }
    }

    #[cfg(feature = "lang-python")]
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn python_units_cover_every_non_blank_line(
            bodies in prop::collection::vec(1usize..30, 1..12),
            window in 80usize..600,
        ) {
            let mut source = String::from("import os\n\n");
            for (i, len) in bodies.iter().enumerate() {
                source.push_str(&format!("def f{i}(x):\n"));
                for j in 0..*len {
                    source.push_str(&format!("    x = x + {j}\n"));
                }
                source.push_str("    return x\n\n# between\n\n");
            }
            let chunks: Vec<_> = small_windows(window, window / 5)
                .chunk("gen.py", &source, Lang::Python)
                .unwrap()
                .collect();
            assert_spans_cover(&source, &chunks);
        }
    }
}
