//! Sentence-aware text chunker with overlap.
//!
//! Splits a document's text into [`Chunk`]s no longer than `max_tokens`
//! (at [`CHARS_PER_TOKEN`] characters per token). Adjacent chunks share up
//! to `overlap_tokens` worth of trailing sentences so that a fact split
//! across a chunk boundary is still retrievable from one chunk.
//!
//! # Algorithm
//!
//! 1. Split the text on blank lines into paragraphs, then each paragraph
//!    into sentences (terminated by `.`, `!` or `?` followed by whitespace).
//! 2. Sentences longer than the chunk budget are hard-split on the last
//!    space before the budget, falling back to a char boundary.
//! 3. Sentences are packed greedily into a window. When the next sentence
//!    would overflow, the window is emitted and a new one is seeded with
//!    the trailing sentences that fit in the overlap budget.
//! 4. Every non-blank text yields at least one chunk; blank text yields none.
//!
//! # Example
//!
//! ```rust
//! use docent_core::chunk::chunk_document;
//! use docent_core::models::ExtractedDocument;
//!
//! let doc = ExtractedDocument::new("notes.txt", "First sentence. Second sentence.");
//! let chunks = chunk_document(&doc, 1024, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, ExtractedDocument};

/// Approximate characters-per-token ratio used for all size budgets.
pub const CHARS_PER_TOKEN: usize = 4;

/// Split a document into overlapping chunks.
///
/// `overlap_tokens` is clamped below `max_tokens`. Chunk indices are
/// contiguous from 0 and chunk ids are deterministic, so chunking the same
/// document twice yields identical output.
pub fn chunk_document(doc: &ExtractedDocument, max_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens.min(max_tokens.saturating_sub(1)) * CHARS_PER_TOKEN;

    let sentences: Vec<&str> = doc
        .text
        .split("\n\n")
        .flat_map(split_sentences)
        .flat_map(|s| hard_split(s, max_chars))
        .collect();

    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for sentence in sentences {
        let added = if window.is_empty() {
            sentence.len()
        } else {
            sentence.len() + 1
        };
        if window_len + added > max_chars && !window.is_empty() {
            chunks.push(make_chunk(doc, chunks.len(), &window.join(" ")));
            let carried = overlap_tail(&window, overlap_chars, max_chars - sentence.len());
            window = carried;
            window_len = joined_len(&window);
        }
        window_len += if window.is_empty() {
            sentence.len()
        } else {
            sentence.len() + 1
        };
        window.push(sentence);
    }

    if !window.is_empty() {
        chunks.push(make_chunk(doc, chunks.len(), &window.join(" ")));
    }

    chunks
}

/// Split a paragraph into trimmed, non-empty sentences.
fn split_sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().map(|(_, n)| n.is_whitespace()).unwrap_or(true);
            if at_break {
                let end = i + c.len_utf8();
                push_trimmed(&mut out, &paragraph[start..end]);
                start = end;
            }
        }
    }
    push_trimmed(&mut out, &paragraph[start..]);
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, s: &'a str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t);
    }
}

/// Break a sentence that exceeds `max_chars` into pieces that fit.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = sentence;
    while rest.len() > max_chars {
        let limit = floor_char_boundary(rest, max_chars);
        let cut = rest[..limit]
            .rfind(' ')
            .filter(|&pos| pos > 0)
            .unwrap_or(limit);
        let cut = if cut == 0 {
            rest.chars().next().map(|c| c.len_utf8()).unwrap_or(rest.len())
        } else {
            cut
        };
        push_trimmed(&mut pieces, &rest[..cut]);
        rest = rest[cut..].trim_start();
    }
    push_trimmed(&mut pieces, rest);
    pieces
}

/// Largest char boundary `<= index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Trailing sentences of `window` fitting both the overlap budget and the
/// room left for the incoming sentence.
fn overlap_tail<'a>(window: &[&'a str], overlap_chars: usize, room: usize) -> Vec<&'a str> {
    let budget = overlap_chars.min(room);
    let mut tail = Vec::new();
    let mut used = 0usize;
    for s in window.iter().rev() {
        let cost = if tail.is_empty() { s.len() } else { s.len() + 1 };
        // +1 for the separator before the incoming sentence
        if used + cost + 1 > budget {
            break;
        }
        used += cost;
        tail.push(*s);
    }
    tail.reverse();
    tail
}

fn joined_len(parts: &[&str]) -> usize {
    parts.iter().map(|p| p.len()).sum::<usize>() + parts.len().saturating_sub(1)
}

fn make_chunk(doc: &ExtractedDocument, index: usize, text: &str) -> Chunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));

    let mut id_hasher = Sha256::new();
    id_hasher.update(doc.id.as_bytes());
    id_hasher.update(index.to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize())[..32].to_string();

    Chunk {
        id,
        document_id: doc.id.clone(),
        document_name: doc.name.clone(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
