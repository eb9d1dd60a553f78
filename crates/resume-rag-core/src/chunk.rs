//! Sentence-boundary text chunker with global deduplication.
//!
//! Splits document text into segments no longer than `chunk_size`
//! characters, repeating up to `chunk_size / 10` characters of context
//! between neighbouring segments.
//!
//! # Algorithm
//!
//! 1. Pick the first separator (`". "`, then `", "`) that occurs in the
//!    text and split after each occurrence, keeping the separator on the
//!    preceding piece.
//! 2. Pieces shorter than `chunk_size` are accumulated and merged into
//!    windows of at most `chunk_size` characters. When a window is
//!    emitted, pieces are dropped from its front until at most `overlap`
//!    characters remain; those carry over into the next window.
//! 3. Pieces of `chunk_size` or more are split again with the remaining
//!    separators. When none remain, the piece is cut character by
//!    character (the hard-cut fallback).
//! 4. Every emitted segment is trimmed; empty segments are discarded.
//!
//! [`chunk_documents`] runs the splitter over a whole collection and drops
//! any segment whose exact text was already produced earlier in the same
//! build, so the first occurrence wins.
//!
//! # Example
//!
//! ```rust
//! use resume_rag_core::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(512);
//! let chunks = splitter.split("Resume: Python developer");
//! assert_eq!(chunks, vec!["Resume: Python developer".to_string()]);
//! ```

use std::collections::{HashSet, VecDeque};

use crate::models::{Chunk, Document};

/// Preferred split points, tried in order.
pub const DEFAULT_SEPARATORS: &[&str] = &[". ", ", "];

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Recursive separator-based splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter with `overlap = chunk_size / 10` and the default
    /// separators. A `chunk_size` of zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: chunk_size / 10,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into trimmed, non-empty segments in textual order.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.split_recursive(text, &self.separators, &mut out);
        out
    }

    fn split_recursive(&self, text: &str, separators: &[String], out: &mut Vec<String>) {
        let picked = separators
            .iter()
            .position(|sep| text.contains(sep.as_str()));

        let (pieces, remaining): (Vec<&str>, &[String]) = match picked {
            Some(i) => (
                text.split_inclusive(separators[i].as_str()).collect(),
                &separators[i + 1..],
            ),
            None => (
                text.char_indices()
                    .map(|(start, c)| &text[start..start + c.len_utf8()])
                    .collect(),
                &[],
            ),
        };

        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                self.merge(&pending, out);
                pending.clear();
            }

            if picked.is_none() {
                // Single character at least as long as chunk_size (chunk_size == 1).
                push_trimmed(piece, out);
            } else {
                self.split_recursive(piece, remaining, out);
            }
        }

        if !pending.is_empty() {
            self.merge(&pending, out);
        }
    }

    /// Merge small pieces into windows of at most `chunk_size` characters.
    fn merge(&self, pieces: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                emit(&window, out);
                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        emit(&window, out);
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Chunk every document in collection order and deduplicate globally.
///
/// # Guarantees
///
/// - No two returned chunks share identical `text`.
/// - Documents appear in input order; segments within a document appear
///   in textual order.
/// - Every chunk is non-empty and at most `chunk_size` characters long.
pub fn chunk_documents(documents: &[Document], splitter: &TextSplitter) -> Vec<Chunk> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut chunks = Vec::new();

    for doc in documents {
        for text in splitter.split(&doc.raw_text) {
            if seen.contains(&text) {
                continue;
            }
            seen.insert(text.clone());
            chunks.push(Chunk {
                text,
                source_document_id: doc.id.clone(),
            });
        }
    }

    chunks
}

/// Chunk counts for a dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub documents: usize,
    pub segments: usize,
    pub unique_chunks: usize,
    pub longest_chunk: usize,
}

pub fn chunk_stats(documents: &[Document], splitter: &TextSplitter) -> ChunkStats {
    let segments = documents
        .iter()
        .map(|d| splitter.split(&d.raw_text).len())
        .sum();
    let chunks = chunk_documents(documents, splitter);
    ChunkStats {
        documents: documents.len(),
        segments,
        unique_chunks: chunks.len(),
        longest_chunk: chunks.iter().map(|c| char_len(&c.text)).max().unwrap_or(0),
    }
}

fn emit(window: &VecDeque<(&str, usize)>, out: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    push_trimmed(&joined, out);
}

fn push_trimmed(text: &str, out: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
