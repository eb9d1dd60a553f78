//! Core data models shared by the ingestion and query paths.
//!
//! Every type here is immutable once constructed. A re-extracted file
//! produces a new [`Document`] that supersedes the old one; chunks are
//! rebuilt from scratch on every index build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// A normalized source document (one uploaded resume).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Derived from the source file name (e.g. `a.pdf`).
    pub id: String,
    /// Where the document was read from (input file or record file).
    pub source_path: PathBuf,
    /// Full extracted text.
    pub raw_text: String,
    /// SHA-256 of `raw_text`, used to skip rebuilds for unchanged files.
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, source_path: impl Into<PathBuf>, raw_text: String) -> Self {
        let content_hash = hash_text(&raw_text);
        Self {
            id: id.into(),
            source_path: source_path.into(),
            raw_text,
            content_hash,
            extracted_at: Utc::now(),
        }
    }

    /// Derive a document id from a file path: its final path component.
    pub fn id_for_path(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string())
    }
}

/// A bounded text segment of a [`Document`]; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub source_document_id: String,
}

/// The outcome of answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer_text: String,
    /// Document ids of the chunks that were retrieved as context.
    pub cited_sources: BTreeSet<String>,
    /// Version of the snapshot the answer was grounded on.
    pub snapshot_version: u64,
}

pub(crate) fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
