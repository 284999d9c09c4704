//! Core data models shared by the ingestion and retrieval pipeline.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A loaded source document.
///
/// Documents are identified by their logical `name` (configured by the
/// operator, e.g. `"Company Policies"`). They are immutable once loaded;
/// re-ingestion replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub source_path: String,
    pub content_type: String,
    pub text: String,
    /// SHA-256 of `text`, used to skip unchanged documents on re-ingestion.
    pub hash: String,
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<String>,
        content_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let hash = content_hash(&text);
        Self {
            name: name.into(),
            source_path: source_path.into(),
            content_type: content_type.into(),
            text,
            hash,
        }
    }
}

/// A contiguous span of a [`Document`]'s text.
///
/// `document` is a reference by name only; look the document up through
/// whatever registry the caller holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Deterministic id derived from the document name and chunk index.
    pub id: String,
    pub document: String,
    pub chunk_index: i64,
    /// Offset of the first character of `text` within the document, in chars.
    pub char_start: usize,
    pub text: String,
    pub hash: String,
}

/// A chunk paired with its similarity to a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
