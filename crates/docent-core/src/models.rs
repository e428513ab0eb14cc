//! Core data models shared by the indexing and retrieval pipeline.
//!
//! These types carry document text from extraction through chunking and
//! embedding into the [`DocumentIndex`](crate::index::DocumentIndex).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Plain text recovered from one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Stable identifier: SHA-256 over the file name and the text.
    pub id: String,
    /// Original file name as supplied by the uploader.
    pub name: String,
    /// Extracted UTF-8 text.
    pub text: String,
}

impl ExtractedDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        let text = text.into();
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        let id = format!("{:x}", hasher.finalize());
        Self { id, name, text }
    }
}

/// A contiguous span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id derived from the document id and chunk index.
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk together with its embedding vector; the unit stored in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexNode {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
}

impl IndexNode {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            document_id: chunk.document_id,
            document_name: chunk.document_name,
            chunk_index: chunk.chunk_index,
            text: chunk.text,
            hash: chunk.hash,
            vector,
        }
    }
}

/// A node returned from similarity retrieval.
#[derive(Debug, Clone)]
pub struct ScoredNode<'a> {
    pub node: &'a IndexNode,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}
