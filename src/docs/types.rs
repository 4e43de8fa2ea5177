use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Document ID: blake3 hex hash over source and text.
pub type DocId = String;

/// What kind of upload produced an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocKind {
    Document,
    Markup,
}

/// Document metadata stored alongside text and embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub id: DocId,
    /// Upload filename, or `url:<url>` for fetched pages.
    pub source: String,
    pub kind: DocKind,
    pub size: usize,
    /// True when the bytes were not valid UTF-8 and were decoded lossily.
    #[serde(default)]
    pub lossy: bool,
    pub ingested_at: i64,
}

/// A document as held by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub meta: DocMeta,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A retrieval hit. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

/// Returned by document ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub doc_id: DocId,
    pub source: String,
    pub size: usize,
    pub lossy: bool,
}

/// A markup document written to durable storage.
#[derive(Debug, Clone)]
pub struct ReferenceMarkupDocument {
    pub filename: String,
    pub content: String,
    pub path: PathBuf,
    pub doc_id: DocId,
    pub lossy: bool,
    /// Tracker version assigned when this document became the reference.
    pub version: u64,
}

/// An index hit with its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub meta: DocMeta,
    pub text: String,
    pub score: f32,
}
