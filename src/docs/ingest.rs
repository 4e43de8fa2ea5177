use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::markup::{safe_filename, MarkupStore};
use super::tracker::ArtifactTracker;
use super::types::{DocId, DocKind, DocMeta, IndexedDocument, IngestReceipt, ReferenceMarkupDocument};
use super::DocumentIndex;
use crate::embed::Embedder;

/// Outcome of decoding uploaded bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Valid UTF-8, decoded as-is.
    Clean(String),
    /// Invalid UTF-8; undecodable sequences were replaced with U+FFFD.
    Lossy {
        text: String,
        error: std::str::Utf8Error,
    },
}

impl Decoded {
    pub fn is_lossy(&self) -> bool {
        matches!(self, Decoded::Lossy { .. })
    }

    pub fn into_text(self) -> String {
        match self {
            Decoded::Clean(text) | Decoded::Lossy { text, .. } => text,
        }
    }
}

/// Decode as UTF-8, falling back to lossy replacement instead of failing.
pub fn decode(raw: Vec<u8>) -> Decoded {
    match String::from_utf8(raw) {
        Ok(text) => Decoded::Clean(text),
        Err(e) => {
            let error = e.utf8_error();
            let text = String::from_utf8_lossy(e.as_bytes()).into_owned();
            Decoded::Lossy { text, error }
        }
    }
}

/// Deterministic document id over source and text. Distinct sources with
/// identical text, or one source with different text, get distinct ids.
pub fn doc_id(source: &str, text: &str) -> DocId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Markup is keyed by filename alone: a re-upload replaces the indexed copy.
pub fn markup_id(filename: &str) -> DocId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"markup");
    hasher.update(&[0]);
    hasher.update(filename.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Turns uploads into indexed documents; markup also goes to durable storage
/// and becomes the tracked reference.
pub struct IngestionService {
    embedder: Arc<dyn Embedder>,
    index: Arc<DocumentIndex>,
    markup: Arc<MarkupStore>,
    tracker: Arc<ArtifactTracker>,
}

impl IngestionService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<DocumentIndex>,
        markup: Arc<MarkupStore>,
        tracker: Arc<ArtifactTracker>,
    ) -> Self {
        Self {
            embedder,
            index,
            markup,
            tracker,
        }
    }

    pub async fn ingest_document(&self, raw: Vec<u8>, source: &str) -> Result<IngestReceipt> {
        let decoded = decode(raw);
        if let Decoded::Lossy { error, .. } = &decoded {
            warn!(source, %error, "Document is not valid UTF-8, decoded lossily");
        }
        let lossy = decoded.is_lossy();
        let text = decoded.into_text();
        let doc_id = self.index_text(&text, source, DocKind::Document, lossy).await?;

        info!(doc_id = %doc_id, source, size = text.len(), lossy, "Document ingested");
        Ok(IngestReceipt {
            doc_id,
            source: source.to_string(),
            size: text.len(),
            lossy,
        })
    }

    /// Store, index and track a reference markup document.
    pub async fn ingest_markup(
        &self,
        raw: Vec<u8>,
        filename: &str,
    ) -> Result<ReferenceMarkupDocument> {
        let filename = safe_filename(filename)?;
        let decoded = decode(raw);
        if let Decoded::Lossy { error, .. } = &decoded {
            warn!(filename = %filename, %error, "Markup is not valid UTF-8, decoded lossily");
        }
        let lossy = decoded.is_lossy();
        let content = decoded.into_text();

        // Storage first, tracker last: the tracked name always resolves.
        let path = self.markup.write(&filename, content.as_bytes()).await?;
        let doc_id = self
            .index_text(&content, &filename, DocKind::Markup, lossy)
            .await?;
        let version = self.tracker.set(&filename).await;

        info!(
            doc_id = %doc_id,
            filename = %filename,
            version,
            size = content.len(),
            "Reference markup ingested"
        );
        Ok(ReferenceMarkupDocument {
            filename,
            content,
            path,
            doc_id,
            lossy,
            version,
        })
    }

    /// Fetch a web page and ingest it as a regular document.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestReceipt> {
        let resp = reqwest::get(url)
            .await
            .context("Failed to fetch URL")?
            .error_for_status()
            .context("URL returned an error status")?;

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp.bytes().await.context("Failed to read response body")?;

        // Convert HTML to text if applicable
        let (text, lossy) = if content_type.contains("html") {
            let text = html2text::from_read(&body[..], 120)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string());
            (text, false)
        } else {
            let decoded = decode(body.to_vec());
            let lossy = decoded.is_lossy();
            (decoded.into_text(), lossy)
        };

        let source = format!("url:{}", url);
        let doc_id = self.index_text(&text, &source, DocKind::Document, lossy).await?;

        info!(doc_id = %doc_id, size = text.len(), url, "URL ingested");
        Ok(IngestReceipt {
            doc_id,
            source,
            size: text.len(),
            lossy,
        })
    }

    async fn index_text(
        &self,
        text: &str,
        source: &str,
        kind: DocKind,
        lossy: bool,
    ) -> Result<DocId> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .with_context(|| format!("Failed to embed {}", source))?;
        let id = match kind {
            DocKind::Document => doc_id(source, text),
            DocKind::Markup => markup_id(source),
        };
        let doc = IndexedDocument {
            meta: DocMeta {
                id: id.clone(),
                source: source.to_string(),
                kind,
                size: text.len(),
                lossy,
                ingested_at: chrono::Utc::now().timestamp(),
            },
            text: text.to_string(),
            embedding,
        };
        self.index.upsert(doc).await?;
        Ok(id)
    }
}
