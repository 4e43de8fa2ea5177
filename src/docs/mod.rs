pub mod ingest;
pub mod markup;
pub mod tracker;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embed::cosine_similarity;
use types::{DocId, DocMeta, IndexedDocument, ScoredDocument};

// Key prefixes (no trailing slashes, cnidarium convention)
const DOC_PREFIX: &str = "index/doc";
const PROFILE_PREFIX: &str = "index/profile";

fn doc_key(id: &str) -> String {
    format!("{}/{}", DOC_PREFIX, id)
}
fn profile_key() -> String {
    format!("{}/embedding", PROFILE_PREFIX)
}

/// Embedding model and dimension the stored vectors were produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct EmbeddingProfile {
    model: String,
    dimensions: usize,
}

/// Refuse to mix vectors from two different embedding models in one index.
fn check_profile(stored: Option<&EmbeddingProfile>, configured: &str) -> Result<()> {
    match stored {
        Some(p) if p.model != configured => anyhow::bail!(
            "index was built with embedding model `{}` but `{}` is configured; \
             re-ingest into a fresh data directory or restore the original model",
            p.model,
            configured
        ),
        _ => Ok(()),
    }
}

#[derive(Default)]
struct Entries {
    docs: BTreeMap<DocId, IndexedDocument>,
    dimensions: Option<usize>,
}

/// Persistent vector index. Documents live in cnidarium and are mirrored in
/// memory; queries are exact cosine scans over the mirror.
pub struct DocumentIndex {
    storage: Storage,
    profile: String,
    entries: RwLock<Entries>,
}

impl DocumentIndex {
    pub async fn open(data_dir: &Path, profile: &str) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![DOC_PREFIX.to_string(), PROFILE_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;

        let snapshot = storage.latest_snapshot();
        let stored: Option<EmbeddingProfile> = match snapshot.get_raw(&profile_key()).await? {
            Some(bytes) => Some(serde_json::from_slice(&bytes).context("parse embedding profile")?),
            None => None,
        };
        check_profile(stored.as_ref(), profile)?;

        let mut entries = Entries {
            docs: BTreeMap::new(),
            dimensions: stored.map(|p| p.dimensions),
        };
        let mut stream = Box::pin(snapshot.prefix_raw(DOC_PREFIX));
        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => match serde_json::from_slice::<IndexedDocument>(&value) {
                    Ok(doc) => {
                        entries.docs.insert(doc.meta.id.clone(), doc);
                    }
                    Err(e) => warn!(key = %key, "Skipping unreadable index entry: {}", e),
                },
                Err(e) => warn!("Error reading index stream: {}", e),
            }
        }
        info!(
            documents = entries.docs.len(),
            profile, "Document index loaded"
        );

        Ok(Self {
            storage,
            profile: profile.to_string(),
            entries: RwLock::new(entries),
        })
    }

    /// Insert or replace a document by its id.
    pub async fn upsert(&self, doc: IndexedDocument) -> Result<()> {
        anyhow::ensure!(!doc.embedding.is_empty(), "refusing to index an empty embedding");
        anyhow::ensure!(
            doc.embedding.iter().all(|v| v.is_finite()),
            "refusing to index a non-finite embedding for {}",
            doc.meta.source
        );

        // Held across the commit so the first upsert alone records the profile.
        let mut entries = self.entries.write().await;
        let dims = doc.embedding.len();
        if let Some(expected) = entries.dimensions {
            anyhow::ensure!(
                expected == dims,
                "embedding dimension mismatch: index holds {}-d vectors, got {}",
                expected,
                dims
            );
        }

        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        delta.put_raw(
            doc_key(&doc.meta.id),
            serde_json::to_vec(&doc).context("serialize indexed document")?,
        );
        if entries.dimensions.is_none() {
            let profile = EmbeddingProfile {
                model: self.profile.clone(),
                dimensions: dims,
            };
            delta.put_raw(
                profile_key(),
                serde_json::to_vec(&profile).context("serialize embedding profile")?,
            );
        }
        self.storage.commit(delta).await?;

        debug!(doc_id = %doc.meta.id, source = %doc.meta.source, dims, "document indexed");
        entries.dimensions = Some(dims);
        entries.docs.insert(doc.meta.id.clone(), doc);
        Ok(())
    }

    /// Top-`k` documents by descending cosine similarity. Ties break on id so
    /// repeated queries against an unchanged index return the same order.
    pub async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        let entries = self.entries.read().await;
        if k == 0 || entries.docs.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = entries.dimensions {
            anyhow::ensure!(
                expected == embedding.len(),
                "query embedding has {} dimensions, index holds {}",
                embedding.len(),
                expected
            );
        }
        anyhow::ensure!(
            embedding.iter().all(|v| v.is_finite()),
            "query embedding has non-finite values"
        );

        let mut scored: Vec<(f32, &IndexedDocument)> = entries
            .docs
            .values()
            .map(|doc| (cosine_similarity(embedding, &doc.embedding), doc))
            // Overflowing magnitudes can still produce NaN.
            .filter(|(score, _)| score.is_finite())
            .collect();
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.meta.id.cmp(&b.1.meta.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, doc)| ScoredDocument {
                meta: doc.meta.clone(),
                text: doc.text.clone(),
                score,
            })
            .collect())
    }

    /// List indexed documents, newest first.
    pub async fn list(&self, limit: usize) -> Vec<DocMeta> {
        let entries = self.entries.read().await;
        let mut results: Vec<DocMeta> = entries.docs.values().map(|d| d.meta.clone()).collect();
        results.sort_by(|a, b| {
            b.ingested_at
                .cmp(&a.ingested_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        results.truncate(limit);
        results
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.docs.len()
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}
