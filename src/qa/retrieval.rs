use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::docs::types::RetrievedChunk;
use crate::docs::DocumentIndex;
use crate::embed::Embedder;

/// Embeds a query and returns the nearest indexed documents, best first.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<DocumentIndex>,
}

impl RetrievalEngine {
    /// `embedder` must be the instance the index was built with.
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<DocumentIndex>) -> Self {
        Self { embedder, index }
    }

    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 || self.index.len().await == 0 {
            return Ok(Vec::new());
        }
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;
        let hits = self.index.query(&embedding, top_k).await?;
        debug!(
            top_k,
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved context"
        );
        Ok(hits
            .into_iter()
            .map(|h| RetrievedChunk {
                text: h.text,
                source: h.meta.source,
                score: h.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let h = Harness::new().await;
        let chunks = h.retrieval().retrieve("anything", 5).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_by_source() {
        let h = Harness::new().await;
        let text = "Orders ship within two business days";
        h.ingestion
            .ingest_document(text.as_bytes().to_vec(), "shipping.md")
            .await
            .unwrap();
        h.ingestion
            .ingest_document(b"Refunds are issued to the original card".to_vec(), "refunds.md")
            .await
            .unwrap();

        let chunks = h.retrieval().retrieve(text, 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "shipping.md");
        assert_eq!(chunks[0].text, text);
    }

    #[tokio::test]
    async fn test_discount_scenario() {
        let h = Harness::new().await;
        h.ingestion
            .ingest_document(b"Discount code SAVE15 gives 15% off".to_vec(), "faq.md")
            .await
            .unwrap();
        h.ingestion
            .ingest_document(b"Standard shipping is free above 50 dollars".to_vec(), "shipping.md")
            .await
            .unwrap();

        let chunks = h.retrieval().retrieve("discount code", 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "faq.md");
    }

    #[tokio::test]
    async fn test_results_ordered_and_bounded() {
        let h = Harness::new().await;
        for (i, text) in [
            "checkout button colour",
            "discount code rules",
            "discount code expiry and discount limits",
        ]
        .iter()
        .enumerate()
        {
            h.ingestion
                .ingest_document(text.as_bytes().to_vec(), &format!("doc{}.md", i))
                .await
                .unwrap();
        }

        let engine = h.retrieval();
        let chunks = engine.retrieve("discount code", 10).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.windows(2).all(|w| w[0].score >= w[1].score));

        let again = engine.retrieve("discount code", 10).await.unwrap();
        assert_eq!(chunks, again);

        assert_eq!(engine.retrieve("discount code", 2).await.unwrap().len(), 2);
        assert!(engine.retrieve("discount code", 0).await.unwrap().is_empty());
    }
}
