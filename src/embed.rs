//! Embedding backends shared by ingestion and retrieval.
//!
//! The same `Arc<dyn Embedder>` is handed to both sides so ingest-time and
//! query-time vectors always come from one model.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text to fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model behind this embedder, e.g. `http:nomic-embed-text`.
    fn profile(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    profile: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("EMBEDDING_BASE_URL")
            .or_else(|_| dotenv::var("LLM_BASE_URL"))
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model = dotenv::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "text-embedding-nomic-embed-text-v1.5".to_string());
        let api_key = dotenv::var("EMBEDDING_API_KEY")
            .or_else(|_| dotenv::var("LLM_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(&base_url, model, api_key)
    }

    pub fn new(base_url: &str, model: String, api_key: Option<String>) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create embedding HTTP client")?;
        let base = base_url.trim_end_matches('/');
        let endpoint = if base.ends_with("/embeddings") {
            base.to_string()
        } else {
            format!("{}/embeddings", base)
        };
        Ok(Self {
            client,
            endpoint,
            profile: format!("http:{}", model),
            model,
            api_key,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: [text],
        };
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("Embedding request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("embedding endpoint returned {}: {}", status, text);
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .context("Failed to parse embedding response")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("embedding endpoint returned no vectors"))
    }
}

/// Deterministic offline embedder: lowercased word tokens hashed into a
/// fixed number of buckets, then L2-normalised.
pub struct HashingEmbedder {
    dimensions: usize,
    profile: String,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            profile: format!("hashing:{}", dimensions),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let hash = blake3::hash(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(head) % self.dimensions as u64) as usize
    }

    pub fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            vector[self.bucket(&token)] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }
}

/// Build the embedder selected by `EMBEDDING_BACKEND` (`http` or `hashing`).
pub fn from_env() -> Result<Box<dyn Embedder>> {
    let backend = dotenv::var("EMBEDDING_BACKEND").unwrap_or_else(|_| "http".to_string());
    match backend.as_str() {
        "hashing" => {
            let dimensions = dotenv::var("EMBEDDING_DIMENSIONS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(384);
            Ok(Box::new(HashingEmbedder::new(dimensions)))
        }
        "http" => Ok(Box::new(HttpEmbedder::from_env()?)),
        other => anyhow::bail!("unknown EMBEDDING_BACKEND `{}` (expected http or hashing)", other),
    }
}

/// Cosine similarity; zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut norm_a = 0f32;
    let mut norm_b = 0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
