//! Shared fixtures for unit tests: a temp-dir backed pipeline and
//! language-model doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use crate::docs::ingest::IngestionService;
use crate::docs::markup::MarkupStore;
use crate::docs::tracker::ArtifactTracker;
use crate::docs::DocumentIndex;
use crate::embed::{Embedder, HashingEmbedder};
use crate::llm::LanguageModel;
use crate::qa::retrieval::RetrievalEngine;
use crate::qa::{GenerationLimits, GenerationOrchestrator};

#[derive(Debug, Clone)]
pub struct Call {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

type Reply = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Answers from a closure over the prompt and records every call.
pub struct ScriptedModel {
    reply: Reply,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedModel {
    pub fn with(reply: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        let text = text.to_string();
        Self::with(move |_| Ok(text.clone()))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        let message = message.to_string();
        Self::with(move |_| Err(anyhow::anyhow!("LLM API error {}", message)))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str, max_output_tokens: u32, temperature: f32) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            prompt: prompt.to_string(),
            max_tokens: max_output_tokens,
            temperature,
        });
        (self.reply)(prompt)
    }
}

/// Never answers.
pub struct StalledModel;

#[async_trait]
impl LanguageModel for StalledModel {
    async fn generate(&self, _: &str, _: u32, _: f32) -> Result<String> {
        futures::future::pending::<Result<String>>().await
    }
}

/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct GaugeModel {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
}

impl GaugeModel {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for GaugeModel {
    async fn generate(&self, _: &str, _: u32, _: f32) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok("[]".to_string())
    }
}

/// A full ingestion pipeline over a throwaway directory.
pub struct Harness {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<DocumentIndex>,
    pub markup: Arc<MarkupStore>,
    pub tracker: Arc<ArtifactTracker>,
    pub ingestion: IngestionService,
    // Dropped last so storage closes before the directory goes away.
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(384));
        let index = Arc::new(
            DocumentIndex::open(&dir.path().join("index"), embedder.profile())
                .await
                .unwrap(),
        );
        let markup = Arc::new(MarkupStore::new(&dir.path().join("markup")).unwrap());
        let tracker = Arc::new(ArtifactTracker::new());
        let ingestion = IngestionService::new(
            embedder.clone(),
            index.clone(),
            markup.clone(),
            tracker.clone(),
        );
        Self {
            embedder,
            index,
            markup,
            tracker,
            ingestion,
            _dir: dir,
        }
    }

    pub fn retrieval(&self) -> RetrievalEngine {
        RetrievalEngine::new(self.embedder.clone(), self.index.clone())
    }

    pub fn orchestrator(&self, llm: Arc<dyn LanguageModel>) -> GenerationOrchestrator {
        self.orchestrator_with(llm, GenerationLimits::default())
    }

    pub fn orchestrator_with(
        &self,
        llm: Arc<dyn LanguageModel>,
        limits: GenerationLimits,
    ) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            self.retrieval(),
            llm,
            self.markup.clone(),
            self.tracker.clone(),
            limits,
        )
    }
}
