pub mod extract;
pub mod prompts;
pub mod retrieval;
pub mod sanitize;
pub mod selectors;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::docs::markup::{file_url, MarkupStore};
use crate::docs::tracker::ArtifactTracker;
use crate::llm::LanguageModel;
use extract::{extract, validate_test_cases, Record, StructuredResult, TestCase};
use retrieval::RetrievalEngine;
use sanitize::sanitize;
use selectors::{check_grounding, GroundingReport};

/// Structured output wants determinism over variety.
const TEST_CASE_TEMPERATURE: f32 = 0.0;
const SCRIPT_TEMPERATURE: f32 = 0.0;

/// Failures of a language-model round trip. Single attempt, never retried.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),
    #[error("language model request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("language model did not answer within {}s", .0.as_secs())]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("No reference markup document has been ingested yet.")]
    MissingReferenceDocument,
    #[error("Reference markup file not found at: {0}")]
    ReferenceFileMissing(String),
    #[error("Invalid test case JSON: {0}")]
    InvalidTestCaseInput(String),
    #[error("Failed to load reference markup: {0:#}")]
    Storage(anyhow::Error),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A generated automation script and the markup it was grounded in.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptArtifact {
    pub script: String,
    pub reference_used: String,
    /// `file://` URL the script was told to open.
    pub reference_path: String,
    pub test_id: Option<String>,
    pub grounding: GroundingReport,
}

impl ScriptArtifact {
    /// Download name: `<Test_ID>.py`, reduced to filesystem-safe characters.
    pub fn file_name(&self) -> String {
        let stem: String = self
            .test_id
            .as_deref()
            .unwrap_or("")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if stem.trim_matches('_').is_empty() {
            "test.py".to_string()
        } else {
            format!("{}.py", stem)
        }
    }
}

/// Parse the script flow's input as a single JSON object.
pub fn parse_test_case_input(text: &str) -> Result<Record, ScriptError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(ScriptError::InvalidTestCaseInput(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ScriptError::InvalidTestCaseInput(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Bounds applied to every language-model call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationLimits {
    pub timeout: Duration,
    pub max_concurrent: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_concurrent: 4,
        }
    }
}

/// Runs the test-case and script generation flows.
pub struct GenerationOrchestrator {
    retrieval: RetrievalEngine,
    llm: Arc<dyn LanguageModel>,
    markup: Arc<MarkupStore>,
    tracker: Arc<ArtifactTracker>,
    permits: Semaphore,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        retrieval: RetrievalEngine,
        llm: Arc<dyn LanguageModel>,
        markup: Arc<MarkupStore>,
        tracker: Arc<ArtifactTracker>,
        limits: GenerationLimits,
    ) -> Self {
        Self {
            retrieval,
            llm,
            markup,
            tracker,
            permits: Semaphore::new(limits.max_concurrent.max(1)),
            timeout: limits.timeout,
        }
    }

    /// One bounded model call. On timeout the in-flight request future is
    /// dropped, which cancels it.
    async fn invoke(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| GenerationError::Transport(e.into()))?;

        debug!(prompt_len = prompt.len(), max_tokens, temperature, "Invoking language model");
        match tokio::time::timeout(
            self.timeout,
            self.llm.generate(prompt, max_tokens, temperature),
        )
        .await
        {
            Ok(Ok(text)) => {
                debug!(response_len = text.len(), "Language model answered");
                Ok(text)
            }
            Ok(Err(e)) => Err(GenerationError::Transport(e)),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Language model call timed out");
                Err(GenerationError::Timeout(self.timeout))
            }
        }
    }

    /// Retrieve context for `query`, ask for test cases, and return them
    /// parsed and schema-checked, or the raw output with the reason it was
    /// rejected.
    pub async fn generate_test_cases(
        &self,
        query: &str,
        top_k: usize,
        max_tokens: u32,
    ) -> Result<StructuredResult<Vec<TestCase>>, GenerationError> {
        let chunks = self
            .retrieval
            .retrieve(query, top_k)
            .await
            .map_err(GenerationError::Retrieval)?;
        let prompt = prompts::build_test_case_prompt(&chunks, query);
        let output = self.invoke(&prompt, max_tokens, TEST_CASE_TEMPERATURE).await?;
        let cleaned = sanitize(&output);

        let result = match extract(&cleaned) {
            StructuredResult::Parsed(records) => match validate_test_cases(records) {
                Ok(cases) => StructuredResult::Parsed(cases),
                Err(error) => StructuredResult::Unparsed {
                    raw: cleaned,
                    error,
                },
            },
            StructuredResult::Unparsed { raw, error } => StructuredResult::Unparsed { raw, error },
        };

        match &result {
            StructuredResult::Parsed(cases) => {
                info!(context = chunks.len(), cases = cases.len(), "Test cases generated")
            }
            StructuredResult::Unparsed { error, .. } => {
                warn!(context = chunks.len(), error = %error, "Model output rejected")
            }
        }
        Ok(result)
    }

    /// Generate a Selenium script for one test case against the tracked
    /// reference markup.
    pub async fn generate_script(
        &self,
        test_case_json: &str,
        max_tokens: u32,
    ) -> Result<ScriptArtifact, ScriptError> {
        let reference = self
            .tracker
            .get()
            .await
            .ok_or(ScriptError::MissingReferenceDocument)?;

        let path = self.markup.path_for(&reference.filename);
        let markup = self
            .markup
            .read(&reference.filename)
            .await
            .map_err(ScriptError::Storage)?
            .ok_or_else(|| ScriptError::ReferenceFileMissing(path.display().to_string()))?;

        let test_case = parse_test_case_input(test_case_json)?;
        let test_id = test_case
            .get("Test_ID")
            .and_then(Value::as_str)
            .map(str::to_string);

        let reference_path = file_url(&path);
        let prompt = prompts::build_script_prompt(&test_case, &markup, &reference_path);
        let output = self.invoke(&prompt, max_tokens, SCRIPT_TEMPERATURE).await?;
        let script = sanitize(&output);

        let grounding = check_grounding(
            &script,
            &markup,
            &prompts::reference_literal(&reference_path),
        );
        if !grounding.is_clean() {
            warn!(
                reference = %reference.filename,
                unknown = ?grounding.unknown_selectors,
                literal_present = grounding.reference_literal_present,
                "Generated script is not fully grounded in the reference markup"
            );
        }
        info!(
            reference = %reference.filename,
            version = reference.version,
            test_id = test_id.as_deref().unwrap_or("-"),
            script_len = script.len(),
            "Script generated"
        );

        Ok(ScriptArtifact {
            script,
            reference_used: reference.filename,
            reference_path,
            test_id,
            grounding,
        })
    }
}
