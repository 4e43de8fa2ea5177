use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::docs::ingest::IngestionService;
use crate::docs::tracker::ArtifactTracker;
use crate::docs::DocumentIndex;
use crate::qa::extract::TestCase;
use crate::qa::GenerationOrchestrator;

/// Generation parameters admins can change at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaConfig {
    pub top_k: usize,
    pub testcase_max_tokens: u32,
    pub script_max_tokens: u32,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            testcase_max_tokens: 2048,
            script_max_tokens: 4096,
        }
    }
}

impl QaConfig {
    pub const PARAMS: [&'static str; 3] = ["top_k", "testcase_max_tokens", "script_max_tokens"];

    /// Apply `key = value`. Zero is rejected for every parameter, and the
    /// script budget must stay above the test-case budget.
    pub fn set(&mut self, key: &str, value: u32) -> Result<(), String> {
        if value == 0 {
            return Err(format!("`{}` must be greater than zero", key));
        }
        let mut next = *self;
        match key {
            "top_k" => next.top_k = value as usize,
            "testcase_max_tokens" => next.testcase_max_tokens = value,
            "script_max_tokens" => next.script_max_tokens = value,
            _ => {
                return Err(format!(
                    "Unknown param `{}`. Valid: {}",
                    key,
                    Self::PARAMS
                        .iter()
                        .map(|p| format!("`{}`", p))
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            }
        }
        if next.script_max_tokens <= next.testcase_max_tokens {
            return Err(format!(
                "`script_max_tokens` ({}) must be greater than `testcase_max_tokens` ({})",
                next.script_max_tokens, next.testcase_max_tokens
            ));
        }
        *self = next;
        Ok(())
    }
}

pub struct AppState {
    pub index: Arc<DocumentIndex>,
    pub ingestion: Arc<IngestionService>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub tracker: Arc<ArtifactTracker>,
    pub admin_ids: HashSet<u64>,
    pub qa_config: Arc<RwLock<QaConfig>>,
    /// Last generated test cases per user, for `/qa script` selection.
    pub testcases: RwLock<HashMap<u64, Vec<TestCase>>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_set() {
        let mut config = QaConfig::default();
        config.set("top_k", 3).unwrap();
        config.set("script_max_tokens", 8192).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.script_max_tokens, 8192);
        assert_eq!(config.testcase_max_tokens, 2048);
    }

    #[test]
    fn test_config_rejects_zero_and_unknown() {
        let mut config = QaConfig::default();
        assert!(config.set("top_k", 0).is_err());
        let err = config.set("temperature", 1).unwrap_err();
        assert!(err.contains("`top_k`"));
        assert_eq!(config, QaConfig::default());
    }

    #[test]
    fn test_config_keeps_script_budget_larger() {
        let mut config = QaConfig::default();
        assert!(config.set("script_max_tokens", 100).is_err());
        assert!(config.set("script_max_tokens", 2048).is_err());
        assert!(config.set("testcase_max_tokens", 4096).is_err());
        assert_eq!(config, QaConfig::default());

        config.set("testcase_max_tokens", 4095).unwrap();
        config.set("script_max_tokens", 8192).unwrap();
        assert_eq!(config.testcase_max_tokens, 4095);
        assert_eq!(config.script_max_tokens, 8192);
    }
}
