use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Text generation capability used by the QA flows.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, max_output_tokens: u32, temperature: f32)
        -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Client for OpenAI-compatible chat completion endpoints.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-8b".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        // Per-call deadlines live in the orchestrator.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Non-streaming chat completion.
    async fn chat(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            anyhow::bail!("LLM returned {}: {}", status, text);
        }
        completion_text(&text)
    }
}

/// `choices[0].message.content` of a completion body. A success status with
/// no content (error body, null or filtered reply) is an error.
fn completion_text(body: &str) -> Result<String> {
    let json: serde_json::Value = serde_json::from_str(body).context("Failed to parse LLM JSON")?;
    json["choices"]
        .get(0)
        .and_then(|c| c["message"]["content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("LLM response has no content: {}", body))
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        self.chat(&messages, max_output_tokens, temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> LlmClient {
        LlmClient {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            model: "m".to_string(),
            api_key: None,
        }
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            client("http://localhost:1234/v1").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.example.com/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client("https://host/openai/v1/chat/completions").endpoint(),
            "https://host/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_completion_text() {
        let ok = r#"{"choices":[{"message":{"role":"assistant","content":"[]"}}]}"#;
        assert_eq!(completion_text(ok).unwrap(), "[]");
        // Empty content is still an answer.
        let empty = r#"{"choices":[{"message":{"content":""}}]}"#;
        assert_eq!(completion_text(empty).unwrap(), "");
    }

    #[test]
    fn test_completion_without_content_is_an_error() {
        let err = completion_text(r#"{"error":{"message":"quota exceeded"}}"#).unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(completion_text(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(completion_text(r#"{"choices":[]}"#).is_err());
        assert!(completion_text("not json").is_err());
    }
}
