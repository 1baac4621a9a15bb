//! Narrow interface to the externally-hosted completion service.
//!
//! Everything "intelligent" in the portal (query generation, chat replies)
//! is delegated to a remote model behind `TextGenerator`. The ingestion and
//! store crates never depend on this one.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "apfs-llm";

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("completion response missing text content")]
    EmptyResponse,
}

/// The one obligation the portal has toward the model service: prompt text
/// in, generated text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl CompletionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
        }
    }
}

/// OpenAI-compatible chat-completions client. Retries throttling and
/// timeouts a bounded number of times, then surfaces the failure.
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "temperature": 0,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut attempt = 0u32;
        loop {
            let send_result = self
                .client
                .post(&self.config.api_url)
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await;

            match send_result {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        if status.as_u16() == 429 && attempt < self.config.max_retries {
                            attempt += 1;
                            tokio::time::sleep(Duration::from_millis(150 * u64::from(attempt)))
                                .await;
                            continue;
                        }
                        return Err(GenerateError::HttpStatus {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    let body: serde_json::Value = response.json().await?;
                    let text = extract_completion_text(&body)?;
                    debug!(chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err(err) => {
                    if err.is_timeout() && attempt < self.config.max_retries {
                        attempt += 1;
                        tokio::time::sleep(Duration::from_millis(150 * u64::from(attempt))).await;
                        continue;
                    }
                    return Err(GenerateError::Request(err));
                }
            }
        }
    }
}

fn extract_completion_text(body: &serde_json::Value) -> Result<String, GenerateError> {
    body.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(GenerateError::EmptyResponse)
}

/// Strip a markdown code fence the model may wrap generated SQL in.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop an optional language tag on the opening fence line.
    match inner.split_once('\n') {
        Some((first, rest)) if !first.contains(' ') => rest.trim(),
        _ => inner.trim(),
    }
}
