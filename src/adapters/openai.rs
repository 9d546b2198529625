//! OpenAI-compatible chat completions adapter.
//!
//! Talks to `POST {base_url}/chat/completions` with bearer auth. Works with
//! any server exposing the same wire format.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::{ChatMessage, CompletionOutput, CompletionRequest, CompletionService};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions client
pub struct OpenAiAdapter {
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

impl OpenAiAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionOutput> {
        let body = ChatRequestBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to reach completion service")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion service returned {}: {}", status, text.trim());
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Completion response contained no choices")?;

        Ok(CompletionOutput {
            content,
            tokens_used: parsed.usage.map(|u| u.total_tokens),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutput> {
        timeout(self.request_timeout, self.send(&request))
            .await
            .with_context(|| {
                format!(
                    "Completion for model '{}' timed out after {:?}",
                    request.model, self.request_timeout
                )
            })?
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.api_url("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("Failed to run completion service health check")?;

        if !response.status().is_success() {
            anyhow::bail!("Completion service health check failed: {}", response.status());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_trims_trailing_slash() {
        let adapter = OpenAiAdapter::new("http://localhost:8080/v1/", "key", Duration::from_secs(5));
        assert_eq!(
            adapter.api_url("chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
        assert_eq!(adapter.name(), "openai");
    }

    #[test]
    fn test_response_body_parsing() {
        let body: ChatResponseBody = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"YES"}}],"usage":{"total_tokens":12}}"#,
        )
        .unwrap();

        assert_eq!(body.choices[0].message.content.as_deref(), Some("YES"));
        assert_eq!(body.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_request_body_shape() {
        let request = CompletionRequest::new("m", 10, 0.0).user("hi");
        let body = ChatRequestBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
    }
}
