use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::CompletionError;
use super::types::{ChatRequest, ChatResponse};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Text-completion capability: a message history in, generated text out.
///
/// Implementations are stateless per call and must not retry internally.
#[allow(async_fn_in_trait)]
pub trait CompletionClient {
    async fn complete(&self, req: &ChatRequest) -> Result<String, CompletionError>;
}

/// Hosted provider speaking the OpenAI chat-completions protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Groq,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Groq => GROQ_BASE_URL,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn key_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }

    /// Parses the `LLM_CLIENT` value. Anything but `groq` selects OpenAI.
    pub fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("groq") {
            Provider::Groq
        } else {
            Provider::OpenAi
        }
    }
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl OpenAiClient {
    /// Create a client for an OpenAI-compatible endpoint rooted at `base_url`.
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, CompletionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(CompletionError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CompletionError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ChatResponse>().await?)
    }
}

impl CompletionClient for OpenAiClient {
    async fn complete(&self, req: &ChatRequest) -> Result<String, CompletionError> {
        let response = self.send(req).await?;
        match response.first_text() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(CompletionError::EmptyResponse),
        }
    }
}
