//! Reasoning-service seam and the production OpenAI-compatible client.
//!
//! The pipeline treats the reasoning service as an optional accelerant
//! behind the [`ReasoningService`] trait: given a system prompt, user
//! content and an optional response-schema hint, it either returns parsed
//! JSON or fails with a [`ServiceError`]. Every caller degrades to its
//! local result on failure, so nothing here is on the correctness path.
//!
//! [`OpenAiReasoning`] talks to any OpenAI-compatible chat-completions
//! endpoint in JSON mode. It is intentionally thin: no retries and no
//! back-off — admission control lives entirely in
//! [`crate::schedule::run_chunks`]'s fixed pacing.

use crate::config::PipelineConfig;
use crate::error::ServiceError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Capability interface for calls to an external reasoning service.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Ask the service for a JSON answer.
    ///
    /// `schema_hint`, when present, describes the desired response shape and
    /// is folded into the system message by the implementation.
    async fn call(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema_hint: Option<&Value>,
    ) -> Result<Value, ServiceError>;
}

/// Production client for OpenAI-compatible chat-completions endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiReasoning {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiReasoning {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Build a client with the model/temperature/token knobs from `config`.
    pub fn new(api_key: impl Into<String>, config: &PipelineConfig) -> Result<Self, ServiceError> {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL, config)
    }

    /// Build a client against a non-default endpoint (proxies, local
    /// OpenAI-compatible servers, test servers).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &PipelineConfig,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.service_timeout)
            .build()
            .map_err(|e| ServiceError::Transport {
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_completion_tokens,
        })
    }

    /// Read the API key from `OPENAI_API_KEY`; `None` when unset or empty,
    /// in which case the pipeline runs without enhancement.
    pub fn from_env(config: &PipelineConfig) -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok()?;
        if key.is_empty() {
            return None;
        }
        Self::new(key, config).ok()
    }
}

#[async_trait]
impl ReasoningService for OpenAiReasoning {
    async fn call(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema_hint: Option<&Value>,
    ) -> Result<Value, ServiceError> {
        let system = match schema_hint {
            Some(schema) => format!("{system_prompt}\n\nResponse schema:\n{schema}"),
            None => system_prompt.to_string(),
        };

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user_content},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth {
                detail: format!("HTTP {status}"),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ServiceError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                detail: truncate(&detail, 200),
            });
        }

        let payload: Value = response.json().await.map_err(|e| {
            ServiceError::MalformedResponse {
                detail: e.to_string(),
            }
        })?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ServiceError::MalformedResponse {
                detail: "response has no choices[0].message.content".to_string(),
            })?;

        debug!("reasoning service returned {} chars", content.len());

        serde_json::from_str(content).map_err(|e| ServiceError::MalformedResponse {
            detail: format!("content is not valid JSON: {e}"),
        })
    }
}

fn classify_transport(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport {
            detail: e.to_string(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
