//! Provider adapters.
//!
//! Every model source, hosted or local, sits behind [`ModelProvider`]. The
//! trait is deliberately infallible: transport, auth, rate-limit and
//! malformed-response failures are folded into an error-valued
//! [`GenerationResult`] so the orchestrator can persist a record for every
//! attempt and one provider's outage never aborts a comparison.

pub mod anthropic;
pub mod local;
pub mod openai;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub use anthropic::AnthropicProvider;
pub use local::{LocalModelProvider, LocalRuntime, OllamaRuntime};
pub use openai::OpenAiProvider;

/// Model id → human display name.
pub type ModelCatalog = BTreeMap<String, String>;

/// Prefix carried by every error-valued generation result.
pub const ERROR_PREFIX: &str = "Error generating response: ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub model: String,
    pub response_text: String,
    /// RFC 3339 time at which the provider call finished.
    pub timestamp: String,
    /// Set when `response_text` is an error description rather than model output.
    #[serde(default)]
    pub is_error: bool,
}

impl GenerationResult {
    pub fn success(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_text: text.into(),
            timestamp: now_rfc3339(),
            is_error: false,
        }
    }

    pub fn failure(model: impl Into<String>, error: &anyhow::Error) -> Self {
        Self {
            model: model.into(),
            response_text: format!("{ERROR_PREFIX}{error:#}"),
            timestamp: now_rfc3339(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Registry key, e.g. `"openai"`.
    fn id(&self) -> &str;

    /// Available models. Falls back to a built-in catalogue when the remote
    /// one cannot be reached; never fails.
    async fn list_models(&self) -> ModelCatalog;

    /// Run one generation. Never fails: errors come back inside the result.
    async fn generate(&self, prompt: &str, model_id: &str) -> GenerationResult;
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("LLM-Fight-Core/0.1")
        .build()
        .context("failed to construct HTTP client")
}

pub(crate) fn catalog_from(entries: &[(&str, &str)]) -> ModelCatalog {
    entries
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect()
}

/// Turn a non-2xx response into an error that names the status and the start
/// of the body, which is where providers put their explanation.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt = body.chars().take(300).collect::<String>();
    if excerpt.is_empty() {
        Err(anyhow!("provider returned HTTP {status}"))
    } else {
        Err(anyhow!("provider returned HTTP {status}: {excerpt}"))
    }
}

pub(crate) fn require_key<'a>(key: Option<&'a str>, provider: &str) -> Result<&'a str> {
    key.filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("{provider} API key is not configured"))
}
