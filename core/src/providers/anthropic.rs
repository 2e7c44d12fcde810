use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{
    build_client, catalog_from, ensure_success, require_key, GenerationResult, ModelCatalog,
    ModelProvider,
};
use crate::config::RemoteProviderConfig;

pub const PROVIDER_ID: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

// Messages API has no catalogue endpoint we rely on; the list is fixed.
const CATALOG: &[(&str, &str)] = &[
    ("claude-3-opus-20240229", "Claude 3 Opus"),
    ("claude-3-sonnet-20240229", "Claude 3 Sonnet"),
    ("claude-2.1", "Claude 2.1"),
];

/// Messages API backed provider.
pub struct AnthropicProvider {
    client: Client,
    config: RemoteProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: RemoteProviderConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { client, config })
    }

    async fn complete(&self, prompt: &str, model_id: &str) -> Result<String> {
        let secret = require_key(self.config.api_key.as_deref(), "Anthropic")?;
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));

        let mut payload = serde_json::json!({
            "model": model_id,
            "max_tokens": self.config.max_tokens.unwrap_or(1024),
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(temperature) = self.config.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }

        let response = self
            .client
            .post(url)
            .header("x-api-key", secret)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        body.get("content")
            .and_then(|c| c.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|text| text.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("response did not contain content[0].text"))
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn list_models(&self) -> ModelCatalog {
        catalog_from(CATALOG)
    }

    async fn generate(&self, prompt: &str, model_id: &str) -> GenerationResult {
        let model_id = if model_id.is_empty() { DEFAULT_MODEL } else { model_id };
        match self
            .complete(prompt, model_id)
            .await
            .context("Anthropic request failed")
        {
            Ok(text) => GenerationResult::success(model_id, text),
            Err(err) => {
                log::error!("Anthropic API error for model {model_id}: {err:#}");
                GenerationResult::failure(model_id, &err)
            }
        }
    }
}
