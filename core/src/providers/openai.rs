use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::{
    build_client, catalog_from, ensure_success, require_key, GenerationResult, ModelCatalog,
    ModelProvider,
};
use crate::config::RemoteProviderConfig;

pub const PROVIDER_ID: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const DEFAULT_CATALOG: &[(&str, &str)] = &[
    ("gpt-4-1106-preview", "GPT-4 Turbo"),
    ("gpt-4", "GPT-4"),
    ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
];

/// Chat-completions backed provider.
pub struct OpenAiProvider {
    client: Client,
    config: RemoteProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: RemoteProviderConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    fn authorise(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let key = require_key(self.config.api_key.as_deref(), "OpenAI")?;
        let mut request = request.bearer_auth(key);
        if let Some(org) = self.config.org_id.as_deref() {
            request = request.header("OpenAI-Organization", org);
        }
        Ok(request)
    }

    async fn fetch_models(&self) -> Result<ModelCatalog> {
        let request = self.authorise(self.client.get(self.url("/v1/models")))?;
        let response = ensure_success(request.send().await?).await?;
        let body: Value = response.json().await?;
        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow!("model list response has no data array"))?;

        let catalog = data
            .iter()
            .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
            .filter(|id| id.starts_with("gpt-4") || id.starts_with("gpt-3.5"))
            .map(|id| (id.to_string(), display_name(id)))
            .collect();
        Ok(catalog)
    }

    async fn chat(&self, prompt: &str, model_id: &str) -> Result<String> {
        let payload = serde_json::json!({
            "model": model_id,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.config.temperature.unwrap_or(0.7),
            "max_tokens": self.config.max_tokens.unwrap_or(500),
        });
        let request = self.authorise(self.client.post(self.url("/v1/chat/completions")))?;
        let response = ensure_success(request.json(&payload).send().await?).await?;
        let body: Value = response.json().await?;
        body.get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(|val| val.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("response did not contain choices[0].message.content"))
    }
}

fn display_name(id: &str) -> String {
    if id == "gpt-4-1106-preview" {
        "GPT-4 Turbo".to_string()
    } else if id.starts_with("gpt-4") {
        "GPT-4".to_string()
    } else if id.starts_with("gpt-3.5") {
        "GPT-3.5 Turbo".to_string()
    } else {
        id.to_string()
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    async fn list_models(&self) -> ModelCatalog {
        match self.fetch_models().await {
            Ok(catalog) if !catalog.is_empty() => catalog,
            Ok(_) => {
                log::warn!("OpenAI model list had no GPT models, using defaults");
                catalog_from(DEFAULT_CATALOG)
            }
            Err(err) => {
                log::warn!("Error fetching OpenAI models, using defaults: {err:#}");
                catalog_from(DEFAULT_CATALOG)
            }
        }
    }

    async fn generate(&self, prompt: &str, model_id: &str) -> GenerationResult {
        let model_id = if model_id.is_empty() { DEFAULT_MODEL } else { model_id };
        match self
            .chat(prompt, model_id)
            .await
            .context("OpenAI request failed")
        {
            Ok(text) => GenerationResult::success(model_id, text),
            Err(err) => {
                log::error!("OpenAI error for model {model_id}: {err:#}");
                GenerationResult::failure(model_id, &err)
            }
        }
    }
}
