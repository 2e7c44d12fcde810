//! Locally hosted model provider.
//!
//! The model has to be loaded once before it can serve. The load is guarded
//! by a [`OnceCell`]: concurrent first requests share a single load, and a
//! failed load leaves the cell empty so the next request tries again.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::{build_client, ensure_success, GenerationResult, ModelCatalog, ModelProvider};
use crate::config::LocalProviderConfig;

pub const PROVIDER_ID: &str = "llama";

/// Handle describing a model that the runtime has loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    pub name: String,
}

/// Inference backend for a model running on this machine.
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    async fn catalog(&self, config: &LocalProviderConfig) -> Result<ModelCatalog>;

    async fn load(&self, config: &LocalProviderConfig) -> Result<LoadedModel>;

    async fn complete(
        &self,
        model: &LoadedModel,
        prompt: &str,
        config: &LocalProviderConfig,
    ) -> Result<String>;
}

pub struct LocalModelProvider {
    runtime: Arc<dyn LocalRuntime>,
    config: LocalProviderConfig,
    model: OnceCell<LoadedModel>,
}

impl LocalModelProvider {
    pub fn new(runtime: Arc<dyn LocalRuntime>, config: LocalProviderConfig) -> Self {
        Self {
            runtime,
            config,
            model: OnceCell::new(),
        }
    }

    /// Provider backed by an Ollama-compatible server at `config.endpoint`.
    pub fn ollama(config: LocalProviderConfig) -> Result<Self> {
        let runtime = OllamaRuntime::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::new(Arc::new(runtime), config))
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn ensure_loaded(&self) -> Result<&LoadedModel> {
        self.model
            .get_or_try_init(|| async {
                log::info!("loading local model {}", self.config.model_name);
                let loaded = self.runtime.load(&self.config).await?;
                log::info!("local model {} ready", loaded.name);
                Ok::<_, anyhow::Error>(loaded)
            })
            .await
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        let model = self
            .ensure_loaded()
            .await
            .context("local model failed to initialise")?;
        self.runtime.complete(model, prompt, &self.config).await
    }
}

#[async_trait]
impl ModelProvider for LocalModelProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    /// Only the configured model is offered; it is the one `generate` runs,
    /// whatever else the server has installed.
    async fn list_models(&self) -> ModelCatalog {
        let name = &self.config.model_name;
        match self.runtime.catalog(&self.config).await {
            Ok(mut catalog) => match catalog.remove_entry(name) {
                Some(entry) => ModelCatalog::from([entry]),
                None => {
                    log::warn!("local server does not list {name}; it will be pulled on first use");
                    self.default_catalog()
                }
            },
            Err(err) => {
                log::warn!("Error fetching local models, using configured model: {err:#}");
                self.default_catalog()
            }
        }
    }

    async fn generate(&self, prompt: &str, model_id: &str) -> GenerationResult {
        let model = &self.config.model_name;
        if !model_id.is_empty() && model_id != model.as_str() {
            log::debug!("local provider serves {model}; ignoring requested model {model_id}");
        }
        match self.run(prompt).await {
            Ok(text) => GenerationResult::success(model.clone(), text),
            Err(err) => {
                log::error!("local model error: {err:#}");
                GenerationResult::failure(model.clone(), &err)
            }
        }
    }
}

impl LocalModelProvider {
    fn default_catalog(&self) -> ModelCatalog {
        ModelCatalog::from([(
            self.config.model_name.clone(),
            self.config.model_name.clone(),
        )])
    }
}

/// Talks to an Ollama-style HTTP server running next to the process.
pub struct OllamaRuntime {
    client: Client,
}

impl OllamaRuntime {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }

    fn url(config: &LocalProviderConfig, path: &str) -> String {
        format!("{}{}", config.endpoint.trim_end_matches('/'), path)
    }

    fn options(config: &LocalProviderConfig) -> Value {
        serde_json::json!({
            "num_ctx": config.context_size,
            "num_batch": config.batch_size,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "num_predict": config.max_tokens,
            "stop": config.stop,
        })
    }
}

#[async_trait]
impl LocalRuntime for OllamaRuntime {
    async fn catalog(&self, config: &LocalProviderConfig) -> Result<ModelCatalog> {
        let response = self
            .client
            .get(Self::url(config, "/api/tags"))
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        let models = body
            .get("models")
            .and_then(|m| m.as_array())
            .ok_or_else(|| anyhow!("tag list response has no models array"))?;
        Ok(models
            .iter()
            .filter_map(|m| m.get("name").and_then(|n| n.as_str()))
            .map(|name| (name.to_string(), name.to_string()))
            .collect())
    }

    async fn load(&self, config: &LocalProviderConfig) -> Result<LoadedModel> {
        if let Some(path) = config.model_path.as_deref() {
            if !Path::new(path).exists() {
                return Err(anyhow!("model weights not found at {path}"));
            }
        }
        // A generate call without a prompt makes the server load the model.
        let payload = serde_json::json!({
            "model": config.model_name,
            "stream": false,
            "options": Self::options(config),
        });
        let response = self
            .client
            .post(Self::url(config, "/api/generate"))
            .json(&payload)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(LoadedModel {
            name: config.model_name.clone(),
        })
    }

    async fn complete(
        &self,
        model: &LoadedModel,
        prompt: &str,
        config: &LocalProviderConfig,
    ) -> Result<String> {
        let payload = serde_json::json!({
            "model": model.name,
            "prompt": prompt,
            "stream": false,
            "options": Self::options(config),
        });
        let response = self
            .client
            .post(Self::url(config, "/api/generate"))
            .json(&payload)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        body.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Model did not give a response"))
    }
}
