use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;

use crate::config::FightConfig;
use crate::errors::{FightError, FightResult};
use crate::providers::{
    AnthropicProvider, LocalModelProvider, ModelCatalog, ModelProvider, OpenAiProvider,
};

/// Owns one adapter per provider id. Built once at start-up and shared
/// behind an `Arc`; adapters are never swapped afterwards.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the two hosted vendors and the local model from config.
    pub fn from_config(config: &FightConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiProvider::new(config.openai.clone())?));
        registry.register(Arc::new(AnthropicProvider::new(config.anthropic.clone())?));
        registry.register(Arc::new(LocalModelProvider::ollama(config.local.clone())?));
        Ok(registry)
    }

    /// Add an adapter under its own id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            log::warn!("provider {id} registered twice; keeping the latest");
        }
    }

    pub fn get(&self, provider_id: &str) -> FightResult<Arc<dyn ModelProvider>> {
        self.providers
            .get(provider_id)
            .cloned()
            .ok_or_else(|| FightError::UnknownProvider {
                provider_id: provider_id.to_string(),
            })
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Ask every adapter for its catalogue at once and merge by provider id.
    /// Adapters fall back to built-in catalogues, so one slow or broken
    /// vendor only delays its own entry.
    pub async fn list_all_models(&self) -> BTreeMap<String, ModelCatalog> {
        let lookups = self.providers.iter().map(|(id, provider)| async move {
            let catalog = provider.list_models().await;
            (id.clone(), catalog)
        });
        join_all(lookups).await.into_iter().collect()
    }
}
