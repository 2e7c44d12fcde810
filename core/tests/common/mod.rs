#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use llmfight_core::api::v1::ApiState;
use llmfight_core::db::init_memory_db;
use llmfight_core::providers::{GenerationResult, ModelCatalog, ModelProvider};
use llmfight_core::registry::ProviderRegistry;
use tokio::sync::Barrier;

/// Provider that answers with a canned string, or fails like a broken network.
pub struct FakeProvider {
    id: &'static str,
    failing: bool,
    calls: AtomicUsize,
    gate: Option<Arc<Barrier>>,
}

impl FakeProvider {
    pub fn ok(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            failing: false,
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    /// Answers only after every provider sharing `gate` has been called.
    pub fn gated(id: &'static str, gate: Arc<Barrier>) -> Arc<Self> {
        Arc::new(Self {
            id,
            failing: false,
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    pub fn failing(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            failing: true,
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for FakeProvider {
    fn id(&self) -> &str {
        self.id
    }

    async fn list_models(&self) -> ModelCatalog {
        ModelCatalog::from([(format!("{}-large", self.id), format!("{} Large", self.id))])
    }

    async fn generate(&self, prompt: &str, model_id: &str) -> GenerationResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.wait().await;
        }
        if self.failing {
            GenerationResult::failure(model_id, &anyhow!("connection reset by peer"))
        } else {
            GenerationResult::success(model_id, format!("{} answer #{call} to: {prompt}", self.id))
        }
    }
}

pub fn state_with(providers: Vec<Arc<FakeProvider>>) -> ApiState {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    ApiState::new(init_memory_db().expect("in-memory db"), registry)
}
