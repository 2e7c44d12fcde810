//! Runs a prompt against a provider and persists the outcome.
//!
//! The only rejection that happens before a provider is called is an unknown
//! provider id. Everything else produces exactly one stored record, whether
//! the provider answered or returned an embedded error.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::errors::{FightError, FightResult};
use crate::logging::{spawn_event, EventRecord};
use crate::providers::{GenerationResult, ModelProvider};
use crate::registry::ProviderRegistry;
use crate::store::{ConversationStore, NewGenerationRecord};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Absent on the first prompt of a new conversation.
    pub conversation_id: Option<String>,
    pub provider_id: String,
    pub model_id: String,
}

/// A provider/model pair to ask.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTarget {
    pub provider_id: String,
    #[serde(default)]
    pub model_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateOutcome {
    pub record_id: i64,
    pub conversation_id: String,
    pub provider_id: String,
    pub result: GenerationResult,
}

/// Per-target result of a comparison. A store failure for one target is
/// reported here without cancelling the others.
#[derive(Debug)]
pub struct CompareEntry {
    pub target: ProviderTarget,
    pub outcome: FightResult<GenerateOutcome>,
}

#[derive(Debug)]
pub struct CompareOutcome {
    pub conversation_id: String,
    pub entries: Vec<CompareEntry>,
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    store: ConversationStore,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, store: ConversationStore) -> Arc<Self> {
        Arc::new(Self { registry, store })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn handle_generate(&self, request: GenerateRequest) -> FightResult<GenerateOutcome> {
        let conversation_id = resolve_conversation_id(request.conversation_id.as_deref());
        let provider = self.registry.get(&request.provider_id)?;
        self.generate_with(
            provider.as_ref(),
            &request.prompt,
            conversation_id,
            &request.provider_id,
            &request.model_id,
        )
        .await
    }

    /// Ask several providers the same prompt at once under one conversation.
    /// Every provider id is checked before any of them is called.
    pub async fn handle_compare(
        &self,
        prompt: &str,
        conversation_id: Option<&str>,
        targets: Vec<ProviderTarget>,
    ) -> FightResult<CompareOutcome> {
        if targets.is_empty() {
            return Err(FightError::InvalidRequest(
                "at least one provider must be selected".into(),
            ));
        }
        let providers = targets
            .iter()
            .map(|target| self.registry.get(&target.provider_id))
            .collect::<FightResult<Vec<_>>>()?;
        let conversation_id = resolve_conversation_id(conversation_id);

        let runs = targets
            .iter()
            .zip(providers.iter())
            .map(|(target, provider)| {
                self.generate_with(
                    provider.as_ref(),
                    prompt,
                    conversation_id.clone(),
                    &target.provider_id,
                    &target.model_id,
                )
            });
        let outcomes = join_all(runs).await;

        Ok(CompareOutcome {
            conversation_id,
            entries: targets
                .into_iter()
                .zip(outcomes)
                .map(|(target, outcome)| CompareEntry { target, outcome })
                .collect(),
        })
    }

    async fn generate_with(
        &self,
        provider: &dyn ModelProvider,
        prompt: &str,
        conversation_id: String,
        provider_id: &str,
        model_id: &str,
    ) -> FightResult<GenerateOutcome> {
        let result = provider.generate(prompt, model_id).await;

        let record_id = self
            .store
            .insert(NewGenerationRecord {
                conversation_id: conversation_id.clone(),
                prompt: prompt.to_string(),
                provider_id: provider_id.to_string(),
                model_name: result.model.clone(),
                response_text: result.response_text.clone(),
                created_at: None,
            })
            .await?;

        self.record_event(record_id, &conversation_id, provider_id, &result);

        Ok(GenerateOutcome {
            record_id,
            conversation_id,
            provider_id: provider_id.to_string(),
            result,
        })
    }

    fn record_event(
        &self,
        record_id: i64,
        conversation_id: &str,
        provider_id: &str,
        result: &GenerationResult,
    ) {
        let (level, code, message) = if result.is_error {
            log::warn!(
                "provider {provider_id} returned an error for record {record_id}: {}",
                result.response_text
            );
            ("warn", "GEN-0201", "Provider call failed; error text stored")
        } else {
            log::info!("stored record {record_id} from {provider_id} ({})", result.model);
            ("info", "GEN-0200", "Generation stored")
        };
        let preview = result.response_text.chars().take(200).collect::<String>();
        spawn_event(
            &self.store.pool(),
            EventRecord {
                level,
                code,
                module: "orchestrator",
                message: message.to_string(),
                explain: None,
                data: Some(json!({
                    "record_id": record_id,
                    "conversation_id": conversation_id,
                    "provider": provider_id,
                    "model": result.model,
                    "preview": preview,
                })),
            },
        );
    }
}

/// Conversation ids are opaque: a supplied id is kept byte for byte.
fn resolve_conversation_id(existing: Option<&str>) -> String {
    match existing.filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => Uuid::new_v4().to_string(),
    }
}
