//! Version 1 of the application API.
//!
//! Handlers are thin: they validate input, delegate to the orchestrator or
//! the aggregation engine, and return JSON-friendly payloads. Any transport
//! (HTTP, IPC, the bundled CLI) can sit on top of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::aggregation::{AggregationEngine, ConversationView};
use crate::db::DbPool;
use crate::errors::FightError;
use crate::logging::{spawn_event, EventRecord};
use crate::orchestrator::{GenerateOutcome, GenerateRequest, Orchestrator, ProviderTarget};
use crate::providers::ModelCatalog;
use crate::registry::ProviderRegistry;
use crate::store::{ConversationStore, ConversationSummary};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub db: DbPool,
    pub store: ConversationStore,
    pub orchestrator: Arc<Orchestrator>,
    pub aggregation: AggregationEngine,
}

impl ApiState {
    pub fn new(db: DbPool, registry: ProviderRegistry) -> Self {
        let store = ConversationStore::new(db.clone());
        Self {
            orchestrator: Orchestrator::new(Arc::new(registry), store.clone()),
            aggregation: AggregationEngine::new(store.clone()),
            store,
            db,
        }
    }
}

/// Error payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub explain: String,
}

impl From<FightError> for ApiError {
    fn from(err: FightError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            explain: err.explain().to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn ping() -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "ts": OffsetDateTime::now_utc().unix_timestamp(),
    })
}

/// Provider id → (model id → display name).
pub async fn list_models(state: &ApiState) -> BTreeMap<String, ModelCatalog> {
    state.orchestrator.registry().list_all_models().await
}

pub async fn list_conversations(state: &ApiState) -> ApiResult<Vec<ConversationSummary>> {
    Ok(state.aggregation.list_conversations().await?)
}

pub async fn get_conversation(state: &ApiState, conversation_id: &str) -> ApiResult<ConversationView> {
    Ok(state.aggregation.conversation(conversation_id).await?)
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInput {
    pub prompt: String,
    pub conversation_id: Option<String>,
    pub provider_id: String,
    #[serde(default)]
    pub model_id: String,
}

pub async fn generate(state: &ApiState, input: GenerateInput) -> ApiResult<GenerateOutcome> {
    require_prompt(&input.prompt)?;
    let outcome = state
        .orchestrator
        .handle_generate(GenerateRequest {
            prompt: input.prompt,
            conversation_id: input.conversation_id,
            provider_id: input.provider_id,
            model_id: input.model_id,
        })
        .await?;
    Ok(outcome)
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompareInput {
    pub prompt: String,
    pub conversation_id: Option<String>,
    pub targets: Vec<ProviderTarget>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareEntryView {
    pub provider_id: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GenerateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareView {
    pub conversation_id: String,
    pub entries: Vec<CompareEntryView>,
}

pub async fn compare(state: &ApiState, input: CompareInput) -> ApiResult<CompareView> {
    require_prompt(&input.prompt)?;
    let outcome = state
        .orchestrator
        .handle_compare(&input.prompt, input.conversation_id.as_deref(), input.targets)
        .await?;
    Ok(CompareView {
        conversation_id: outcome.conversation_id,
        entries: outcome
            .entries
            .into_iter()
            .map(|entry| {
                let (outcome, error) = match entry.outcome {
                    Ok(outcome) => (Some(outcome), None),
                    Err(err) => (None, Some(ApiError::from(err))),
                };
                CompareEntryView {
                    provider_id: entry.target.provider_id,
                    model_id: entry.target.model_id,
                    outcome,
                    error,
                }
            })
            .collect(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPreferredInput {
    pub conversation_id: String,
    pub prompt: String,
    pub preferred_provider_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferredUpdated {
    pub conversation_id: Option<String>,
    pub record_id: Option<i64>,
    pub prompt: String,
    pub preferred_provider_id: String,
    pub changes: usize,
}

pub async fn set_preferred(state: &ApiState, input: SetPreferredInput) -> ApiResult<PreferredUpdated> {
    let changes = state
        .aggregation
        .set_preference(&input.conversation_id, &input.prompt, &input.preferred_provider_id)
        .await?;
    Ok(PreferredUpdated {
        conversation_id: Some(input.conversation_id),
        record_id: None,
        prompt: input.prompt,
        preferred_provider_id: input.preferred_provider_id,
        changes,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetPreferredForRecordInput {
    pub record_id: i64,
    pub prompt: String,
    pub preferred_provider_id: String,
}

pub async fn set_preferred_for_record(
    state: &ApiState,
    input: SetPreferredForRecordInput,
) -> ApiResult<PreferredUpdated> {
    let changes = state
        .aggregation
        .set_preference_for_record(input.record_id, &input.prompt, &input.preferred_provider_id)
        .await?;
    Ok(PreferredUpdated {
        conversation_id: None,
        record_id: Some(input.record_id),
        prompt: input.prompt,
        preferred_provider_id: input.preferred_provider_id,
        changes,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Cleared {
    pub message: String,
    pub removed: usize,
}

/// Remove every stored record.
pub async fn clear_conversations(state: &ApiState) -> ApiResult<Cleared> {
    let removed = state.store.clear_all().await?;
    log::info!("cleared {removed} generation records");
    spawn_event(
        &state.db,
        EventRecord {
            level: "info",
            code: "DB-0300",
            module: "store",
            message: "Successfully cleared all conversations".into(),
            explain: None,
            data: Some(serde_json::json!({ "removed": removed })),
        },
    );
    Ok(Cleared {
        message: "All conversations cleared successfully".into(),
        removed,
    })
}

fn require_prompt(prompt: &str) -> Result<(), ApiError> {
    if prompt.trim().is_empty() {
        return Err(FightError::InvalidRequest("prompt must not be empty".into()).into());
    }
    Ok(())
}
