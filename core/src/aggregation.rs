//! Rebuilds the "one prompt, many providers" comparison view from the flat
//! record log and applies preference updates.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{FightError, FightResult};
use crate::logging::{spawn_event, EventRecord};
use crate::store::{ConversationStore, ConversationSummary, GenerationRecord};

/// The answer one provider gave to a prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub record_id: i64,
    pub model: String,
    pub response_text: String,
}

/// All providers' answers to one prompt within a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptGroup {
    pub prompt: String,
    /// `created_at` of the group's first record.
    pub timestamp: i64,
    pub preferred_provider_id: Option<String>,
    pub responses: BTreeMap<String, ProviderResponse>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub groups: Vec<PromptGroup>,
}

/// A group whose records disagree on `preferred_provider_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupingAnomaly {
    pub prompt: String,
    pub values: Vec<Option<String>>,
    pub resolved: Option<String>,
}

struct GroupBuilder {
    group: PromptGroup,
    preferences: Vec<Option<String>>,
}

/// Partition chronologically ordered records by prompt.
///
/// Groups keep the order in which their prompt first appears. Within a group
/// the last record per provider wins, so a retry replaces the earlier answer.
/// Preference is taken from the latest record that has one; disagreement
/// between siblings is returned as an anomaly rather than failing the read.
pub fn group_records(records: &[GenerationRecord]) -> (Vec<PromptGroup>, Vec<GroupingAnomaly>) {
    let mut builders: Vec<GroupBuilder> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let slot = *index.entry(record.prompt.as_str()).or_insert_with(|| {
            builders.push(GroupBuilder {
                group: PromptGroup {
                    prompt: record.prompt.clone(),
                    timestamp: record.created_at,
                    preferred_provider_id: None,
                    responses: BTreeMap::new(),
                },
                preferences: Vec::new(),
            });
            builders.len() - 1
        });
        let builder = &mut builders[slot];
        builder.group.responses.insert(
            record.provider_id.clone(),
            ProviderResponse {
                record_id: record.id,
                model: record.model_name.clone(),
                response_text: record.response_text.clone(),
            },
        );
        if record.preferred_provider_id.is_some() {
            builder.group.preferred_provider_id = record.preferred_provider_id.clone();
        }
        builder.preferences.push(record.preferred_provider_id.clone());
    }

    let mut anomalies = Vec::new();
    let groups = builders
        .into_iter()
        .map(|mut builder| {
            builder.preferences.sort();
            builder.preferences.dedup();
            if builder.preferences.len() > 1 {
                anomalies.push(GroupingAnomaly {
                    prompt: builder.group.prompt.clone(),
                    values: builder.preferences,
                    resolved: builder.group.preferred_provider_id.clone(),
                });
            }
            builder.group
        })
        .collect();
    (groups, anomalies)
}

#[derive(Clone)]
pub struct AggregationEngine {
    store: ConversationStore,
}

impl AggregationEngine {
    pub fn new(store: ConversationStore) -> Self {
        Self { store }
    }

    pub async fn list_conversations(&self) -> FightResult<Vec<ConversationSummary>> {
        self.store.list_conversations().await
    }

    /// Grouped view of one conversation. Unknown ids give an empty view.
    pub async fn conversation(&self, conversation_id: &str) -> FightResult<ConversationView> {
        let records = self.store.list_records(conversation_id).await?;
        let (groups, anomalies) = group_records(&records);
        for anomaly in anomalies {
            self.report_anomaly(conversation_id, anomaly);
        }
        Ok(ConversationView {
            conversation_id: conversation_id.to_string(),
            groups,
        })
    }

    /// Mark `provider_id` as the preferred answer for `prompt`. Reapplying the
    /// same preference succeeds and changes nothing.
    pub async fn set_preference(
        &self,
        conversation_id: &str,
        prompt: &str,
        provider_id: &str,
    ) -> FightResult<usize> {
        if provider_id.trim().is_empty() {
            return Err(FightError::InvalidRequest(
                "preferred provider id must not be empty".into(),
            ));
        }
        let updated = self
            .store
            .update_preference(conversation_id, prompt, provider_id)
            .await?;
        if updated == 0 {
            return Err(FightError::GroupNotFound {
                conversation_id: conversation_id.to_string(),
                prompt: prompt.to_string(),
            });
        }
        log::info!(
            "preferred provider for conversation {conversation_id} set to {provider_id} ({updated} records)"
        );
        Ok(updated)
    }

    /// Record-addressed form: the conversation is taken from `record_id`.
    pub async fn set_preference_for_record(
        &self,
        record_id: i64,
        prompt: &str,
        provider_id: &str,
    ) -> FightResult<usize> {
        let record = self
            .store
            .get_record(record_id)
            .await?
            .ok_or(FightError::RecordNotFound { id: record_id })?;
        self.set_preference(&record.conversation_id, prompt, provider_id)
            .await
    }

    fn report_anomaly(&self, conversation_id: &str, anomaly: GroupingAnomaly) {
        log::warn!(
            "records for prompt {:?} in conversation {conversation_id} disagree on preferred provider {:?}; using {:?}",
            anomaly.prompt,
            anomaly.values,
            anomaly.resolved
        );
        spawn_event(
            &self.store.pool(),
            EventRecord {
                level: "warn",
                code: "AGG-0409",
                module: "aggregation",
                message: "Preferred provider disagreement inside a prompt group".into(),
                explain: Some("The most recently set value was used"),
                data: Some(json!({
                    "conversation_id": conversation_id,
                    "prompt": anomaly.prompt,
                    "values": anomaly.values,
                    "resolved": anomaly.resolved,
                })),
            },
        );
    }
}
