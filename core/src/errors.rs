use thiserror::Error;

#[derive(Debug, Error)]
pub enum FightError {
    #[error("Unknown provider: {provider_id}")]
    UnknownProvider { provider_id: String },
    #[error("Storage failure during {operation} ({target}): {source}")]
    Persistence {
        operation: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("No prompt {prompt:?} in conversation {conversation_id}")]
    GroupNotFound {
        conversation_id: String,
        prompt: String,
    },
    #[error("Generation record {id} not found")]
    RecordNotFound { id: i64 },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type FightResult<T> = Result<T, FightError>;

impl FightError {
    /// Wrap a storage error with the operation and the ids it touched.
    pub fn persistence(
        operation: &'static str,
        target: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Persistence {
            operation,
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => "PRV-1001",
            Self::Persistence { .. } => "DB-1001",
            Self::GroupNotFound { .. } => "AGG-1404",
            Self::RecordNotFound { .. } => "GEN-1404",
            Self::InvalidRequest(_) => "REQ-1000",
            Self::Config(_) => "CFG-1000",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::UnknownProvider { .. } => {
                "The requested provider is not registered; no generation was attempted."
            }
            Self::Persistence { .. } => {
                "The SQLite store could not complete the operation; no partial record was kept, so it is safe to retry."
            }
            Self::GroupNotFound { .. } => {
                "The conversation has no record for this prompt, so there is nothing to mark as preferred."
            }
            Self::RecordNotFound { .. } => "No generation record exists for the requested ID.",
            Self::InvalidRequest(_) => "The request was rejected before any work was done.",
            Self::Config(_) => "The provider configuration could not be loaded.",
        }
    }
}
