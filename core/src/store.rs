//! Append-only log of generation records.
//!
//! One row per (prompt, provider) attempt. Rows are never edited except for
//! `preferred_provider_id`, which is written to every sibling of a
//! `(conversation_id, prompt)` group at once. `created_at` is unix
//! milliseconds; `id` breaks ties so ordering always matches insertion order.

use anyhow::anyhow;
use r2d2_sqlite::rusqlite::{self, params, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::spawn_blocking;

use crate::db::DbPool;
use crate::errors::{FightError, FightResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: i64,
    pub conversation_id: String,
    pub prompt: String,
    pub provider_id: String,
    pub model_name: String,
    pub response_text: String,
    pub preferred_provider_id: Option<String>,
    pub created_at: i64,
}

/// Values for a record that has not been stored yet.
#[derive(Clone, Debug)]
pub struct NewGenerationRecord {
    pub conversation_id: String,
    pub prompt: String,
    pub provider_id: String,
    pub model_name: String,
    pub response_text: String,
    /// Assigned at insert time when absent.
    pub created_at: Option<i64>,
}

/// One row of the conversation list: the earliest prompt of each conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub initial_prompt: String,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct ConversationStore {
    pool: DbPool,
}

impl ConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    /// Append a record and return its id.
    pub async fn insert(&self, record: NewGenerationRecord) -> FightResult<i64> {
        let target = format!(
            "conversation={} provider={}",
            record.conversation_id, record.provider_id
        );
        self.run("insert", target, move |conn| insert_record(conn, &record))
            .await
    }

    pub async fn get_record(&self, id: i64) -> FightResult<Option<GenerationRecord>> {
        self.run("get_record", format!("record={id}"), move |conn| {
            fetch_record(conn, id)
        })
        .await
    }

    /// Newest conversation first.
    pub async fn list_conversations(&self) -> FightResult<Vec<ConversationSummary>> {
        self.run("list_conversations", "all", list_conversations).await
    }

    /// Every record of one conversation, oldest first.
    pub async fn list_records(&self, conversation_id: &str) -> FightResult<Vec<GenerationRecord>> {
        let id = conversation_id.to_string();
        self.run(
            "list_records",
            format!("conversation={conversation_id}"),
            move |conn| list_records(conn, &id),
        )
        .await
    }

    /// Set the preferred provider on every record of the group. Returns the
    /// number of rows matched, which is zero when the group does not exist.
    pub async fn update_preference(
        &self,
        conversation_id: &str,
        prompt: &str,
        provider_id: &str,
    ) -> FightResult<usize> {
        let (conversation, prompt_owned, provider) = (
            conversation_id.to_string(),
            prompt.to_string(),
            provider_id.to_string(),
        );
        self.run(
            "update_preference",
            format!("conversation={conversation_id} provider={provider_id}"),
            move |conn| update_preference(conn, &conversation, &prompt_owned, &provider),
        )
        .await
    }

    /// Delete every record together with the event log that describes them.
    /// Returns how many records were removed.
    pub async fn clear_all(&self) -> FightResult<usize> {
        self.run("clear_all", "all", |conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute("DELETE FROM generations", [])?;
            tx.execute("DELETE FROM event_log", [])?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn run<T, F>(
        &self,
        operation: &'static str,
        target: impl Into<String>,
        work: F,
    ) -> FightResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let target = target.into();
        let pool = self.pool.clone();
        let outcome = spawn_blocking(move || {
            let conn = pool.get()?;
            work(&conn).map_err(anyhow::Error::from)
        })
        .await
        .map_err(|err| anyhow!(err.to_string()))
        .and_then(|inner| inner);
        outcome.map_err(|err| {
            log::error!("store {operation} failed ({target}): {err:#}");
            FightError::persistence(operation, target, err)
        })
    }
}

pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn insert_record(conn: &rusqlite::Connection, record: &NewGenerationRecord) -> rusqlite::Result<i64> {
    let created_at = record.created_at.unwrap_or_else(now_millis);
    // A retry joins a group that may already carry a preference; copy it in
    // the same statement so siblings keep agreeing.
    conn.execute(
        "INSERT INTO generations (conversation_id, prompt, provider_id, model_name, response_text, preferred_provider_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5,
                 (SELECT g.preferred_provider_id FROM generations g
                   WHERE g.conversation_id = ?1 AND g.prompt = ?2 AND g.preferred_provider_id IS NOT NULL
                   ORDER BY g.created_at DESC, g.id DESC LIMIT 1),
                 ?6)",
        params![
            record.conversation_id,
            record.prompt,
            record.provider_id,
            record.model_name,
            record.response_text,
            created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRecord> {
    Ok(GenerationRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        prompt: row.get(2)?,
        provider_id: row.get(3)?,
        model_name: row.get(4)?,
        response_text: row.get(5)?,
        preferred_provider_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const RECORD_COLUMNS: &str = "id, conversation_id, prompt, provider_id, model_name, response_text, preferred_provider_id, created_at";

fn fetch_record(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<GenerationRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM generations WHERE id = ?1"),
        params![id],
        row_to_record,
    )
    .optional()
}

fn list_conversations(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<ConversationSummary>> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, prompt, created_at FROM (
             SELECT conversation_id, prompt, created_at, id,
                    ROW_NUMBER() OVER (PARTITION BY conversation_id ORDER BY created_at ASC, id ASC) AS rn
             FROM generations
         )
         WHERE rn = 1
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ConversationSummary {
            conversation_id: row.get(0)?,
            initial_prompt: row.get(1)?,
            created_at: row.get(2)?,
        })
    })?;
    let mut conversations = Vec::new();
    for row in rows {
        conversations.push(row?);
    }
    Ok(conversations)
}

fn list_records(
    conn: &rusqlite::Connection,
    conversation_id: &str,
) -> rusqlite::Result<Vec<GenerationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM generations WHERE conversation_id = ?1 ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([conversation_id], row_to_record)?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

fn update_preference(
    conn: &rusqlite::Connection,
    conversation_id: &str,
    prompt: &str,
    provider_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE generations SET preferred_provider_id = ?3 WHERE conversation_id = ?1 AND prompt = ?2",
        params![conversation_id, prompt, provider_id],
    )
}
