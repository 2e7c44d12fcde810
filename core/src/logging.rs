//! Diagnostic events persisted to the `event_log` table.
//!
//! Console output goes through the `log` facade; events here are the
//! durable subset (generation outcomes, clears, grouping anomalies).
//! Clearing the conversation store empties this table as well, so it never
//! outlives the records it describes.

use r2d2_sqlite::rusqlite::{self, params, Connection};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::DbPool;

/// One row of `event_log`, owned so it can be moved onto a blocking thread.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub level: &'static str,
    pub code: &'static str,
    pub module: &'static str,
    pub message: String,
    pub explain: Option<&'static str>,
    pub data: Option<Value>,
}

pub fn write_event(conn: &Connection, event: &EventRecord) -> rusqlite::Result<usize> {
    let data = event.data.as_ref().map(Value::to_string);
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, message, explain, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            Uuid::new_v4().to_string(),
            OffsetDateTime::now_utc().unix_timestamp(),
            event.level,
            event.code,
            event.module,
            event.message,
            event.explain,
            data,
        ],
    )
}

/// Fire-and-forget write to `event_log`. Failures are reported through `log`
/// and never reach the caller.
pub fn spawn_event(pool: &DbPool, event: EventRecord) {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let result = pool
            .get()
            .map_err(anyhow::Error::from)
            .and_then(|conn| write_event(&conn, &event).map_err(anyhow::Error::from));
        if let Err(err) = result {
            log::debug!("event_log write for {} dropped: {err}", event.code);
        }
    });
}
