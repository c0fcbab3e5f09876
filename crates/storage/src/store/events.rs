#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError};
use fv_core::ids::UserId;
use rusqlite::{Transaction, params};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRow {
    pub seq: i64,
    pub ts_ms: i64,
    pub entity_id: Option<String>,
    pub event_type: String,
    pub payload_json: String,
}

impl EventRow {
    pub fn event_id(&self) -> String {
        format!("evt_{:016}", self.seq)
    }
}

impl SqliteStore {
    /// Audit tail for one user, oldest first. `since_event_id` is
    /// exclusive and must look like `evt_<seq>`.
    pub fn list_events(
        &self,
        user: &UserId,
        since_event_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventRow>, StoreError> {
        let since_seq = match since_event_id {
            None => 0i64,
            Some(event_id) => parse_event_id(event_id)
                .ok_or(StoreError::InvalidInput("since must be like evt_<16-digit-seq>"))?,
        };
        let limit = super::to_sqlite_i64(limit)?;

        let mut stmt = self.conn().prepare(
            r#"
            SELECT seq, ts_ms, entity_id, type, payload_json
            FROM events
            WHERE user = ?1 AND seq > ?2
            ORDER BY seq ASC
            LIMIT ?3
            "#,
        )?;
        let rows = stmt.query_map(params![user.as_str(), since_seq, limit], |row| {
            Ok(EventRow {
                seq: row.get(0)?,
                ts_ms: row.get(1)?,
                entity_id: row.get(2)?,
                event_type: row.get(3)?,
                payload_json: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

pub(crate) fn insert_event_tx(
    tx: &Transaction<'_>,
    user: &UserId,
    ts_ms: i64,
    entity_id: Option<&str>,
    event_type: &str,
    payload: serde_json::Value,
) -> Result<EventRow, StoreError> {
    let payload_json = payload.to_string();
    tx.execute(
        r#"
        INSERT INTO events(user, ts_ms, entity_id, type, payload_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![user.as_str(), ts_ms, entity_id, event_type, payload_json],
    )?;
    let seq = tx.last_insert_rowid();
    Ok(EventRow {
        seq,
        ts_ms,
        entity_id: entity_id.map(str::to_string),
        event_type: event_type.to_string(),
        payload_json,
    })
}

fn parse_event_id(event_id: &str) -> Option<i64> {
    let digits = event_id.strip_prefix("evt_")?;
    digits.parse::<i64>().ok()
}
