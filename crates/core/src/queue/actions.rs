//! SQLite implementation of [`ActionStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::{ActionStore, ActionType, NewAction, QueuedAction};
use crate::Error;
use crate::cache::CacheDb;

/// (id, raffle_id, action_type, params_json, enqueued_at)
type ActionRow = (i64, String, String, String, String);

fn parse_row(
    id: i64, raffle_id: String, action_type: String, params_json: String, enqueued_at: String,
) -> Result<QueuedAction, Error> {
    let action_type: ActionType = action_type.parse()?;
    let params: serde_json::Value = serde_json::from_str(&params_json)?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map_err(|e| Error::Serialization(format!("bad enqueued_at {enqueued_at:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(QueuedAction { id, raffle_id, action_type, params, enqueued_at })
}

#[async_trait]
impl ActionStore for CacheDb {
    async fn enqueue(&self, action: NewAction) -> Result<QueuedAction, Error> {
        action.validate()?;
        let params_json = serde_json::to_string(&action.params)?;
        let enqueued_at = Utc::now();
        let stamp = enqueued_at.to_rfc3339();
        let raffle_id = action.raffle_id.clone();
        let action_type = action.action_type.as_str().to_string();

        let id = self
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO queued_actions (raffle_id, action_type, params_json, enqueued_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![raffle_id, action_type, params_json, stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(id, raffle_id = %action.raffle_id, action = %action.action_type, "queued offline action");

        Ok(QueuedAction {
            id,
            raffle_id: action.raffle_id,
            action_type: action.action_type,
            params: action.params,
            enqueued_at,
        })
    }

    async fn pending(&self) -> Result<Vec<QueuedAction>, Error> {
        let rows = self
            .conn
            .call(|conn| -> Result<Vec<ActionRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, raffle_id, action_type, params_json, enqueued_at
                     FROM queued_actions ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| -> rusqlite::Result<ActionRow> {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Error::from)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(id, raffle_id, action_type, params_json, enqueued_at)| {
                parse_row(id, raffle_id, action_type, params_json, enqueued_at)
            })
            .collect()
    }

    async fn remove(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM queued_actions WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
