//! SQLite-backed [`Checkpointer`].
//!
//! ## Behavior
//!
//! - Serialization goes through the persisted shapes in
//!   [`runtime::persistence`](crate::runtime::persistence); this module is
//!   database I/O only.
//! - Stale-sequence detection and the checkpoint insert run in one
//!   transaction: the thread row denormalizes `last_seq`, the save compares
//!   it against `checkpoint.seq - 1` and aborts with
//!   [`CheckpointerError::StaleSequence`] on mismatch.
//! - With the `sqlite-migrations` feature (default) embedded migrations
//!   (`sqlx::migrate!("./migrations")`) run on connect; disabling the feature
//!   assumes external migration orchestration.
//!
//! ## Schema mapping
//!
//! - `threads.id` ← `checkpoint.thread_id`, `threads.last_seq` denormalized
//! - `checkpoints.state_json` ← serialized [`ConversationState`]
//! - `checkpoints.next_node` ← `NodeKind::encode()`
//! - `checkpoints.interrupt_json` ← serialized pending interrupt, NULL when
//!   the thread is not suspended

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::runtime::checkpoint::{
    Checkpoint, Checkpointer, CheckpointerError, PendingInterrupt, Result,
};
use crate::runtime::persistence::PersistedInterrupt;
use crate::state::ConversationState;
use crate::types::NodeKind;

/// Durable checkpointer over a SQLite connection pool.
pub struct SqliteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

fn backend(context: &str, err: impl std::fmt::Display) -> CheckpointerError {
    CheckpointerError::Backend {
        message: format!("{context}: {err}"),
    }
}

fn serde_err(context: &str, err: serde_json::Error) -> CheckpointerError {
    CheckpointerError::Serde {
        message: format!("{context}: {err}"),
    }
}

impl SqliteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `sqlite://campusflow.db?mode=rwc`.
    #[must_use = "checkpointer must be used to persist state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> std::result::Result<Self, CheckpointerError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| backend("connect", e))?;
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(backend("migration", e));
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Wrap an existing pool (shared with the campus store).
    #[must_use]
    pub fn from_pool(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    fn row_to_checkpoint(thread_id: &str, row: &SqliteRow) -> Result<Checkpoint> {
        let seq: i64 = row.get("seq");
        let state_json: String = row.get("state_json");
        let next_node: String = row.get("next_node");
        let interrupt_json: Option<String> = row.get("interrupt_json");
        let created_at_str: String = row.get("created_at");

        let state: ConversationState =
            serde_json::from_str(&state_json).map_err(|e| serde_err("state", e))?;
        let pending_interrupt = interrupt_json
            .map(|json| -> Result<PendingInterrupt> {
                let p: PersistedInterrupt =
                    serde_json::from_str(&json).map_err(|e| serde_err("interrupt", e))?;
                Ok(PendingInterrupt {
                    node: NodeKind::decode(&p.node),
                    payload: p.payload,
                })
            })
            .transpose()?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Checkpoint {
            thread_id: thread_id.to_string(),
            seq: seq as u64,
            state,
            next: NodeKind::decode(&next_node),
            pending_interrupt,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self, checkpoint), fields(thread_id = %checkpoint.thread_id, seq = checkpoint.seq), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let state_json =
            serde_json::to_string(&checkpoint.state).map_err(|e| serde_err("state", e))?;
        let interrupt_json = checkpoint
            .pending_interrupt
            .as_ref()
            .map(|i| {
                serde_json::to_string(&PersistedInterrupt {
                    node: i.node.encode(),
                    payload: i.payload.clone(),
                })
            })
            .transpose()
            .map_err(|e| serde_err("interrupt", e))?;

        let mut tx = self.pool.begin().await.map_err(|e| backend("tx begin", e))?;

        sqlx::query(r#"INSERT OR IGNORE INTO threads (id) VALUES (?1)"#)
            .bind(&checkpoint.thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| backend("insert thread", e))?;

        let last_seq: i64 = sqlx::query(r#"SELECT last_seq FROM threads WHERE id = ?1"#)
            .bind(&checkpoint.thread_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| backend("select last_seq", e))?
            .get("last_seq");

        if checkpoint.seq != (last_seq as u64) + 1 {
            return Err(CheckpointerError::StaleSequence {
                thread_id: checkpoint.thread_id,
                attempted: checkpoint.seq,
                latest: last_seq as u64,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO checkpoints (thread_id, seq, state_json, next_node, interrupt_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.seq as i64)
        .bind(&state_json)
        .bind(checkpoint.next.encode())
        .bind(&interrupt_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| backend("insert checkpoint", e))?;

        sqlx::query(
            r#"
            UPDATE threads
            SET last_seq = ?2, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?1
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.seq as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| backend("update thread", e))?;

        tx.commit().await.map_err(|e| backend("tx commit", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row_opt: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT seq, state_json, next_node, interrupt_json, created_at
            FROM checkpoints
            WHERE thread_id = ?1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| backend("select latest", e))?;

        row_opt
            .map(|row| Self::row_to_checkpoint(thread_id, &row))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(r#"SELECT id FROM threads ORDER BY updated_at DESC"#)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| backend("list threads", e))?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }
}
