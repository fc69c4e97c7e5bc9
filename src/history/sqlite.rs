//! SQLite-backed [`ConversationStore`].
//!
//! One row per session in `conversations` holds the expiry timestamp
//! (unix millis); turns live in `conversation_turns` keyed by
//! `(session_id, seq)`. Expired sessions are deleted lazily when they are
//! next read or written.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Row, SqlitePool};

use super::{system_clock, Clock, ConversationStore};
use crate::db;
use crate::migrate;
use crate::models::{Role, Turn};

pub struct SqliteStore {
    pool: SqlitePool,
    ttl: Duration,
    clock: Clock,
}

impl SqliteStore {
    /// Opens the database at `url` and creates the tables if needed.
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self> {
        let pool = db::connect_url(url).await?;
        migrate::migrate_history(&pool).await?;
        Ok(Self {
            pool,
            ttl: Duration::seconds(ttl_secs as i64),
            clock: system_clock(),
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now_millis(&self) -> i64 {
        (self.clock)().timestamp_millis()
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn fetch(&self, session_id: &str) -> Result<Vec<Turn>> {
        let now = self.now_millis();

        let expires_at: Option<i64> =
            sqlx::query_scalar("SELECT expires_at FROM conversations WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        match expires_at {
            None => return Ok(Vec::new()),
            Some(expires_at) if expires_at <= now => {
                self.clear(session_id).await?;
                return Ok(Vec::new());
            }
            Some(_) => {}
        }

        let rows = sqlx::query(
            "SELECT role, content FROM conversation_turns WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let tag: String = row.get("role");
                let role = Role::parse(&tag).ok_or_else(|| anyhow!("unknown role '{}'", tag))?;
                Ok(Turn {
                    role,
                    content: row.get("content"),
                })
            })
            .collect()
    }

    async fn append(&self, session_id: &str, turns: &[Turn]) -> Result<()> {
        let now = self.now_millis();
        let expires_at = now + self.ttl.num_milliseconds();

        let mut tx = self.pool.begin().await?;

        // Writing first takes the write lock before any read in this transaction.
        sqlx::query(
            r#"
            DELETE FROM conversation_turns
            WHERE session_id = ?
              AND EXISTS (
                  SELECT 1 FROM conversations
                  WHERE session_id = ? AND expires_at <= ?
              )
            "#,
        )
        .bind(session_id)
        .bind(session_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (session_id, expires_at) VALUES (?, ?)
            ON CONFLICT(session_id) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(session_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM conversation_turns WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, turn) in turns.iter().enumerate() {
            sqlx::query(
                "INSERT INTO conversation_turns (session_id, seq, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(next_seq + offset as i64)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM conversation_turns WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM conversations WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
