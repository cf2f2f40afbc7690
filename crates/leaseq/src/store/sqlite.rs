//! SQLite store implementation.

use std::time::Duration;

use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{MessageStore, receive_ceiling};
use crate::error::Result;
use crate::message::{DeadLetter, DeadLetterQuery, Message, MessageId};

/// SQLite-backed message store.
///
/// Suited to single-host deployments and tests. SQLite serializes writers, so
/// the claim statement (`UPDATE ... WHERE id = (SELECT ...) RETURNING`) runs
/// under the database write lock and two connections can never claim the same
/// row. Timestamps are stored as fixed-width RFC 3339 text with millisecond
/// precision, computed by SQLite itself.
///
/// # Example
///
/// ```ignore
/// use leaseq::{Queue, QueueConfig, SqliteStore};
/// use sqlx::SqlitePool;
///
/// let pool = SqlitePool::connect("sqlite://queue.db?mode=rwc").await?;
/// let store = SqliteStore::new(pool);
/// store.migrate().await?;
/// let queue = Queue::new(store, QueueConfig::named("emails"))?;
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `strftime` modifier that shifts `'now'` forward by `delay`.
fn offset_modifier(delay: Duration) -> String {
    format!("+{:.3} seconds", delay.as_secs_f64())
}

fn parse_timestamp(value: &str) -> Result<OffsetDateTime> {
    Ok(OffsetDateTime::parse(value, &Rfc3339)?)
}

impl MessageStore for SqliteStore {
    async fn insert(
        &self,
        queue: &str,
        id: &MessageId,
        body: &[u8],
        delay: Duration,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leaseq_messages (id, queue, body, visible_at)
            VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?4))
            "#,
        )
        .bind(id.as_str())
        .bind(queue)
        .bind(body)
        .bind(offset_modifier(delay))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        max_receive_count: Option<u32>,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(
            r#"
            UPDATE leaseq_messages
            SET visible_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2),
                received = received + 1,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = (
                SELECT id FROM leaseq_messages
                WHERE queue = ?1
                  AND dead_at IS NULL
                  AND received < ?3
                  AND visible_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                ORDER BY visible_at, created_at, id
                LIMIT 1
            )
            RETURNING id, body, received
            "#,
        )
        .bind(queue)
        .bind(offset_modifier(visibility_timeout))
        .bind(receive_ceiling(max_receive_count))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Message {
            id: MessageId::from(row.try_get::<String, _>("id")?),
            body: row.try_get("body")?,
            received_count: row.try_get::<i64, _>("received")? as u32,
        }))
    }

    async fn extend(&self, queue: &str, id: &MessageId, delay: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leaseq_messages
            SET visible_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?3),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE queue = ?1 AND id = ?2
            "#,
        )
        .bind(queue)
        .bind(id.as_str())
        .bind(offset_modifier(delay))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, queue: &str, id: &MessageId) -> Result<()> {
        sqlx::query("DELETE FROM leaseq_messages WHERE queue = ?1 AND id = ?2")
            .bind(queue)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn bury(&self, queue: &str, id: &MessageId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leaseq_messages
            SET dead_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                last_error = ?3,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE queue = ?1 AND id = ?2
            "#,
        )
        .bind(queue)
        .bind(id.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fetch_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT id, body, received, last_error, created_at
            FROM leaseq_messages
            WHERE queue = ?1
              AND (
                  dead_at IS NOT NULL
                  OR (
                      ?2 = 0
                      AND received >= ?3
                      AND visible_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                  )
              )
            ORDER BY created_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(queue)
        .bind(query.buried_only)
        .bind(receive_ceiling(max_receive_count))
        .bind(query.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at")?;
                Ok(DeadLetter {
                    id: MessageId::from(row.try_get::<String, _>("id")?),
                    body: row.try_get("body")?,
                    received_count: row.try_get::<i64, _>("received")? as u32,
                    last_error: row.try_get("last_error")?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn count_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM leaseq_messages
            WHERE queue = ?1
              AND (
                  dead_at IS NOT NULL
                  OR (
                      ?2 = 0
                      AND received >= ?3
                      AND visible_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                  )
              )
            "#,
        )
        .bind(queue)
        .bind(query.buried_only)
        .bind(receive_ceiling(max_receive_count))
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn redrive(&self, queue: &str, id: &MessageId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leaseq_messages
            SET received = 0,
                dead_at = NULL,
                last_error = NULL,
                visible_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE queue = ?1 AND id = ?2
            "#,
        )
        .bind(queue)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
