//! PostgreSQL store implementation.

use std::time::Duration;

use sqlx::{PgPool, Row};
use time::OffsetDateTime;

use super::{MessageStore, receive_ceiling};
use crate::error::Result;
use crate::message::{DeadLetter, DeadLetterQuery, Message, MessageId};

/// PostgreSQL-backed message store for production use.
///
/// Claims use `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED)`,
/// so concurrent consumers (in this process or others) skip rows another
/// transaction is claiming instead of blocking on them or claiming twice.
///
/// # Database Schema
///
/// Requires the `leaseq.messages` table created by the migrations in
/// `migrations/postgres`, applied with [`PgStore::migrate`].
///
/// # Example
///
/// ```ignore
/// use leaseq::{PgStore, Queue, QueueConfig};
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://...").await?;
/// let store = PgStore::new(pool);
/// store.migrate().await?;
/// let queue = Queue::new(store, QueueConfig::named("emails"))?;
/// ```
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PostgreSQL store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl MessageStore for PgStore {
    async fn insert(
        &self,
        queue: &str,
        id: &MessageId,
        body: &[u8],
        delay: Duration,
    ) -> Result<()> {
        // Visibility computed in DB to avoid clock skew between app and DB servers.
        sqlx::query(
            r#"
            INSERT INTO leaseq.messages (id, queue, body, visible_at)
            VALUES ($1, $2, $3, now() + ($4 * interval '1 second'))
            "#,
        )
        .bind(id.as_str())
        .bind(queue)
        .bind(body)
        .bind(delay.as_secs_f64())
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
        // Select and lease in one statement. SKIP LOCKED keeps concurrent
        // claimers from picking the same row.
        let row = sqlx::query(
            r#"
            UPDATE leaseq.messages
            SET visible_at = now() + ($2 * interval '1 second'),
                received = received + 1,
                updated_at = now()
            WHERE id = (
                SELECT id FROM leaseq.messages
                WHERE queue = $1
                  AND dead_at IS NULL
                  AND received < $3
                  AND visible_at <= now()
                ORDER BY visible_at, created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, received
            "#,
        )
        .bind(queue)
        .bind(visibility_timeout.as_secs_f64())
        .bind(receive_ceiling(max_receive_count))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Message {
            id: MessageId::from(row.try_get::<String, _>("id")?),
            body: row.try_get("body")?,
            received_count: row.try_get::<i32, _>("received")? as u32,
        }))
    }

    async fn extend(&self, queue: &str, id: &MessageId, delay: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leaseq.messages
            SET visible_at = now() + ($3 * interval '1 second'),
                updated_at = now()
            WHERE queue = $1 AND id = $2
            "#,
        )
        .bind(queue)
        .bind(id.as_str())
        .bind(delay.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, queue: &str, id: &MessageId) -> Result<()> {
        sqlx::query("DELETE FROM leaseq.messages WHERE queue = $1 AND id = $2")
            .bind(queue)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn bury(&self, queue: &str, id: &MessageId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE leaseq.messages
            SET dead_at = now(),
                last_error = $3,
                updated_at = now()
            WHERE queue = $1 AND id = $2
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
            FROM leaseq.messages
            WHERE queue = $1
              AND (
                  dead_at IS NOT NULL
                  OR (NOT $2 AND received >= $3 AND visible_at <= now())
              )
            ORDER BY created_at DESC, id DESC
            LIMIT $4
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
                Ok(DeadLetter {
                    id: MessageId::from(row.try_get::<String, _>("id")?),
                    body: row.try_get("body")?,
                    received_count: row.try_get::<i32, _>("received")? as u32,
                    last_error: row.try_get("last_error")?,
                    created_at: row.try_get::<OffsetDateTime, _>("created_at")?,
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
            FROM leaseq.messages
            WHERE queue = $1
              AND (
                  dead_at IS NOT NULL
                  OR (NOT $2 AND received >= $3 AND visible_at <= now())
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
            UPDATE leaseq.messages
            SET received = 0,
                dead_at = NULL,
                last_error = NULL,
                visible_at = now(),
                updated_at = now()
            WHERE queue = $1 AND id = $2
            "#,
        )
        .bind(queue)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
