//! `MessageStore` wrapper that injects claim faults into a `SqliteStore`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use leaseq::{DeadLetter, DeadLetterQuery, Message, MessageId, MessageStore, SqliteStore};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

/// Delegates to a `SqliteStore`, with optional faults on `claim`.
#[derive(Clone)]
pub struct FaultyStore {
    inner: SqliteStore,
    failing_claims: Arc<AtomicUsize>,
    cancel_on_claim: Option<CancellationToken>,
    claim_attempts: Arc<Mutex<Vec<Instant>>>,
}

impl FaultyStore {
    pub fn new(pool: &SqlitePool) -> Self {
        Self {
            inner: SqliteStore::new(pool.clone()),
            failing_claims: Arc::default(),
            cancel_on_claim: None,
            claim_attempts: Arc::default(),
        }
    }

    /// Fail the next `count` claims with a database error.
    pub fn fail_claims(self, count: usize) -> Self {
        self.failing_claims.store(count, Ordering::SeqCst);
        self
    }

    /// Cancel `token` as soon as a claim hands out a message.
    pub fn cancel_on_claim(mut self, token: CancellationToken) -> Self {
        self.cancel_on_claim = Some(token);
        self
    }

    /// When each claim was attempted, failed ones included.
    pub fn claim_attempts(&self) -> Vec<Instant> {
        self.claim_attempts.lock().expect("attempts lock poisoned").clone()
    }
}

impl MessageStore for FaultyStore {
    async fn insert(
        &self,
        queue: &str,
        id: &MessageId,
        body: &[u8],
        delay: Duration,
    ) -> leaseq::Result<()> {
        self.inner.insert(queue, id, body, delay).await
    }

    async fn claim(
        &self,
        queue: &str,
        visibility_timeout: Duration,
        max_receive_count: Option<u32>,
    ) -> leaseq::Result<Option<Message>> {
        self.claim_attempts
            .lock()
            .expect("attempts lock poisoned")
            .push(Instant::now());

        let fail = self
            .failing_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(sqlx::Error::PoolTimedOut.into());
        }

        let message = self
            .inner
            .claim(queue, visibility_timeout, max_receive_count)
            .await?;
        if let (Some(_), Some(token)) = (&message, &self.cancel_on_claim) {
            token.cancel();
        }
        Ok(message)
    }

    async fn extend(&self, queue: &str, id: &MessageId, delay: Duration) -> leaseq::Result<bool> {
        self.inner.extend(queue, id, delay).await
    }

    async fn delete(&self, queue: &str, id: &MessageId) -> leaseq::Result<()> {
        self.inner.delete(queue, id).await
    }

    async fn bury(&self, queue: &str, id: &MessageId, reason: &str) -> leaseq::Result<bool> {
        self.inner.bury(queue, id, reason).await
    }

    async fn fetch_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> leaseq::Result<Vec<DeadLetter>> {
        self.inner
            .fetch_dead_letters(queue, query, max_receive_count)
            .await
    }

    async fn count_dead_letters(
        &self,
        queue: &str,
        query: &DeadLetterQuery,
        max_receive_count: Option<u32>,
    ) -> leaseq::Result<u64> {
        self.inner
            .count_dead_letters(queue, query, max_receive_count)
            .await
    }

    async fn redrive(&self, queue: &str, id: &MessageId) -> leaseq::Result<bool> {
        self.inner.redrive(queue, id).await
    }
}
