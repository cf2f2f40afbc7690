//! Queue engine: send, receive, extend and delete over a [`MessageStore`].

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::message::{DeadLetter, DeadLetterQuery, Message, MessageId};
use crate::store::MessageStore;

/// Configuration for a named queue.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use leaseq::QueueConfig;
///
/// let config = QueueConfig {
///     visibility_timeout: Duration::from_secs(30),
///     max_receive_count: Some(10),
///     ..QueueConfig::named("emails")
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name. Messages are scoped to it; several queues can share a table.
    pub name: String,

    /// How long a received message stays invisible to other consumers.
    ///
    /// Default: 5 seconds.
    pub visibility_timeout: Duration,

    /// Number of claims after which a message is no longer handed out.
    ///
    /// Exhausted messages stay in the store as dead letters and can be
    /// redriven. `None` retries forever. Default: 3.
    pub max_receive_count: Option<u32>,

    /// Interval between claim attempts in [`Queue::receive_and_wait`].
    ///
    /// Default: 100ms.
    pub poll_interval: Duration,
}

impl QueueConfig {
    /// Default configuration for the queue with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("queue name cannot be empty".into()));
        }
        if self.visibility_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "visibility timeout must be larger than zero".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll interval must be larger than zero".into(),
            ));
        }
        if self.max_receive_count == Some(0) {
            return Err(Error::InvalidConfig(
                "max receive count must be larger than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            visibility_timeout: Duration::from_secs(5),
            max_receive_count: Some(3),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A persistent queue with visibility-timeout semantics.
///
/// Messages are delivered at least once. A received message is leased for
/// the queue's visibility timeout; unless it is deleted or extended before
/// the lease lapses, it becomes receivable again. There is no explicit
/// "fail" operation: letting the lease expire is how a message is retried.
///
/// The queue holds no in-process locks. Claim safety comes entirely from the
/// store, so any number of `Queue` handles, in any number of processes, can
/// share one database.
///
/// # Example
///
/// ```ignore
/// let queue = Queue::new(store, QueueConfig::named("emails"))?;
///
/// queue.send(b"hello", Duration::ZERO).await?;
/// if let Some(message) = queue.receive().await? {
///     process(&message.body).await?;
///     queue.delete(&message.id).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Queue<S> {
    store: S,
    config: QueueConfig,
}

impl<S> Queue<S>
where
    S: MessageStore,
{
    /// Create a queue handle over a store.
    pub fn new(store: S, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Returns the queue name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Send a message that becomes receivable after `delay`.
    pub async fn send(&self, body: impl AsRef<[u8]>, delay: Duration) -> Result<MessageId> {
        let id = MessageId::generate();
        self.store
            .insert(&self.config.name, &id, body.as_ref(), delay)
            .await?;
        trace!(queue = %self.config.name, message_id = %id, delay_ms = delay.as_millis() as u64, "Sent message");
        Ok(id)
    }

    /// Receive the oldest visible message, if any.
    ///
    /// The message is leased for the visibility timeout and its received
    /// count is incremented. Returns `Ok(None)` when nothing is visible.
    pub async fn receive(&self) -> Result<Option<Message>> {
        let message = self
            .store
            .claim(
                &self.config.name,
                self.config.visibility_timeout,
                self.config.max_receive_count,
            )
            .await?;

        if let Some(message) = &message {
            trace!(
                queue = %self.config.name,
                message_id = %message.id,
                received_count = message.received_count,
                "Received message"
            );
        }

        Ok(message)
    }

    /// Receive a message, polling until one arrives, `max_wait` elapses, or
    /// `cancel` fires.
    ///
    /// Long-polling built from short polls at the configured poll interval.
    /// Timeout and cancellation both return `Ok(None)`; only store errors are
    /// reported as errors. A claim already in progress is never abandoned
    /// half-way: cancellation is observed between polls.
    pub async fn receive_and_wait(
        &self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>> {
        let deadline = Instant::now() + max_wait;

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            if let Some(message) = self.receive().await? {
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let pause = self.config.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = sleep(pause) => {}
            }
        }
    }

    /// Set a message's next visible time to `now + delay`.
    ///
    /// Returns [`Error::MessageNotFound`] if the message was deleted or never
    /// existed.
    pub async fn extend(&self, id: &MessageId, delay: Duration) -> Result<()> {
        if self.store.extend(&self.config.name, id, delay).await? {
            trace!(queue = %self.config.name, message_id = %id, delay_ms = delay.as_millis() as u64, "Extended message");
            Ok(())
        } else {
            Err(Error::MessageNotFound(id.clone()))
        }
    }

    /// Permanently delete a message. Deleting an unknown message succeeds.
    pub async fn delete(&self, id: &MessageId) -> Result<()> {
        self.store.delete(&self.config.name, id).await?;
        trace!(queue = %self.config.name, message_id = %id, "Deleted message");
        Ok(())
    }

    /// Bury a message so it is never received again until redriven.
    ///
    /// Returns `Ok(false)` if the message does not exist.
    pub async fn dead_letter(&self, id: &MessageId, reason: &str) -> Result<bool> {
        let buried = self.store.bury(&self.config.name, id, reason).await?;
        if buried {
            debug!(queue = %self.config.name, message_id = %id, reason, "Message dead-lettered");
        }
        Ok(buried)
    }

    /// Fetch dead letters.
    ///
    /// Includes buried messages and messages that were received
    /// `max_receive_count` times without being deleted.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let dead_letters = queue.fetch_dead_letters(DeadLetterQuery::new().limit(10)).await?;
    /// for dl in dead_letters {
    ///     queue.redrive(&dl.id).await?;
    /// }
    /// ```
    pub async fn fetch_dead_letters(&self, query: DeadLetterQuery) -> Result<Vec<DeadLetter>> {
        self.store
            .fetch_dead_letters(&self.config.name, &query, self.config.max_receive_count)
            .await
    }

    /// Count dead letters.
    ///
    /// Useful for monitoring and alerting on dead letter volume.
    pub async fn count_dead_letters(&self, query: DeadLetterQuery) -> Result<u64> {
        self.store
            .count_dead_letters(&self.config.name, &query, self.config.max_receive_count)
            .await
    }

    /// Make a dead letter receivable again.
    ///
    /// Resets the received count and burial. Returns `Ok(true)` if the
    /// message was found and reset.
    pub async fn redrive(&self, id: &MessageId) -> Result<bool> {
        self.store.redrive(&self.config.name, id).await
    }
}
