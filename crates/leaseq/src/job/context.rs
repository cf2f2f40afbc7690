//! Job execution context.

use tokio_util::sync::CancellationToken;

use crate::message::MessageId;

/// Context provided to job handlers during execution.
///
/// # Cancellation
///
/// The [`cancellation`](Self::cancellation) token is a child of the runner's
/// shutdown token. Long-running handlers should watch it and return early;
/// the runner never aborts a handler, it only waits for it.
///
/// # Idempotency
///
/// Jobs are delivered at least once. [`message_id`](Self::message_id) is
/// stable across redeliveries of the same message and makes a good
/// idempotency key for external calls.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Identifier of the queue message carrying this job.
    pub message_id: MessageId,

    /// Registered job name.
    pub name: String,

    /// How many times the message has been received, including this time.
    pub received_count: u32,

    /// Cancelled when the runner starts shutting down.
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(
        message_id: MessageId,
        name: impl Into<String>,
        received_count: u32,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            message_id,
            name: name.into(),
            received_count,
            cancellation,
        }
    }

    /// Returns `true` if this message was delivered before.
    pub fn is_redelivery(&self) -> bool {
        self.received_count > 1
    }

    /// Returns `true` once the runner has begun shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes when the runner begins shutting down.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}
