//! Job types for work consumed by the [`Runner`](crate::Runner).
//!
//! - [`Job`]: Trait for named job handlers
//! - [`JobContext`]: Per-execution metadata and cancellation
//! - [`job_fn`]: Adapter turning an async closure into a [`Job`]
//! - [`enqueue_job`]: Producer side: wrap a payload in an envelope and send it

mod context;
mod handler;

use std::time::Duration;

pub use context::JobContext;
pub(crate) use handler::ErasedJob;
pub use handler::{Job, JobFn, job_fn};

use crate::envelope::Envelope;
use crate::error::Result;
use crate::message::MessageId;
use crate::queue::Queue;
use crate::store::MessageStore;

/// Enqueue a job for the runner consuming `queue`.
///
/// The job becomes receivable after `delay`. The name must be registered
/// with the runner; messages for unknown names are dead-lettered.
///
/// # Example
///
/// ```ignore
/// enqueue_job(&queue, "send-email", br#"{"to":"a@example.com"}"#, Duration::ZERO).await?;
/// ```
pub async fn enqueue_job<S>(
    queue: &Queue<S>,
    name: &str,
    payload: &[u8],
    delay: Duration,
) -> Result<MessageId>
where
    S: MessageStore,
{
    let body = Envelope::encode(name, payload)?;
    queue.send(body, delay).await
}
