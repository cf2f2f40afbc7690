//! Per-message job execution.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::lease::renew_lease;
use super::registry::JobRegistry;
use crate::envelope::Envelope;
use crate::job::JobContext;
use crate::message::{Message, MessageId};
use crate::queue::Queue;
use crate::store::MessageStore;

/// How a dispatched message ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    /// Handler succeeded and the message was deleted (or the delete was attempted).
    Completed,
    /// Handler returned an error; the message redelivers when its lease lapses.
    Failed,
    /// Handler panicked; handled like `Failed`.
    Panicked,
    /// The message could not be dispatched and was buried.
    DeadLettered,
}

/// Runs claimed messages through their handlers.
///
/// Shared by every job task of one runner.
pub(crate) struct Dispatcher<S> {
    queue: Queue<S>,
    registry: Arc<JobRegistry>,
    lease_extension: Duration,
    lease_renewal_interval: Duration,
    cancel: CancellationToken,
}

impl<S> Dispatcher<S>
where
    S: MessageStore,
{
    pub fn new(
        queue: Queue<S>,
        registry: Arc<JobRegistry>,
        lease_extension: Duration,
        lease_renewal_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            registry,
            lease_extension,
            lease_renewal_interval,
            cancel,
        }
    }

    /// Process one claimed message to completion.
    ///
    /// 1. Decode the envelope, burying the message if it is malformed
    /// 2. Look up the handler, burying the message if the name is unknown
    /// 3. Start lease renewal
    /// 4. Run the handler, catching panics
    /// 5. Stop renewal and wait for it
    /// 6. Delete the message if the handler succeeded
    pub async fn dispatch(&self, message: Message) -> JobOutcome {
        let Message {
            id,
            body,
            received_count,
        } = message;

        let envelope = match Envelope::decode(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(message_id = %id, error = %e, "Dead letter: undecodable job envelope");
                self.bury(&id, &format!("undecodable envelope: {e}")).await;
                return JobOutcome::DeadLettered;
            }
        };

        let Some(job) = self.registry.get(&envelope.name) else {
            error!(
                message_id = %id,
                job = %envelope.name,
                registered = ?self.registry.names(),
                "Dead letter: no job registered under this name"
            );
            self.bury(&id, &format!("unknown job: {}", envelope.name))
                .await;
            return JobOutcome::DeadLettered;
        };

        let ctx = JobContext::new(
            id.clone(),
            envelope.name.as_str(),
            received_count,
            self.cancel.child_token(),
        );

        let (done_tx, done_rx) = oneshot::channel();
        let renewal = tokio::spawn(renew_lease(
            self.queue.clone(),
            id.clone(),
            self.lease_extension,
            self.lease_renewal_interval,
            done_rx,
        ));

        debug!(
            message_id = %id,
            job = %envelope.name,
            received_count,
            "Running job"
        );

        let result = AssertUnwindSafe(job.execute(&ctx, &envelope.payload))
            .catch_unwind()
            .await;

        let _ = done_tx.send(());
        if let Err(e) = renewal.await {
            warn!(message_id = %id, error = %e, "Lease renewal task failed");
        }

        match result {
            Ok(Ok(())) => {
                match self.queue.delete(&id).await {
                    Ok(()) => debug!(message_id = %id, job = %envelope.name, "Job completed"),
                    Err(e) => warn!(
                        message_id = %id,
                        job = %envelope.name,
                        error = %e,
                        "Job completed but its message could not be deleted"
                    ),
                }
                JobOutcome::Completed
            }
            Ok(Err(e)) => {
                warn!(
                    message_id = %id,
                    job = %envelope.name,
                    received_count,
                    error = %e,
                    "Job failed, will be redelivered"
                );
                JobOutcome::Failed
            }
            Err(panic) => {
                error!(
                    message_id = %id,
                    job = %envelope.name,
                    received_count,
                    panic = panic_message(panic.as_ref()),
                    "Job panicked, will be redelivered"
                );
                JobOutcome::Panicked
            }
        }
    }

    async fn bury(&self, id: &MessageId, reason: &str) {
        match self.queue.dead_letter(id, reason).await {
            Ok(true) => {}
            Ok(false) => debug!(message_id = %id, "Message vanished before it could be dead-lettered"),
            Err(e) => warn!(message_id = %id, error = %e, "Error dead-lettering message"),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
