//! Lease renewal for running jobs.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use crate::message::MessageId;
use crate::queue::Queue;
use crate::store::MessageStore;

/// Keep a claimed message invisible while its job runs.
///
/// Extends the message by `extension` every `every`, starting one interval
/// after the claim, until `done` fires (or its sender is dropped). Extend
/// failures are logged and retried on the next tick; they never affect the
/// job itself.
///
/// An extend already in flight when `done` fires is allowed to finish, so
/// once this future returns no further extend can race the job's delete.
pub(crate) async fn renew_lease<S>(
    queue: Queue<S>,
    message_id: MessageId,
    extension: Duration,
    every: Duration,
    mut done: oneshot::Receiver<()>,
) where
    S: MessageStore,
{
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut done => break,
            _ = ticker.tick() => {
                match queue.extend(&message_id, extension).await {
                    Ok(()) => debug!(message_id = %message_id, "Renewed message lease"),
                    Err(e) => warn!(message_id = %message_id, error = %e, "Error extending message timeout"),
                }
            }
        }
    }
}
