//! Job handler trait and closure adapter.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;

use super::context::JobContext;

/// Handler for a named job.
///
/// Register implementations with [`RunnerBuilder::register`](crate::RunnerBuilder::register).
/// The runner decodes each claimed message, looks up the handler by name and
/// calls [`run`](Self::run) with the payload.
///
/// # Results
///
/// | Result | Meaning |
/// |--------|---------|
/// | `Ok(())` | Job succeeded, the message is deleted |
/// | `Err(_)` | Job failed, the message is redelivered when its lease lapses |
/// | panic | Treated like `Err(_)`; other jobs and the runner are unaffected |
///
/// # Idempotency
///
/// Jobs have **at-least-once** delivery semantics. A handler may run more
/// than once for the same message, for example when the process crashes
/// between a successful run and the delete.
///
/// # Example
///
/// ```ignore
/// struct SendEmail {
///     client: EmailClient,
/// }
///
/// #[async_trait]
/// impl Job for SendEmail {
///     type Error = anyhow::Error;
///
///     async fn run(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), Self::Error> {
///         let email: Email = serde_json::from_slice(payload)?;
///         self.client.send(&email, ctx.message_id.as_str()).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// The error type returned by this job.
    ///
    /// Must implement `Display` so failures can be logged.
    type Error: Display + Send + 'static;

    /// Execute the job with its payload.
    async fn run(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), Self::Error>;
}

/// A [`Job`] backed by an async closure. Created with [`job_fn`].
pub struct JobFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Job`].
///
/// The closure receives an owned context and payload so the returned future
/// can be `'static`.
///
/// # Example
///
/// ```ignore
/// let runner = Runner::builder(queue)
///     .register("ping", job_fn(|_ctx, payload| async move {
///         tracing::info!(len = payload.len(), "pong");
///         Ok::<_, std::convert::Infallible>(())
///     }))
///     .build()?;
/// ```
pub fn job_fn<F, Fut, E>(f: F) -> JobFn<F>
where
    F: Fn(JobContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    JobFn { f }
}

#[async_trait]
impl<F, Fut, E> Job for JobFn<F>
where
    F: Fn(JobContext, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    type Error = E;

    async fn run(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), Self::Error> {
        (self.f)(ctx.clone(), payload.to_vec()).await
    }
}

/// Type-erased job for dynamic dispatch.
///
/// Lets the registry store different job types in a single map. Errors are
/// flattened to strings for logging.
#[async_trait]
pub(crate) trait ErasedJob: Send + Sync {
    async fn execute(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), String>;
}

#[async_trait]
impl<J> ErasedJob for J
where
    J: Job,
{
    async fn execute(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), String> {
        self.run(ctx, payload).await.map_err(|e| e.to_string())
    }
}
