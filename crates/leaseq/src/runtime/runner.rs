//! Runner builder and poll loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::config::RunnerConfig;
use super::dispatch::{Dispatcher, JobOutcome};
use super::registry::JobRegistry;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::queue::Queue;
use crate::store::MessageStore;

/// Lifecycle of a [`Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Built but not yet polling.
    Starting,
    /// Claiming and dispatching messages.
    Running,
    /// Shutdown requested; waiting for in-flight jobs.
    Draining,
    /// All jobs finished; `run` has returned or is about to.
    Stopped,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Observer for a running [`Runner`].
///
/// Cheap to clone and usable after the runner has been moved into
/// [`Runner::run`].
#[derive(Debug, Clone)]
pub struct RunnerStatus {
    state: watch::Receiver<RunnerState>,
    executing: Arc<AtomicUsize>,
    limit: usize,
}

impl RunnerStatus {
    /// Current lifecycle state.
    pub fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    /// Number of jobs currently executing.
    ///
    /// Always between zero and [`limit`](Self::limit). A permit held by the
    /// poll loop while it waits for a message is not counted.
    pub fn in_flight(&self) -> usize {
        self.executing.load(Ordering::SeqCst)
    }

    /// Maximum number of concurrent jobs.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait until the runner reaches `state` (or any later state).
    pub async fn wait_for(&mut self, state: RunnerState) {
        let _ = self
            .state
            .wait_for(|current| rank(*current) >= rank(state))
            .await;
    }
}

/// Counts one executing job for as long as it is alive, including across a
/// panic in the job task.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(executing: &Arc<AtomicUsize>) -> Self {
        executing.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(executing))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn rank(state: RunnerState) -> u8 {
    match state {
        RunnerState::Starting => 0,
        RunnerState::Running => 1,
        RunnerState::Draining => 2,
        RunnerState::Stopped => 3,
    }
}

/// Builder for constructing a [`Runner`].
///
/// # Example
///
/// ```ignore
/// let runner = Runner::builder(queue)
///     .register("send-email", SendEmail::new(client))
///     .register("resize", job_fn(resize))
///     .config(RunnerConfig {
///         concurrency: Some(8),
///         ..Default::default()
///     })
///     .build()?;
/// ```
pub struct RunnerBuilder<S> {
    queue: Queue<S>,
    registry: JobRegistry,
    duplicate_job: Option<String>,
    config: RunnerConfig,
}

impl<S> RunnerBuilder<S>
where
    S: MessageStore,
{
    fn new(queue: Queue<S>) -> Self {
        Self {
            queue,
            registry: JobRegistry::new(),
            duplicate_job: None,
            config: RunnerConfig::default(),
        }
    }

    /// Register a job handler under `name`.
    ///
    /// Each name can only be registered once. Duplicate names are reported
    /// by [`build`](Self::build).
    pub fn register<J>(mut self, name: impl Into<String>, job: J) -> Self
    where
        J: Job,
    {
        if let Err(Error::DuplicateJob(name)) = self.registry.register(name, job) {
            self.duplicate_job.get_or_insert(name);
        }
        self
    }

    /// Use a prebuilt registry, replacing any jobs registered so far.
    pub fn registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self.duplicate_job = None;
        self
    }

    /// Set the runner configuration.
    ///
    /// If not called, uses [`RunnerConfig::default()`].
    pub fn config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the runner.
    ///
    /// Fails on duplicate job names, an invalid configuration, or a queue
    /// whose visibility timeout would lapse before the first lease renewal.
    pub fn build(self) -> Result<Runner<S>> {
        if let Some(name) = self.duplicate_job {
            return Err(Error::DuplicateJob(name));
        }
        self.config.validate()?;

        let visibility_timeout = self.queue.config().visibility_timeout;
        if visibility_timeout <= self.config.lease_renewal_interval {
            return Err(Error::InvalidConfig(format!(
                "queue visibility timeout ({:?}) must be longer than the lease renewal interval ({:?})",
                visibility_timeout, self.config.lease_renewal_interval
            )));
        }

        let limit = self.config.effective_concurrency();
        let (state_tx, _) = watch::channel(RunnerState::Starting);

        Ok(Runner {
            queue: self.queue,
            registry: Arc::new(self.registry),
            config: self.config,
            limit,
            permits: Arc::new(Semaphore::new(limit)),
            executing: Arc::new(AtomicUsize::new(0)),
            state_tx,
        })
    }
}

/// Bounded-concurrency job runner.
///
/// Claims messages from a [`Queue`], decodes their job envelopes and runs
/// the registered handlers, at most `concurrency` at a time. Each running
/// job keeps its message leased until it finishes.
///
/// # Lifecycle
///
/// 1. `Starting`: logs the registered job names
/// 2. `Running`: waits for capacity, claims one message per cycle and
///    spawns a task for it
/// 3. `Draining`: after shutdown, stops claiming and waits for every
///    in-flight job
/// 4. `Stopped`: `run` returns
///
/// # Example
///
/// ```ignore
/// let runner = Runner::builder(queue)
///     .register("send-email", send_email)
///     .build()?;
///
/// // Run until Ctrl+C
/// runner.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
/// ```
pub struct Runner<S> {
    queue: Queue<S>,
    registry: Arc<JobRegistry>,
    config: RunnerConfig,
    limit: usize,
    permits: Arc<Semaphore>,
    executing: Arc<AtomicUsize>,
    state_tx: watch::Sender<RunnerState>,
}

impl<S> Runner<S>
where
    S: MessageStore,
{
    /// Create a new runner builder consuming `queue`.
    pub fn builder(queue: Queue<S>) -> RunnerBuilder<S> {
        RunnerBuilder::new(queue)
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Returns the job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Subscribe to lifecycle state changes.
    pub fn state(&self) -> watch::Receiver<RunnerState> {
        self.state_tx.subscribe()
    }

    /// Returns an observer for state and in-flight count.
    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            state: self.state_tx.subscribe(),
            executing: Arc::clone(&self.executing),
            limit: self.limit,
        }
    }

    /// Run until `shutdown` completes, then drain.
    ///
    /// Handlers see shutdown through [`JobContext::cancellation`](crate::JobContext)
    /// but are never aborted; this returns only after every in-flight job has
    /// finished.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let cancel = CancellationToken::new();
        let run = self.run_until_cancelled(cancel.clone());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            () = shutdown => {
                info!("Shutdown signal received");
                cancel.cancel();
            }
        }

        run.await
    }

    /// Run until `cancel` is cancelled, then drain.
    ///
    /// Every job's context token is a child of `cancel`.
    pub async fn run_until_cancelled(self, cancel: CancellationToken) -> Result<()> {
        info!(
            queue = %self.queue.name(),
            jobs = ?self.registry.names(),
            concurrency = self.limit,
            "Runner starting"
        );
        self.state_tx.send_replace(RunnerState::Running);

        let dispatcher = Arc::new(Dispatcher::new(
            self.queue.clone(),
            Arc::clone(&self.registry),
            self.config.lease_extension,
            self.config.lease_renewal_interval,
            cancel.clone(),
        ));
        let mut jobs = JoinSet::new();

        loop {
            while let Some(joined) = jobs.try_join_next() {
                log_finished(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = match self
                .queue
                .receive_and_wait(self.config.poll_interval, &cancel)
                .await
            {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    error!(queue = %self.queue.name(), error = %e, "Error receiving message");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(self.config.error_backoff) => continue,
                    }
                }
            };

            // A claimed message is always dispatched, even if shutdown began
            // during the claim; its handler then starts cancelled.
            trace!(message_id = %message.id, in_flight = self.executing.load(Ordering::SeqCst), "Dispatching message");
            let dispatcher = Arc::clone(&dispatcher);
            let executing = Arc::clone(&self.executing);
            jobs.spawn(async move {
                let _permit = permit;
                let _in_flight = InFlight::enter(&executing);
                dispatcher.dispatch(message).await
            });
        }

        self.state_tx.send_replace(RunnerState::Draining);
        info!(in_flight = jobs.len(), "Runner draining");

        while let Some(joined) = jobs.join_next().await {
            log_finished(joined);
        }

        self.state_tx.send_replace(RunnerState::Stopped);
        info!(queue = %self.queue.name(), "Runner stopped");
        Ok(())
    }
}

fn log_finished(joined: std::result::Result<JobOutcome, JoinError>) {
    match joined {
        Ok(outcome) => trace!(?outcome, "Job task finished"),
        Err(e) if e.is_panic() => error!(error = %e, "Job task panicked outside its handler"),
        Err(e) => warn!(error = %e, "Job task was cancelled"),
    }
}

impl<S> fmt::Debug for Runner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("registry", &self.registry)
            .field("limit", &self.limit)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}
