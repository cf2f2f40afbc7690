use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use leaseq::{
    DeadLetter, DeadLetterQuery, MessageStore, Queue, QueueConfig, Runner, RunnerConfig,
    RunnerState, RunnerStatus, SqliteStore,
};
use sqlx::SqlitePool;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("leaseq=debug")
        .with_test_writer()
        .try_init();
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const TEST_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(1);

/// Queue over a fresh store with a short poll interval.
pub fn test_queue(pool: &SqlitePool, name: &str) -> Result<Queue<SqliteStore>> {
    let config = QueueConfig {
        poll_interval: Duration::from_millis(20),
        ..QueueConfig::named(name)
    };
    Ok(Queue::new(SqliteStore::new(pool.clone()), config)?)
}

/// Queue whose leases lapse after [`TEST_VISIBILITY_TIMEOUT`].
pub fn short_lease_queue(pool: &SqlitePool, name: &str) -> Result<Queue<SqliteStore>> {
    let config = QueueConfig {
        visibility_timeout: TEST_VISIBILITY_TIMEOUT,
        poll_interval: Duration::from_millis(20),
        ..QueueConfig::named(name)
    };
    Ok(Queue::new(SqliteStore::new(pool.clone()), config)?)
}

/// Fast runner config for tests.
pub fn test_runner_config(concurrency: usize) -> RunnerConfig {
    RunnerConfig {
        concurrency: Some(concurrency),
        poll_interval: Duration::from_millis(50),
        lease_extension: Duration::from_secs(1),
        lease_renewal_interval: Duration::from_millis(250),
        error_backoff: Duration::from_millis(100),
    }
}

/// Tracks maximum concurrent executions for parallelism tests.
#[derive(Default)]
pub struct ConcurrencyTracker {
    current: AtomicUsize,
    max_seen: AtomicUsize,
}

impl ConcurrencyTracker {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn enter(&self) {
        let count = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(count, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }
}

/// Shared counter readable from test bodies and job closures.
#[derive(Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn incr(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll until condition returns Some(T) or timeout expires.
pub async fn wait_until<F, Fut, T>(timeout: Duration, interval: Duration, check: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Some(result) = check().await? {
            return Ok(result);
        }

        if tokio::time::Instant::now() > deadline {
            return Err(anyhow!("timeout waiting for condition"));
        }

        tokio::time::sleep(interval).await;
    }
}

/// Wait until `counter` reaches at least `expected`.
pub async fn wait_for_count(counter: &Counter, expected: usize) -> Result<()> {
    wait_until(DEFAULT_TEST_TIMEOUT, DEFAULT_POLL_INTERVAL, || async {
        Ok((counter.get() >= expected).then_some(()))
    })
    .await
    .map_err(|e| anyhow!("{e}: expected {expected}, got {}", counter.get()))
}

/// Wait until `queue` holds at least one dead letter matching `query`.
pub async fn wait_for_dead_letters(
    queue: &Queue<SqliteStore>,
    query: DeadLetterQuery,
) -> Result<Vec<DeadLetter>> {
    wait_until(DEFAULT_TEST_TIMEOUT, DEFAULT_POLL_INTERVAL, || async {
        let dead_letters = queue.fetch_dead_letters(query.clone()).await?;
        Ok((!dead_letters.is_empty()).then_some(dead_letters))
    })
    .await
}

/// Runner spawned in the background. Drop signals shutdown automatically.
pub struct TestRunner {
    pub status: RunnerStatus,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<leaseq::Result<()>>>,
}

impl TestRunner {
    /// Spawn `runner` and wait until it is polling.
    pub async fn start<S: MessageStore>(runner: Runner<S>) -> Self {
        let mut status = runner.status();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(runner.run(async move {
            let _ = shutdown_rx.await;
        }));

        status.wait_for(RunnerState::Running).await;

        Self {
            status,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Signal shutdown without waiting for the drain.
    pub fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the runner to return.
    pub async fn join(mut self) -> Result<()> {
        self.signal_shutdown();
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        Ok(())
    }

    /// Signal shutdown and wait for the drain, bounded by the test timeout.
    pub async fn shutdown(self) -> Result<()> {
        tokio::time::timeout(DEFAULT_TEST_TIMEOUT, self.join())
            .await
            .map_err(|_| anyhow!("runner did not stop within {DEFAULT_TEST_TIMEOUT:?}"))?
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        // Only signal; aborting mid-operation would surface as closed-pool errors.
        self.signal_shutdown();
    }
}
