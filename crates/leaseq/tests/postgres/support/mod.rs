use std::time::Duration;

use anyhow::{Result, anyhow};
use leaseq::{PgStore, Queue, QueueConfig, RunnerConfig};
use sqlx::PgPool;

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("leaseq=debug")
        .with_test_writer()
        .try_init();
}

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue with a 1s lease and a short poll interval.
pub fn test_queue(pool: &PgPool, name: &str) -> Result<Queue<PgStore>> {
    let config = QueueConfig {
        visibility_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(20),
        ..QueueConfig::named(name)
    };
    Ok(Queue::new(PgStore::new(pool.clone()), config)?)
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

/// Poll `check` until it returns true or the test timeout expires.
pub async fn wait_for<F>(mut check: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + DEFAULT_TEST_TIMEOUT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            return Err(anyhow!("timeout waiting for condition"));
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    Ok(())
}
