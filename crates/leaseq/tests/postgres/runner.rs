//! Runner tests against PgStore.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use leaseq::{JobContext, Runner, enqueue_job, job_fn};
use test_utils::db_test;
use tokio::sync::oneshot;

use crate::support::{DEFAULT_TEST_TIMEOUT, init_test_tracing, test_queue, test_runner_config, wait_for};

db_test!(runner_processes_jobs_and_drains, |pool| {
    init_test_tracing();
    let queue = test_queue(pool, "jobs")?;
    let completed = Arc::new(AtomicUsize::new(0));

    let job = {
        let completed = Arc::clone(&completed);
        job_fn(move |_ctx: JobContext, payload: Vec<u8>| {
            let completed = Arc::clone(&completed);
            async move {
                tokio::time::sleep(Duration::from_millis(20 * payload.len() as u64)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }
        })
    };

    for i in 0..10 {
        enqueue_job(&queue, "work", &vec![b'x'; i], Duration::ZERO).await?;
    }

    let runner = Runner::builder(queue.clone())
        .register("work", job)
        .config(test_runner_config(4))
        .build()?;
    let status = runner.status();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(runner.run(async move {
        let _ = shutdown_rx.await;
    }));

    wait_for(|| completed.load(Ordering::SeqCst) == 10).await?;
    let _ = shutdown_tx.send(());
    tokio::time::timeout(DEFAULT_TEST_TIMEOUT, handle).await???;

    assert_eq!(status.in_flight(), 0);
    assert!(queue.receive().await?.is_none());
    Ok(())
});

db_test!(long_running_job_is_not_redelivered, |pool| {
    let queue = test_queue(pool, "long")?;
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let job = {
        let (started, finished) = (Arc::clone(&started), Arc::clone(&finished));
        job_fn(move |_ctx: JobContext, _payload: Vec<u8>| {
            let (started, finished) = (Arc::clone(&started), Arc::clone(&finished));
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2500)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }
        })
    };

    let runner = Runner::builder(queue.clone())
        .register("slow", job)
        .config(test_runner_config(3))
        .build()?;

    enqueue_job(&queue, "slow", b"", Duration::ZERO).await?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(runner.run(async move {
        let _ = shutdown_rx.await;
    }));

    wait_for(|| finished.load(Ordering::SeqCst) == 1).await?;
    let _ = shutdown_tx.send(());
    tokio::time::timeout(DEFAULT_TEST_TIMEOUT, handle).await???;

    assert_eq!(started.load(Ordering::SeqCst), 1);
    Ok(())
});
