//! Temporary SQLite databases for tests.
//!
//! Each test gets its own database file in a fresh temporary directory, so
//! tests run in parallel without any external service.

use std::{future::Future, pin::Pin, time::Duration};

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::{keep_db, sanitize_test_name};

/// Open a pool to a SQLite database file at `path`.
///
/// Uses WAL journaling and a busy timeout so several connections can share
/// the file the way a multi-process deployment would.
pub async fn connect(path: &std::path::Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create a fresh SQLite database, run `f` with a pool to it, then delete it.
///
/// - The leaseq SQLite migrations are applied first.
/// - On success and without `TEST_KEEP_DB`, the directory is removed.
/// - On error or with `TEST_KEEP_DB`, the file is kept and its path printed.
pub async fn with_sqlite_db<F, T>(test_name: &str, f: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a SqlitePool) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
{
    let dir = tempfile::Builder::new()
        .prefix(&format!("leaseq_{}_", sanitize_test_name(test_name)))
        .tempdir()?;
    let path = dir.path().join("queue.db");

    let pool = connect(&path).await?;

    // Relative to this crate's CARGO_MANIFEST_DIR.
    sqlx::migrate!("../leaseq/migrations/sqlite")
        .run(&pool)
        .await?;

    let result = f(&pool).await;
    pool.close().await;

    if result.is_err() || keep_db() {
        let kept = dir.keep();
        eprintln!(
            "[with_sqlite_db] Keeping database '{}' (error or TEST_KEEP_DB set)",
            kept.join("queue.db").display()
        );
    }

    result
}

/// Define a SQLite-backed async test.
///
/// ```ignore
/// use test_utils::sqlite_test;
///
/// sqlite_test!(round_trip, |pool| {
///     // `pool` is &SqlitePool with migrations applied
///     let store = SqliteStore::new(pool.clone());
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! sqlite_test {
    ($name:ident, |$pool:ident| $body:block) => {
        #[tokio::test(flavor = "multi_thread")]
        async fn $name() -> anyhow::Result<()> {
            use $crate::sqlite::with_sqlite_db;

            with_sqlite_db(stringify!($name), |$pool| {
                let fut = async move { $body };
                Box::pin(fut)
            })
            .await
        }
    };
}
