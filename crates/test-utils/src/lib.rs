//! Per-test database fixtures for leaseq integration tests.
//!
//! - [`db`]: temporary Postgres database per test (`db_test!`)
//! - [`sqlite`]: temporary SQLite file per test (`sqlite_test!`)
//!
//! Both apply the leaseq migrations before running the test body and keep
//! the database around when the test fails or `TEST_KEEP_DB` is set.

pub mod db;
pub mod sqlite;

/// Returns `true` if `TEST_KEEP_DB` asks to keep databases after success.
pub(crate) fn keep_db() -> bool {
    std::env::var_os("TEST_KEEP_DB").is_some()
}

/// Lowercase a test name and replace anything but ASCII alphanumerics with `_`.
pub(crate) fn sanitize_test_name(test_name: &str) -> String {
    test_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}
