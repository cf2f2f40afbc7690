//! Integration tests against PostgreSQL.
//!
//! Requires `TEST_ADMIN_DATABASE_URL`; each test runs in its own database.

mod runner;
mod store;
mod support;
