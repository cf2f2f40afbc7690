//! Integration tests against SQLite. No external services required.
