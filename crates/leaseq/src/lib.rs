//! Persistent at-least-once message queue with a bounded-concurrency job runner.
//!
//! Leaseq provides:
//!
//! - **Visibility-timeout queue**: [`Queue`] hands out leased messages that
//!   become visible again if the consumer never deletes them
//! - **Pluggable storage**: [`MessageStore`] over SQLite or PostgreSQL, where
//!   the database alone guarantees a message is leased to one consumer at a time
//! - **Job runner**: [`Runner`] decodes job envelopes, runs registered handlers
//!   with lease renewal and panic isolation, and drains gracefully on shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Runner<S>                                  │
//! │                                                                         │
//! │   1. Acquire a concurrency permit                                       │
//! │   2. Claim a message (Queue::receive_and_wait)                          │
//! │   3. Decode envelope → look up job by name                              │
//! │   4. Run job while renewing its lease                                   │
//! │   5. Delete on success, leave for redelivery on failure                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use leaseq::{Queue, QueueConfig, Runner, SqliteStore, enqueue_job, job_fn};
//!
//! let store = SqliteStore::new(pool);
//! store.migrate().await?;
//!
//! let queue = Queue::new(store, QueueConfig::named("jobs"))?;
//! enqueue_job(&queue, "greet", b"world", Duration::ZERO).await?;
//!
//! let runner = Runner::builder(queue)
//!     .register("greet", job_fn(|_ctx, payload| async move {
//!         tracing::info!(name = %String::from_utf8_lossy(&payload), "hello");
//!         Ok::<_, std::convert::Infallible>(())
//!     }))
//!     .build()?;
//!
//! runner.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `sqlite` (default): Enables [`SqliteStore`]
//! - `postgres`: Enables [`PgStore`] for production use with PostgreSQL
//! - `http`: Enables the [`http`] module, a JSON façade over a queue
//!
//! # Design Documentation
//!
//! See `DESIGN.md` for architectural decisions.

mod envelope;
mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod job;
mod message;
mod queue;
pub mod runtime;
pub mod store;

pub use envelope::Envelope;
pub use error::{Error, Result};
pub use job::{Job, JobContext, JobFn, enqueue_job, job_fn};
pub use message::{DeadLetter, DeadLetterQuery, Message, MessageId};
pub use queue::{Queue, QueueConfig};
pub use runtime::{JobRegistry, Runner, RunnerBuilder, RunnerConfig, RunnerState, RunnerStatus};
pub use store::MessageStore;
#[cfg(feature = "postgres")]
pub use store::PgStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
