//! Runtime for executing queued jobs.
//!
//! - [`Runner`]: Poll loop with bounded concurrency and graceful drain
//! - [`RunnerBuilder`]: Builder for registering jobs and configuring the runner
//! - [`RunnerConfig`]: Concurrency, polling and lease renewal settings
//! - [`JobRegistry`]: Name to handler map, immutable once the runner starts
//!
//! # Example
//!
//! ```ignore
//! use leaseq::{Queue, QueueConfig, Runner, RunnerConfig, job_fn};
//!
//! let queue = Queue::new(store, QueueConfig::named("jobs"))?;
//! let runner = Runner::builder(queue)
//!     .register("send-email", send_email)
//!     .register("resize", job_fn(resize))
//!     .config(RunnerConfig::default())
//!     .build()?;
//!
//! runner.run(shutdown_signal).await?;
//! ```

mod config;
mod dispatch;
mod lease;
mod registry;
mod runner;

pub use config::RunnerConfig;
pub use registry::JobRegistry;
pub use runner::{Runner, RunnerBuilder, RunnerState, RunnerStatus};
