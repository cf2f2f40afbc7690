//! Runner configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::error::{Error, Result};

/// Configuration for the job runner.
///
/// Controls concurrency, polling and lease renewal.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use leaseq::RunnerConfig;
///
/// let config = RunnerConfig {
///     concurrency: Some(8),                          // Run up to 8 jobs at once
///     poll_interval: Duration::from_millis(50),
///     lease_extension: Duration::from_secs(30),
///     lease_renewal_interval: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of jobs executing at the same time.
    ///
    /// If `None`, the number of available CPU cores is used.
    pub concurrency: Option<usize>,

    /// How long each poll cycle waits for a message.
    ///
    /// Lower values make shutdown more responsive; the store is polled at the
    /// queue's own poll interval within each cycle. Default: 100ms.
    pub poll_interval: Duration,

    /// How far each lease renewal pushes a running job's message out.
    ///
    /// Default: 5 seconds.
    pub lease_extension: Duration,

    /// How often a running job's lease is renewed.
    ///
    /// Must be shorter than `lease_extension` so a slow store round trip
    /// does not let the lease lapse while the job runs. Default: 3 seconds.
    pub lease_renewal_interval: Duration,

    /// Pause after a failed receive before polling again.
    ///
    /// Default: 1 second.
    pub error_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            poll_interval: Duration::from_millis(100),
            lease_extension: Duration::from_secs(5),
            lease_renewal_interval: Duration::from_secs(3),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    /// Resolve the concurrency limit, falling back to available parallelism.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// Check the configuration for values the runner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            return Err(Error::InvalidConfig(
                "concurrency must be larger than zero".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll interval must be larger than zero".into(),
            ));
        }
        if self.lease_renewal_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "lease renewal interval must be larger than zero".into(),
            ));
        }
        if self.lease_renewal_interval >= self.lease_extension {
            return Err(Error::InvalidConfig(format!(
                "lease renewal interval ({:?}) must be shorter than the lease extension ({:?})",
                self.lease_renewal_interval, self.lease_extension
            )));
        }
        Ok(())
    }
}
