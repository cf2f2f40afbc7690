//! Job registry mapping names to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::job::{ErasedJob, Job};

/// Registry mapping job names to their handlers.
///
/// Built once before the runner starts and shared read-only afterwards, so
/// lookups need no locking.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn ErasedJob>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under `name`.
    ///
    /// Returns [`Error::DuplicateJob`] if the name is already taken.
    pub fn register<J>(&mut self, name: impl Into<String>, job: J) -> Result<()>
    where
        J: Job,
    {
        let name = name.into();
        if self.jobs.contains_key(&name) {
            return Err(Error::DuplicateJob(name));
        }
        self.jobs.insert(name, Arc::new(job));
        Ok(())
    }

    /// Returns `true` if a job is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Registered job names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns `true` if no jobs are registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub(crate) fn get(&self, name: &str) -> Option<&dyn ErasedJob> {
        self.jobs.get(name).map(|job| job.as_ref())
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}
