//! Collaborator traits
//!
//! These traits allow the migrate crate to be used without depending on a
//! specific gateway transport, export format or job storage.

use crate::error::{GatewayError, StoreError};
use crate::job::{Endpoint, MigrationJob, ProgressSnapshot, ResourceOutcome};
use crate::types::{ResourceKind, ResourceNode, ResourceRef};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Reads resources from a gateway (or an export of one)
///
/// Used for both source-platform and target-platform reads.
pub trait ResourceSource: Send + Sync {
    /// Every resource of the given kinds visible from `endpoint`
    fn fetch_snapshot(
        &self,
        endpoint: &Endpoint,
        kinds: &[ResourceKind],
    ) -> Result<Vec<ResourceNode>, GatewayError>;

    /// A single resource, or `None` when it does not exist
    fn fetch_resource(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
    ) -> Result<Option<ResourceNode>, GatewayError> {
        Ok(self
            .fetch_snapshot(endpoint, &[reference.kind])?
            .into_iter()
            .find(|node| &node.reference == reference))
    }
}

/// What a successful write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
}

/// Mutating access to the target gateway
pub trait GatewayClient: Send + Sync {
    /// Create the resource, or replace it when it already exists
    ///
    /// Fails with [`GatewayError::NotFound`] naming the missing resource when
    /// a prerequisite of the payload does not exist on the target.
    fn create_or_update(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
        payload: &Value,
    ) -> Result<WriteOutcome, GatewayError>;
}

/// Persistence for job records
///
/// Implementations must give read-your-writes consistency per job id.
pub trait JobStore: Send + Sync {
    fn save(&self, job: &MigrationJob) -> Result<(), StoreError>;

    fn load(&self, id: &str) -> Result<MigrationJob, StoreError>;

    /// All stored jobs, oldest first
    fn list(&self) -> Result<Vec<MigrationJob>, StoreError>;
}

/// Progress callback for job execution
///
/// Called from worker threads, hence `&self`.
pub trait ProgressCallback: Send + Sync {
    /// Called when a job has been planned
    fn on_job_start(&self, _job_id: &str, _total: usize) {}

    /// Called when starting a level of the migration order
    fn on_level_start(&self, level: usize, count: usize);

    /// Called when a resource has been recorded on the job
    fn on_resource_complete(&self, outcome: &ResourceOutcome);

    /// Called once the job reached a terminal state
    fn on_job_complete(&self, progress: &ProgressSnapshot);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_level_start(&self, _level: usize, _count: usize) {}
    fn on_resource_complete(&self, _outcome: &ResourceOutcome) {}
    fn on_job_complete(&self, _progress: &ProgressSnapshot) {}
}

/// Job store kept in memory
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<BTreeMap<String, MigrationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn save(&self, job: &MigrationJob) -> Result<(), StoreError> {
        lock(&self.jobs).insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<MigrationJob, StoreError> {
        lock(&self.jobs)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<MigrationJob>, StoreError> {
        let mut jobs: Vec<_> = lock(&self.jobs).values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobIntent;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryJobStore::new();
        let job = MigrationJob::new(
            "j",
            JobIntent::new(Endpoint::new("edge", "prod"), Endpoint::new("x", "prod")),
        );
        store.save(&job).unwrap();
        assert_eq!(store.load(&job.id).unwrap(), job);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store_missing() {
        let store = MemoryJobStore::new();
        assert!(matches!(store.load("nope"), Err(StoreError::NotFound(_))));
    }
}
