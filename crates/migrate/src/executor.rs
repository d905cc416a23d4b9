//! Migration job orchestrator - drives jobs level by level
//!
//! Levels run strictly in sequence; the resources of one level run in
//! parallel on a bounded rayon pool. The job record is the only mutable
//! state shared between workers and each resource's outcome is committed
//! to it under a single lock acquisition.

use crate::context::{
    GatewayClient, JobStore, NoProgress, ProgressCallback, ResourceSource, WriteOutcome, lock,
};
use crate::diff::{ChangeRecord, DiffEngine, DiffOptions};
use crate::error::{GatewayError, MigrateError, Result, StoreError};
use crate::job::{
    JobIntent, JobLogs, JobStatus, MigrationJob, OutcomeKind, ProgressSnapshot, ResourceOutcome,
};
use crate::planner::{filter_kinds, resolve};
use crate::retry::{LogCallback, RetryPolicy, with_retry};
use crate::transform::{TransformOptions, Transformer};
use crate::types::{MigrationOrder, ResourceNode, ResourceRef};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker threads per level
    pub jobs: usize,
    pub retry: RetryPolicy,
    pub diff: DiffOptions,
    pub transform: TransformOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: 4,
            retry: RetryPolicy::default(),
            diff: DiffOptions::default(),
            transform: TransformOptions::default(),
        }
    }
}

/// A job known to this orchestrator
struct JobHandle {
    job: Arc<Mutex<MigrationJob>>,
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl JobHandle {
    fn new(job: MigrationJob) -> Self {
        Self {
            job: Arc::new(Mutex::new(job)),
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs migration jobs from a source gateway to a target gateway
pub struct Orchestrator {
    source: Arc<dyn ResourceSource>,
    target: Arc<dyn ResourceSource>,
    gateway: Arc<dyn GatewayClient>,
    store: Arc<dyn JobStore>,
    settings: Settings,
    engine: DiffEngine,
    transformer: Transformer,
    progress: Arc<dyn ProgressCallback>,
    jobs: Mutex<BTreeMap<String, Arc<JobHandle>>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        target: Arc<dyn ResourceSource>,
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn JobStore>,
        settings: Settings,
    ) -> Self {
        Self {
            engine: DiffEngine::new(settings.diff.clone()),
            transformer: Transformer::new(settings.transform.clone()),
            source,
            target,
            gateway,
            store,
            settings,
            progress: Arc::new(NoProgress),
            jobs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Report execution progress to `progress`
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create and persist a pending job
    pub fn create_job(&self, name: impl Into<String>, intent: JobIntent) -> Result<MigrationJob> {
        let mut job = MigrationJob::new(name, intent);
        job.info(format!(
            "created job '{}': {} -> {}{}",
            job.name,
            job.intent.source,
            job.intent.target,
            if job.intent.dry_run { " (dry run)" } else { "" }
        ));
        self.store.save(&job)?;
        log::info!("Created job {} ({})", job.id, job.name);

        lock(&self.jobs).insert(job.id.clone(), Arc::new(JobHandle::new(job.clone())));
        Ok(job)
    }

    /// Run a pending job to a terminal state
    ///
    /// A job that is not pending is left alone and its current status is
    /// returned, so a job is never executed twice.
    pub fn start(&self, job_id: &str) -> Result<JobStatus> {
        let handle = self.handle(job_id)?;

        let intent = {
            let mut job = lock(&handle.job);
            if job.status != JobStatus::Pending {
                log::info!("Job {} is {}; not starting it again", job.id, job.status);
                return Ok(job.status);
            }
            job.mark_running();
            job.info("job started");
            if let Err(e) = self.store.save(&job) {
                job.abort(format!("job store unavailable: {e}"));
                return Err(e.into());
            }
            job.intent.clone()
        };
        log::info!("Starting job {job_id}");

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.jobs.max(1))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                let message = format!("failed to create thread pool: {e}");
                self.fail(&handle, message.clone());
                return Err(MigrateError::Other(message));
            }
        };

        let kinds = intent.selected_kinds();
        let snapshot = match self.source.fetch_snapshot(&intent.source, &kinds) {
            Ok(snapshot) => filter_kinds(snapshot, &kinds),
            Err(e) => {
                self.fail(&handle, format!("failed to read source {}: {e}", intent.source));
                return Ok(JobStatus::Failed);
            }
        };

        let order = match resolve(&snapshot) {
            Ok(order) => order,
            Err(cycle) => {
                self.fail(&handle, format!("cannot plan migration: {cycle}"));
                return Ok(JobStatus::Failed);
            }
        };

        {
            let mut job = lock(&handle.job);
            job.total_resources = order.total_resources();
            for warning in &order.warnings {
                job.warn(warning.clone());
            }
            job.info(format!(
                "planned {} resources in {} levels",
                order.total_resources(),
                order.levels.len()
            ));
            self.save(&job);
        }
        self.progress.on_job_start(job_id, order.total_resources());

        let nodes: BTreeMap<&ResourceRef, &ResourceNode> =
            snapshot.iter().map(|n| (&n.reference, n)).collect();

        for (index, level) in order.levels.iter().enumerate() {
            if handle.is_cancelled() {
                break;
            }
            log::info!("Job {job_id}: level {} ({} resources)", index + 1, level.len());
            lock(&handle.job).info(format!("level {}: {} resources", index + 1, level.len()));
            self.progress.on_level_start(index, level.len());

            pool.install(|| {
                level.par_iter().for_each(|reference| {
                    if handle.is_cancelled() {
                        return;
                    }
                    let Some(node) = nodes.get(reference) else {
                        return;
                    };
                    let outcome = self.migrate_resource(node, &intent);
                    lock(&handle.job).record(outcome.clone());
                    self.progress.on_resource_complete(&outcome);
                });
            });

            self.save(&lock(&handle.job));
        }

        let mut job = lock(&handle.job);
        if handle.is_cancelled() {
            let reason = lock(&handle.reason)
                .clone()
                .unwrap_or_else(|| "no reason given".to_string());
            job.abort(format!("job cancelled: {reason}"));
        } else {
            job.finish();
        }
        log::info!("Job {job_id} finished: {}", job.status);
        self.save(&job);
        self.progress.on_job_complete(&job.progress());
        Ok(job.status)
    }

    /// Run `start` on a background thread
    pub fn spawn(self: Arc<Self>, job_id: &str) -> Result<JoinHandle<Result<JobStatus>>> {
        let id = job_id.to_string();
        thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || self.start(&id))
            .map_err(|e| MigrateError::Job {
                id: job_id.to_string(),
                message: format!("failed to spawn worker thread: {e}"),
            })
    }

    /// Ask a job to stop
    ///
    /// Resources already being migrated finish; nothing new starts and the
    /// job ends `failed` with the reason recorded. A pending job fails
    /// immediately; a finished job is left alone.
    pub fn cancel(&self, job_id: &str, reason: &str) -> Result<JobStatus> {
        let handle = self.handle(job_id)?;
        let mut job = lock(&handle.job);

        if job.status.is_terminal() {
            log::info!("Job {job_id} already {}; nothing to cancel", job.status);
            return Ok(job.status);
        }
        if job.status == JobStatus::Pending {
            job.abort(format!("job cancelled: {reason}"));
            self.save(&job);
        } else {
            *lock(&handle.reason) = Some(reason.to_string());
            handle.cancelled.store(true, Ordering::SeqCst);
            job.warn(format!("cancellation requested: {reason}"));
        }
        log::info!("Cancel requested for job {job_id}: {reason}");
        Ok(job.status)
    }

    pub fn progress(&self, job_id: &str) -> Result<ProgressSnapshot> {
        Ok(lock(&self.handle(job_id)?.job).progress())
    }

    pub fn logs(&self, job_id: &str) -> Result<JobLogs> {
        Ok(lock(&self.handle(job_id)?.job).job_logs())
    }

    /// Copy of the current job record
    pub fn job(&self, job_id: &str) -> Result<MigrationJob> {
        Ok(lock(&self.handle(job_id)?.job).clone())
    }

    /// Resolve the migration order for an intent without running anything
    pub fn plan(&self, intent: &JobIntent) -> Result<MigrationOrder> {
        let snapshot = self.source_snapshot(intent)?;
        Ok(resolve(&snapshot)?)
    }

    /// Compare every selected source resource with the target
    ///
    /// Resources present only on the target are reported as drift.
    /// Resources that fail transformation are skipped with a warning.
    pub fn diff(&self, intent: &JobIntent) -> Result<Vec<ChangeRecord>> {
        let kinds = intent.selected_kinds();
        let snapshot = self.source_snapshot(intent)?;
        let mut target: BTreeMap<ResourceRef, ResourceNode> =
            filter_kinds(self.target.fetch_snapshot(&intent.target, &kinds)?, &kinds)
                .into_iter()
                .map(|n| (n.reference.clone(), n))
                .collect();

        let mut records = Vec::new();
        for node in &snapshot {
            let transformed = match self.transformer.transform(node) {
                Ok(t) => t.node,
                Err(e) => {
                    log::warn!("Skipping {}: {e}", node.reference);
                    continue;
                }
            };
            let current = target.remove(&node.reference.in_env(&intent.target.env));
            records.push(self.engine.compare(Some(&transformed), current.as_ref()));
        }
        for node in target.values() {
            records.push(self.engine.compare(None, Some(node)));
        }

        records.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(records)
    }

    fn source_snapshot(&self, intent: &JobIntent) -> Result<Vec<ResourceNode>> {
        let kinds = intent.selected_kinds();
        let snapshot = self.source.fetch_snapshot(&intent.source, &kinds)?;
        Ok(filter_kinds(snapshot, &kinds))
    }

    /// Transform, diff and (unless dry run) write one resource
    fn migrate_resource(&self, node: &ResourceNode, intent: &JobIntent) -> ResourceOutcome {
        let reference = &node.reference;
        log::debug!("Migrating {reference}");

        let transformed = match self.transformer.transform(node) {
            Ok(t) => t,
            Err(e) => return ResourceOutcome::failed(reference.clone(), e.category(), e.to_string()),
        };

        let target_ref = reference.in_env(&intent.target.env);
        let subject = target_ref.to_string();
        let callback = LogCallback { subject: &subject };

        let current = match with_retry(&self.settings.retry, Some(&callback), || {
            self.target.fetch_resource(&intent.target, &target_ref)
        }) {
            Ok(current) => current,
            Err(e) => return gateway_failure(reference, &e, transformed.warnings),
        };

        let record = self.engine.compare(Some(&transformed.node), current.as_ref());
        let kind = if !record.requires_action {
            OutcomeKind::Unchanged
        } else if intent.dry_run {
            OutcomeKind::Planned
        } else {
            match with_retry(&self.settings.retry, Some(&callback), || {
                self.gateway
                    .create_or_update(&intent.target, &target_ref, &transformed.node.payload)
            }) {
                Ok(WriteOutcome::Created) => OutcomeKind::Created,
                Ok(WriteOutcome::Updated) => OutcomeKind::Updated,
                Err(e) => return gateway_failure(reference, &e, transformed.warnings),
            }
        };
        log::debug!("{reference}: {kind:?}");

        ResourceOutcome {
            changes: record.changes.len(),
            warnings: transformed.warnings,
            ..ResourceOutcome::new(reference.clone(), kind)
        }
    }

    fn handle(&self, job_id: &str) -> Result<Arc<JobHandle>> {
        if let Some(handle) = lock(&self.jobs).get(job_id) {
            return Ok(Arc::clone(handle));
        }

        let job = self.store.load(job_id).map_err(|e| match e {
            StoreError::NotFound(_) => MigrateError::Job {
                id: job_id.to_string(),
                message: "no such job".to_string(),
            },
            other => other.into(),
        })?;
        let handle = Arc::new(JobHandle::new(job));
        Ok(Arc::clone(
            lock(&self.jobs).entry(job_id.to_string()).or_insert(handle),
        ))
    }

    /// Fail a running job before any resource work
    fn fail(&self, handle: &JobHandle, reason: String) {
        log::error!("{reason}");
        let mut job = lock(&handle.job);
        job.abort(reason);
        self.save(&job);
        self.progress.on_job_complete(&job.progress());
    }

    fn save(&self, job: &MigrationJob) {
        if let Err(e) = self.store.save(job) {
            log::warn!("Failed to save job {}: {e}", job.id);
        }
    }
}

fn gateway_failure(
    reference: &ResourceRef,
    error: &GatewayError,
    warnings: Vec<String>,
) -> ResourceOutcome {
    let message = match error {
        GatewayError::NotFound { missing } => format!("missing dependency {missing}"),
        other => other.to_string(),
    };
    ResourceOutcome {
        warnings,
        ..ResourceOutcome::failed(reference.clone(), Some(error.category()), message)
    }
}
