//! Migration job record
//!
//! A job carries an immutable intent (what to move, from where, to where)
//! and the mutable execution state written by the orchestrator.

use crate::error::ErrorCategory;
use crate::types::{ResourceKind, ResourceRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of trailing log lines included in a progress snapshot
pub const PROGRESS_LOG_TAIL: usize = 10;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    PartiallyFailed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyFailed => "partially_failed",
        }
    }

    /// Whether the job has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::PartiallyFailed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organization/environment pair on one gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub org: String,
    pub env: String,
}

impl Endpoint {
    pub fn new(org: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            env: env.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.env)
    }
}

/// What a job migrates; fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIntent {
    pub source: Endpoint,
    pub target: Endpoint,
    /// Kinds to migrate; empty means every kind
    #[serde(default)]
    pub kinds: Vec<ResourceKind>,
    #[serde(default)]
    pub dry_run: bool,
}

impl JobIntent {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            kinds: Vec::new(),
            dry_run: false,
        }
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Kinds selected by this intent, sorted and deduplicated
    pub fn selected_kinds(&self) -> Vec<ResourceKind> {
        if self.kinds.is_empty() {
            return ResourceKind::ALL.to_vec();
        }
        let mut kinds = self.kinds.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

/// Severity of a job log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        }
    }
}

/// Format a job log line: `[YYYY-mm-dd HH:MM:SS] LEVEL: message`
pub fn format_log_line(at: DateTime<Utc>, level: LogLevel, message: &str) -> String {
    format!(
        "[{}] {}: {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        level.as_str(),
        message
    )
}

/// What happened to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Created,
    Updated,
    /// Target already matched the source
    Unchanged,
    /// Dry run: the change was recorded but not applied
    Planned,
    Failed,
}

impl OutcomeKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Per-resource result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub reference: ResourceRef,
    pub kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    /// Number of field-level changes found against the target
    #[serde(default)]
    pub changes: usize,
    /// Transformation notes for this resource
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ResourceOutcome {
    pub fn new(reference: ResourceRef, kind: OutcomeKind) -> Self {
        Self {
            reference,
            kind,
            message: None,
            category: None,
            changes: 0,
            warnings: Vec::new(),
        }
    }

    pub fn failed(reference: ResourceRef, category: Option<ErrorCategory>, message: String) -> Self {
        Self {
            category,
            message: Some(message),
            ..Self::new(reference, OutcomeKind::Failed)
        }
    }
}

/// A migration job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: String,
    pub name: String,
    pub intent: JobIntent,
    pub status: JobStatus,
    pub total_resources: usize,
    pub completed_resources: usize,
    pub failed_resources: usize,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub outcomes: Vec<ResourceOutcome>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationJob {
    /// A new pending job with a fresh id
    pub fn new(name: impl Into<String>, intent: JobIntent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            intent,
            status: JobStatus::Pending,
            total_resources: 0,
            completed_resources: 0,
            failed_resources: 0,
            logs: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            outcomes: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Append a log line; errors and warnings also go to their own lists
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.logs.push(format_log_line(Utc::now(), level, &message));
        match level {
            LogLevel::Error => self.errors.push(message),
            LogLevel::Warning => self.warnings.push(message),
            LogLevel::Info | LogLevel::Success => {}
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the job failed before or during execution
    pub(crate) fn abort(&mut self, reason: impl Into<String>) {
        self.error(reason);
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Record the outcome of one resource with its log lines and counters
    pub(crate) fn record(&mut self, outcome: ResourceOutcome) {
        let reference = &outcome.reference;
        for warning in &outcome.warnings {
            self.warnings.push(warning.clone());
            self.logs
                .push(format_log_line(Utc::now(), LogLevel::Warning, warning));
        }

        let line = match outcome.kind {
            OutcomeKind::Created => format!("created {reference}"),
            OutcomeKind::Updated => format!("updated {reference} ({} changes)", outcome.changes),
            OutcomeKind::Unchanged => format!("{reference} is up to date"),
            OutcomeKind::Planned => {
                format!("dry run: {reference} would change ({} changes)", outcome.changes)
            }
            OutcomeKind::Failed => format!(
                "failed {reference}: {}",
                outcome.message.as_deref().unwrap_or("unknown error")
            ),
        };

        if outcome.kind.is_failure() {
            self.failed_resources += 1;
            self.error(line);
        } else {
            self.completed_resources += 1;
            match outcome.kind {
                OutcomeKind::Created | OutcomeKind::Updated => self.success(line),
                _ => self.info(line),
            }
        }
        self.outcomes.push(outcome);
    }

    /// Settle the terminal status from the counters
    pub(crate) fn finish(&mut self) {
        self.status = if self.failed_resources == 0 {
            JobStatus::Completed
        } else if self.failed_resources == self.total_resources {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyFailed
        };
        self.completed_at = Some(Utc::now());

        let summary = format!(
            "job finished: {} ({} completed, {} failed of {})",
            self.status, self.completed_resources, self.failed_resources, self.total_resources
        );
        match self.status {
            JobStatus::Completed => self.success(summary),
            _ => self.error(summary),
        }
    }

    /// Completion percentage; zero when there is nothing to do
    pub fn percentage(&self) -> f64 {
        if self.total_resources == 0 {
            0.0
        } else {
            self.completed_resources as f64 / self.total_resources as f64 * 100.0
        }
    }

    /// Outcome recorded for `reference`, if any
    pub fn outcome(&self, reference: &ResourceRef) -> Option<&ResourceOutcome> {
        self.outcomes.iter().find(|o| &o.reference == reference)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let tail = self.logs.len().saturating_sub(PROGRESS_LOG_TAIL);
        ProgressSnapshot {
            job_id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            total_resources: self.total_resources,
            completed_resources: self.completed_resources,
            failed_resources: self.failed_resources,
            percentage: self.percentage(),
            logs: self.logs[tail..].to_vec(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }

    pub fn job_logs(&self) -> JobLogs {
        JobLogs {
            logs: self.logs.clone(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
        }
    }
}

/// Point-in-time view of a job's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: String,
    pub name: String,
    pub status: JobStatus,
    pub total_resources: usize,
    pub completed_resources: usize,
    pub failed_resources: usize,
    pub percentage: f64,
    /// Most recent log lines
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Full log view of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogs {
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}
