//! Error types for migration operations.
//!
//! Gateway errors are categorized so the orchestrator can decide what to
//! retry and how to report a failure. Resource-level errors are recorded on
//! the job; only planning and store errors abort a run.

use crate::types::ResourceRef;
use thiserror::Error;

/// Categories of gateway errors for retry logic and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials rejected or missing permission
    Auth,
    /// A prerequisite resource does not exist on the target
    NotFound,
    /// Resource state conflicts with the request
    Conflict,
    /// Network, timeout, rate limit or server-side hiccup (retryable)
    Transient,
    /// Malformed payload
    Validation,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Auth => "Authentication failed",
            Self::NotFound => "Missing dependency",
            Self::Conflict => "Resource conflict",
            Self::Transient => "Transient gateway failure",
            Self::Validation => "Invalid resource payload",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Auth => "Refresh the access token or check the account's roles",
            Self::NotFound => {
                "Migrate the missing prerequisite first, then re-run the job"
            }
            Self::Conflict => "Inspect the target resource and resolve the conflict",
            Self::Transient => "Check connectivity and re-run; completed resources are skipped",
            Self::Validation => "Fix the source payload and re-run",
        }
    }
}

/// Errors returned by gateway collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Something the request depends on is absent
    #[error("not found: {missing}")]
    NotFound { missing: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Network error, timeout, rate limiting or 5xx
    #[error("transient error: {message}")]
    Transient { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },
}

impl GatewayError {
    /// Missing-dependency error naming the absent resource
    pub fn missing(reference: &ResourceRef) -> Self {
        Self::NotFound {
            missing: reference.to_string(),
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth { .. } => ErrorCategory::Auth,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Validation { .. } => ErrorCategory::Validation,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from a management API status code and body.
    pub fn from_status(status: u16, body: &str, subject: &str) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {status} for {subject}")
        } else {
            format!("HTTP {status} for {subject}: {}", body.trim())
        };

        match status {
            401 | 403 => Self::Auth { message },
            404 => Self::NotFound {
                missing: subject.to_string(),
            },
            409 => Self::Conflict { message },
            408 | 429 | 500..=599 => Self::Transient { message },
            _ => Self::Validation { message },
        }
    }

    /// Create an error from the status of a create or update call
    ///
    /// A 404 here means the gateway lacks something `subject` points at,
    /// not `subject` itself.
    pub fn from_write_status(status: u16, body: &str, subject: &str) -> Self {
        if status != 404 {
            return Self::from_status(status, body, subject);
        }
        let missing = if body.trim().is_empty() {
            format!("an unknown prerequisite of {subject}")
        } else {
            format!("a prerequisite of {subject} ({})", body.trim())
        };
        Self::NotFound { missing }
    }
}

/// The dependency graph is not acyclic.
///
/// `members` lists every resource lying on some cycle, sorted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("dependency cycle between: {}", format_refs(.members))]
pub struct CycleError {
    pub members: Vec<ResourceRef>,
}

fn format_refs(refs: &[ResourceRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from job persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level error for migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Malformed resource payload
    #[error("invalid {reference}: {message}")]
    Validation { reference: String, message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Operation on a job the orchestrator does not know
    #[error("job {id}: {message}")]
    Job { id: String, message: String },

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("{0}")]
    Other(String),
}

impl MigrateError {
    pub fn validation(reference: &ResourceRef, message: impl Into<String>) -> Self {
        Self::Validation {
            reference: reference.to_string(),
            message: message.into(),
        }
    }

    /// Category when the error maps onto a gateway failure class.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Gateway(e) => Some(e.category()),
            Self::Validation { .. } => Some(ErrorCategory::Validation),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
