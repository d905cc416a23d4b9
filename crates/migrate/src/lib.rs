//! # Migrate
//!
//! Core engine for moving API-gateway configuration from an Edge
//! organization to an X organization.
//!
//! ## Core Concepts
//!
//! - **ResourceNode**: One gateway resource (proxy, shared flow, target
//!   server, KVM, API product, developer, developer app) with its payload
//!   and the resources it references
//! - **MigrationOrder**: Levels of resources; everything a resource depends
//!   on sits in an earlier level
//! - **DiffEngine**: Structural comparison of source and target payloads
//!   deciding whether a resource needs to be written
//! - **Orchestrator**: Runs migration jobs level by level with bounded
//!   parallelism, retries and cancellation
//!
//! ## Example
//!
//! ```ignore
//! use migrate::{Endpoint, JobIntent, MemoryGateway, MemoryJobStore, Orchestrator, Settings};
//! use std::sync::Arc;
//!
//! let edge = Arc::new(MemoryGateway::new());
//! let x = Arc::new(MemoryGateway::new());
//! let orchestrator = Orchestrator::new(
//!     edge,
//!     x.clone(),
//!     x,
//!     Arc::new(MemoryJobStore::new()),
//!     Settings::default(),
//! );
//!
//! let intent = JobIntent::new(Endpoint::new("edge-org", "prod"), Endpoint::new("x-org", "prod"));
//! let job = orchestrator.create_job("nightly", intent)?;
//! let status = orchestrator.start(&job.id)?;
//! ```
//!
//! ## Collaborator Traits
//!
//! - [`ResourceSource`]: Reads snapshots from a gateway or export
//! - [`GatewayClient`]: Creates or updates resources on the target
//! - [`JobStore`]: Persists job records
//! - [`ProgressCallback`]: Receives progress updates
//!
//! [`MemoryGateway`] and [`MemoryJobStore`] implement them in memory.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod job;
pub mod memory;
pub mod planner;
pub mod resource;
pub mod retry;
pub mod transform;
pub mod types;

// Re-export main types at crate root
pub use context::{
    GatewayClient, JobStore, MemoryJobStore, NoProgress, ProgressCallback, ResourceSource,
    WriteOutcome,
};
pub use diff::{
    Change, ChangeKind, ChangeRecord, DiffEngine, DiffOptions, DiffSummary, Presence,
    group_by_kind,
};
pub use error::{CycleError, ErrorCategory, GatewayError, MigrateError, Result, StoreError};
pub use executor::{Orchestrator, Settings};
pub use job::{
    Endpoint, JobIntent, JobLogs, JobStatus, LogLevel, MigrationJob, OutcomeKind,
    ProgressSnapshot, ResourceOutcome,
};
pub use memory::MemoryGateway;
pub use planner::{DependencyGraph, filter_kinds, resolve};
pub use retry::{RetryCallback, RetryPolicy, with_retry};
pub use transform::{TransformOptions, TransformOutput, Transformer};
pub use types::{MigrationOrder, ResourceKind, ResourceNode, ResourceRef, Scope};
