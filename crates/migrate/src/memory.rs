//! In-memory gateway
//!
//! Serves as both a resource source and a gateway client. Writes are
//! checked against the references of the payload so a resource whose
//! prerequisite was never migrated fails the way a real gateway would.

use crate::context::{GatewayClient, ResourceSource, WriteOutcome, lock};
use crate::error::{GatewayError, Result};
use crate::job::Endpoint;
use crate::types::{ResourceKind, ResourceNode, ResourceRef, Scope};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct ScriptedFailure {
    error: GatewayError,
    /// Failures left before writes succeed again; `None` fails forever
    remaining: Option<usize>,
}

/// Gateway kept in memory, keyed by organization
#[derive(Default)]
pub struct MemoryGateway {
    orgs: Mutex<BTreeMap<String, BTreeMap<ResourceRef, ResourceNode>>>,
    failures: Mutex<BTreeMap<ResourceRef, ScriptedFailure>>,
    writes: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node as-is
    pub fn insert(&self, org: &str, node: ResourceNode) {
        lock(&self.orgs)
            .entry(org.to_string())
            .or_default()
            .insert(node.reference.clone(), node);
    }

    /// Store a payload read from `endpoint`, discovering its references
    pub fn insert_payload(
        &self,
        endpoint: &Endpoint,
        kind: ResourceKind,
        payload: Value,
    ) -> Result<ResourceRef> {
        let node = ResourceNode::from_payload(kind, Some(&endpoint.env), payload)?;
        let reference = node.reference.clone();
        self.insert(&endpoint.org, node);
        Ok(reference)
    }

    pub fn get(&self, org: &str, reference: &ResourceRef) -> Option<ResourceNode> {
        lock(&self.orgs)
            .get(org)
            .and_then(|resources| resources.get(reference))
            .cloned()
    }

    /// Refs stored for `org`, sorted
    pub fn references(&self, org: &str) -> Vec<ResourceRef> {
        lock(&self.orgs)
            .get(org)
            .map(|resources| resources.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every write of `reference` fail with `error`
    pub fn fail_writes(&self, reference: ResourceRef, error: GatewayError) {
        lock(&self.failures).insert(
            reference,
            ScriptedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// Make the next `times` writes of `reference` fail with `error`
    pub fn fail_writes_times(&self, reference: ResourceRef, error: GatewayError, times: usize) {
        lock(&self.failures).insert(
            reference,
            ScriptedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Number of `create_or_update` calls received, failed ones included
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self, reference: &ResourceRef) -> Option<GatewayError> {
        let mut failures = lock(&self.failures);
        let failure = failures.get_mut(reference)?;
        match failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => {
                failures.remove(reference);
                None
            }
            Some(n) => {
                failure.remaining = Some(n - 1);
                Some(failure.error.clone())
            }
        }
    }
}

/// Whether `resources` holds `wanted` as seen from environment `env`
fn visible(resources: &BTreeMap<ResourceRef, ResourceNode>, wanted: &ResourceRef, env: &str) -> bool {
    resources.iter().any(|(r, node)| {
        r.kind == wanted.kind
            && (r.name == wanted.name || node.alias() == Some(wanted.name.as_str()))
            && match &r.scope {
                Scope::Organization => true,
                Scope::Environment(e) => e == env,
            }
    })
}

impl ResourceSource for MemoryGateway {
    fn fetch_snapshot(
        &self,
        endpoint: &Endpoint,
        kinds: &[ResourceKind],
    ) -> std::result::Result<Vec<ResourceNode>, GatewayError> {
        let orgs = lock(&self.orgs);
        let Some(resources) = orgs.get(&endpoint.org) else {
            return Ok(Vec::new());
        };
        Ok(resources
            .values()
            .filter(|node| kinds.contains(&node.kind()))
            .filter(|node| {
                node.reference
                    .scope
                    .env()
                    .is_none_or(|env| env == endpoint.env)
            })
            .cloned()
            .collect())
    }

    fn fetch_resource(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
    ) -> std::result::Result<Option<ResourceNode>, GatewayError> {
        Ok(self.get(&endpoint.org, reference))
    }
}

impl GatewayClient for MemoryGateway {
    fn create_or_update(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
        payload: &Value,
    ) -> std::result::Result<WriteOutcome, GatewayError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.scripted_failure(reference) {
            return Err(error);
        }

        let mut node = ResourceNode::from_payload(reference.kind, Some(&endpoint.env), payload.clone())
            .map_err(|e| GatewayError::Validation {
                message: e.to_string(),
            })?;
        node.reference = reference.clone();

        let mut orgs = lock(&self.orgs);
        let resources = orgs.entry(endpoint.org.clone()).or_default();
        if let Some(missing) = node
            .references
            .iter()
            .find(|dep| !visible(resources, dep, &endpoint.env))
        {
            return Err(GatewayError::missing(missing));
        }

        match resources.insert(reference.clone(), node) {
            Some(_) => Ok(WriteOutcome::Updated),
            None => Ok(WriteOutcome::Created),
        }
    }
}
