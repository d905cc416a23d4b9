//! Core types for gateway resource migration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::MigrateError;

/// Category of gateway configuration object
///
/// The declaration order is the ordering used for tie-breaks inside a
/// migration level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Proxy,
    SharedFlow,
    TargetServer,
    Kvm,
    ApiProduct,
    Developer,
    DeveloperApp,
}

impl ResourceKind {
    /// Every kind, in declaration order
    pub const ALL: [Self; 7] = [
        Self::Proxy,
        Self::SharedFlow,
        Self::TargetServer,
        Self::Kvm,
        Self::ApiProduct,
        Self::Developer,
        Self::DeveloperApp,
    ];

    /// Canonical identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proxy => "proxy",
            Self::SharedFlow => "shared_flow",
            Self::TargetServer => "target_server",
            Self::Kvm => "kvm",
            Self::ApiProduct => "api_product",
            Self::Developer => "developer",
            Self::DeveloperApp => "developer_app",
        }
    }

    /// Human-readable plural label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proxy => "API proxies",
            Self::SharedFlow => "Shared flows",
            Self::TargetServer => "Target servers",
            Self::Kvm => "Key-value maps",
            Self::ApiProduct => "API products",
            Self::Developer => "Developers",
            Self::DeveloperApp => "Developer apps",
        }
    }

    /// Kinds that never depend on anything, whatever their payload says
    pub fn is_independent_leaf(&self) -> bool {
        matches!(self, Self::TargetServer | Self::Kvm)
    }

    /// Kinds whose every resource must be migrated before this kind
    ///
    /// Shared flows come before proxies, proxies before products and
    /// developers, and apps after everything they can be granted or owned by.
    pub fn prerequisite_kinds(&self) -> &'static [Self] {
        match self {
            Self::Proxy => &[Self::SharedFlow],
            Self::ApiProduct | Self::Developer => &[Self::Proxy],
            Self::DeveloperApp => &[Self::Proxy, Self::ApiProduct, Self::Developer],
            Self::SharedFlow | Self::TargetServer | Self::Kvm => &[],
        }
    }

    /// Default scope for a resource of this kind read from `env`
    pub fn default_scope(&self, env: Option<&str>) -> Scope {
        match (self, env) {
            (Self::TargetServer | Self::Kvm, Some(env)) => Scope::Environment(env.to_string()),
            _ => Scope::Organization,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = MigrateError;

    /// Normalize the names used by the gateway APIs and export files
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "proxy" | "proxies" | "api_proxy" | "api_proxies" | "apis" | "apiproxies" => {
                Self::Proxy
            }
            "shared_flow" | "shared_flows" | "sharedflow" | "sharedflows" => Self::SharedFlow,
            "target_server" | "target_servers" | "targetserver" | "targetservers" => {
                Self::TargetServer
            }
            "kvm" | "kvms" | "keyvaluemap" | "keyvaluemaps" | "key_value_map"
            | "key_value_maps" => Self::Kvm,
            "api_product" | "api_products" | "apiproduct" | "apiproducts" | "product"
            | "products" => Self::ApiProduct,
            "developer" | "developers" => Self::Developer,
            "developer_app" | "developer_apps" | "developerapp" | "developerapps" | "app"
            | "apps" => Self::DeveloperApp,
            _ => return Err(MigrateError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Level at which a resource lives on the gateway
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Organization,
    Environment(String),
}

impl Scope {
    /// Environment name, if environment-scoped
    pub fn env(&self) -> Option<&str> {
        match self {
            Self::Organization => None,
            Self::Environment(env) => Some(env),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization => f.write_str("org"),
            Self::Environment(env) => write!(f, "env:{env}"),
        }
    }
}

/// Identity of one gateway resource
///
/// Two refs are equal iff kind, name and scope all match. Ordering is by
/// kind, then name, then scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub scope: Scope,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>, scope: Scope) -> Self {
        Self {
            kind,
            name: name.into(),
            scope,
        }
    }

    /// Organization-level ref
    pub fn org(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::new(kind, name, Scope::Organization)
    }

    /// Environment-level ref
    pub fn env(kind: ResourceKind, name: impl Into<String>, env: impl Into<String>) -> Self {
        Self::new(kind, name, Scope::Environment(env.into()))
    }

    /// The same resource as seen from environment `env`
    ///
    /// Organization-level refs are returned unchanged.
    #[must_use]
    pub fn in_env(&self, env: &str) -> Self {
        match self.scope {
            Scope::Organization => self.clone(),
            Scope::Environment(_) => Self::env(self.kind, self.name.clone(), env),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Organization => write!(f, "{}/{}", self.kind, self.name),
            Scope::Environment(env) => write!(f, "{}/{}@{}", self.kind, self.name, env),
        }
    }
}

/// A resource with its configuration document and outgoing references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub reference: ResourceRef,
    pub payload: Value,
    /// Resources this one depends on (dependent → dependency)
    #[serde(default)]
    pub references: BTreeSet<ResourceRef>,
}

impl ResourceNode {
    /// Create a node with explicit references
    pub fn new(reference: ResourceRef, payload: Value) -> Self {
        Self {
            reference,
            payload,
            references: BTreeSet::new(),
        }
    }

    /// Add a dependency
    pub fn depends_on(mut self, dependency: ResourceRef) -> Self {
        self.references.insert(dependency);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.reference.kind
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }
}

/// Resources grouped into levels that can be migrated in sequence
///
/// Every dependency of a resource in level `k` lives in some level below
/// `k`; resources sharing a level have no dependency between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOrder {
    pub levels: Vec<Vec<ResourceRef>>,
    /// Dangling or ignored references found while resolving
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl MigrationOrder {
    /// Total number of resources across all levels
    pub fn total_resources(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Index of the level containing `reference`
    pub fn level_of(&self, reference: &ResourceRef) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.binary_search(reference).is_ok())
    }

    /// All refs in migration order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRef> {
        self.levels.iter().flatten()
    }
}
