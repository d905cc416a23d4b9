//! Resource model: building nodes from gateway payloads
//!
//! A payload is the configuration document of one resource as read from the
//! gateway (or an export of it). The references a resource makes to other
//! resources are discovered from well-known fields:
//!
//! - proxies and shared flows reference target servers, key-value maps (via
//!   `KeyValueMapOperations` policies) and shared flows (via `FlowCallout`)
//! - API products reference proxies
//! - developer apps reference API products and their developer

use crate::error::{MigrateError, Result};
use crate::types::{ResourceKind, ResourceNode, ResourceRef, Scope};
use serde_json::Value;
use std::collections::BTreeSet;

/// Policy type that reads or writes a key-value map
const KVM_POLICY: &str = "KeyValueMapOperations";
/// Policy type that calls a shared flow
const FLOW_CALLOUT_POLICY: &str = "FlowCallout";

impl ResourceNode {
    /// Build a node from a payload, discovering its references
    ///
    /// `env` is the environment the payload was read from; it decides the
    /// scope of environment-level kinds.
    pub fn from_payload(kind: ResourceKind, env: Option<&str>, payload: Value) -> Result<Self> {
        let name = resource_name(kind, &payload).ok_or_else(|| {
            MigrateError::Other(format!("{kind} payload has no name field"))
        })?;
        let scope = payload_scope(kind, env, &payload);
        let references = discover_references(kind, env, &payload);

        Ok(Self {
            reference: ResourceRef::new(kind, name, scope),
            payload,
            references,
        })
    }

    /// Second name the gateway accepts for this resource
    ///
    /// Apps may name their developer by `developerId` instead of email.
    pub fn alias(&self) -> Option<&str> {
        if self.kind() != ResourceKind::Developer {
            return None;
        }
        self.payload
            .get("developerId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty() && *id != self.reference.name)
    }
}

/// Name of a resource as carried by its payload
///
/// Developers are identified by email; everything else by `name`.
pub fn resource_name(kind: ResourceKind, payload: &Value) -> Option<String> {
    let fields: &[&str] = match kind {
        ResourceKind::Developer => &["email", "name"],
        _ => &["name"],
    };
    fields
        .iter()
        .filter_map(|f| payload.get(f).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Scope of a payload, honoring an explicit `scope` field on KVMs
fn payload_scope(kind: ResourceKind, env: Option<&str>, payload: &Value) -> Scope {
    if kind == ResourceKind::Kvm
        && payload.get("scope").and_then(Value::as_str) == Some("organization")
    {
        return Scope::Organization;
    }
    kind.default_scope(env)
}

/// Discover the resources a payload references
pub fn discover_references(
    kind: ResourceKind,
    env: Option<&str>,
    payload: &Value,
) -> BTreeSet<ResourceRef> {
    let mut refs = BTreeSet::new();
    let mut add = |target: ResourceKind, name: &str| {
        let name = name.trim();
        if !name.is_empty() {
            refs.insert(ResourceRef::new(target, name, target.default_scope(env)));
        }
    };

    match kind {
        ResourceKind::Proxy | ResourceKind::SharedFlow => {
            for name in string_list(payload, &["target_servers", "targetServers"]) {
                add(ResourceKind::TargetServer, &name);
            }
            for policy in array(payload, &["policies"]) {
                let policy_type = policy.get("type").and_then(Value::as_str).unwrap_or("");
                let policy_name = policy.get("name").and_then(Value::as_str).unwrap_or("");
                match policy_type {
                    KVM_POLICY => {
                        let map = policy
                            .get("mapIdentifier")
                            .and_then(Value::as_str)
                            .unwrap_or_else(|| {
                                policy_name.strip_prefix("KVM-").unwrap_or(policy_name)
                            });
                        add(ResourceKind::Kvm, map);
                    }
                    FLOW_CALLOUT_POLICY => {
                        let flow = policy
                            .get("sharedFlowBundle")
                            .and_then(Value::as_str)
                            .unwrap_or(policy_name);
                        add(ResourceKind::SharedFlow, flow);
                    }
                    _ => {}
                }
            }
        }
        ResourceKind::ApiProduct => {
            for name in string_list(payload, &["proxies"]) {
                add(ResourceKind::Proxy, &name);
            }
        }
        ResourceKind::DeveloperApp => {
            for product in array(payload, &["apiProducts", "api_products"]) {
                let name = product.as_str().or_else(|| {
                    product
                        .get("apiproduct")
                        .or_else(|| product.get("name"))
                        .and_then(Value::as_str)
                });
                if let Some(name) = name {
                    add(ResourceKind::ApiProduct, name);
                }
            }
            if let Some(developer) = ["developerEmail", "developer_email", "developerId"]
                .iter()
                .find_map(|f| payload.get(f).and_then(Value::as_str))
            {
                add(ResourceKind::Developer, developer);
            }
        }
        ResourceKind::TargetServer | ResourceKind::Kvm | ResourceKind::Developer => {}
    }

    refs
}

/// First array found under any of `fields`
fn array<'a>(payload: &'a Value, fields: &[&str]) -> &'a [Value] {
    fields
        .iter()
        .find_map(|f| payload.get(f).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Strings from the first array found under any of `fields`
fn string_list(payload: &Value, fields: &[&str]) -> Vec<String> {
    array(payload, fields)
        .iter()
        .filter_map(Value::as_str)
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_proxy_references() {
        let node = ResourceNode::from_payload(
            ResourceKind::Proxy,
            Some("prod"),
            json!({
                "name": "orders",
                "target_servers": ["orders-backend"],
                "policies": [
                    {"name": "KVM-settings", "type": "KeyValueMapOperations"},
                    {"name": "FC-auth", "type": "FlowCallout", "sharedFlowBundle": "auth"},
                    {"name": "Quota-1", "type": "Quota"}
                ]
            }),
        )
        .unwrap();

        assert_eq!(node.reference, ResourceRef::org(ResourceKind::Proxy, "orders"));
        let expected: BTreeSet<_> = [
            ResourceRef::org(ResourceKind::SharedFlow, "auth"),
            ResourceRef::env(ResourceKind::TargetServer, "orders-backend", "prod"),
            ResourceRef::env(ResourceKind::Kvm, "settings", "prod"),
        ]
        .into_iter()
        .collect();
        assert_eq!(node.references, expected);
    }

    #[test]
    fn test_app_references() {
        let node = ResourceNode::from_payload(
            ResourceKind::DeveloperApp,
            None,
            json!({
                "name": "mobile",
                "developerEmail": "dev@example.com",
                "apiProducts": ["gold", {"apiproduct": "silver", "status": "approved"}]
            }),
        )
        .unwrap();

        assert!(node
            .references
            .contains(&ResourceRef::org(ResourceKind::ApiProduct, "gold")));
        assert!(node
            .references
            .contains(&ResourceRef::org(ResourceKind::ApiProduct, "silver")));
        assert!(node
            .references
            .contains(&ResourceRef::org(ResourceKind::Developer, "dev@example.com")));
    }

    #[test]
    fn test_developer_named_by_email() {
        let node = ResourceNode::from_payload(
            ResourceKind::Developer,
            None,
            json!({"email": "dev@example.com", "firstName": "Dev"}),
        )
        .unwrap();
        assert_eq!(node.name(), "dev@example.com");
    }

    #[test]
    fn test_developer_alias_is_developer_id() {
        let developer = ResourceNode::from_payload(
            ResourceKind::Developer,
            None,
            json!({"email": "dev@example.com", "developerId": "abc123"}),
        )
        .unwrap();
        assert_eq!(developer.alias(), Some("abc123"));

        let proxy = ResourceNode::from_payload(
            ResourceKind::Proxy,
            None,
            json!({"name": "orders", "developerId": "abc123"}),
        )
        .unwrap();
        assert_eq!(proxy.alias(), None);
    }

    #[test]
    fn test_org_scoped_kvm() {
        let node = ResourceNode::from_payload(
            ResourceKind::Kvm,
            Some("prod"),
            json!({"name": "global", "scope": "organization"}),
        )
        .unwrap();
        assert_eq!(node.reference.scope, Scope::Organization);
    }

    #[test]
    fn test_missing_name_is_error() {
        let result = ResourceNode::from_payload(ResourceKind::Proxy, None, json!({"revision": "1"}));
        assert!(result.is_err());
    }
}
