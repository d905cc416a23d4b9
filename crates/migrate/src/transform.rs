//! Edge → X payload transformation
//!
//! Source payloads are rewritten into the shape the target platform accepts
//! before they are diffed against the target or written to it.

use crate::error::{MigrateError, Result};
use crate::resource::resource_name;
use crate::types::{ResourceKind, ResourceNode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Policy types the target platform does not support
pub const UNSUPPORTED_POLICIES: &[&str] = &["SOAPMessageValidation", "XMLToJSON", "JSONToXML"];

/// Policy types that must become extension callouts
pub const CONVERTED_CALLOUTS: &[&str] = &["JavaCallout", "Python"];

/// Options controlling the transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    pub remove_unsupported_policies: bool,
    pub convert_callouts: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            remove_unsupported_policies: true,
            convert_callouts: true,
        }
    }
}

/// A transformed node with the notes produced along the way
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub node: ResourceNode,
    pub warnings: Vec<String>,
}

/// Rewrites source payloads into target-platform payloads
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    options: TransformOptions,
}

impl Transformer {
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    /// Transform one node
    ///
    /// Fails with a validation error when the payload is malformed; the
    /// references of the node are left untouched.
    pub fn transform(&self, node: &ResourceNode) -> Result<TransformOutput> {
        let reference = &node.reference;
        let Some(object) = node.payload.as_object() else {
            return Err(MigrateError::validation(reference, "payload is not a JSON object"));
        };
        if resource_name(reference.kind, &node.payload).is_none() {
            return Err(MigrateError::validation(reference, "payload has no name"));
        }

        let mut payload = Value::Object(object.clone());
        let mut warnings = Vec::new();

        match reference.kind {
            ResourceKind::Proxy | ResourceKind::SharedFlow => {
                self.transform_policies(&mut payload, &mut warnings);
            }
            ResourceKind::TargetServer => {
                transform_target_server(node, &mut payload)?;
            }
            ResourceKind::Kvm => {
                if payload.get("encrypted").is_none() {
                    payload["encrypted"] = json!(true);
                    warnings.push("stored as an encrypted map".to_string());
                }
            }
            ResourceKind::ApiProduct | ResourceKind::Developer | ResourceKind::DeveloperApp => {}
        }

        let warnings = warnings
            .into_iter()
            .map(|w| format!("{reference}: {w}"))
            .collect::<Vec<_>>();
        for warning in &warnings {
            log::warn!("{warning}");
        }

        Ok(TransformOutput {
            node: ResourceNode {
                reference: reference.clone(),
                payload,
                references: node.references.clone(),
            },
            warnings,
        })
    }

    fn transform_policies(&self, payload: &mut Value, warnings: &mut Vec<String>) {
        let Some(policies) = payload.get_mut("policies").and_then(Value::as_array_mut) else {
            return;
        };

        if self.options.remove_unsupported_policies {
            policies.retain(|policy| {
                let policy_type = policy_type(policy);
                let unsupported = UNSUPPORTED_POLICIES.contains(&policy_type);
                if unsupported {
                    warnings.push(format!(
                        "removed unsupported {} policy '{}'",
                        policy_type,
                        policy_name(policy)
                    ));
                }
                !unsupported
            });
        }

        if self.options.convert_callouts {
            for policy in policies.iter_mut() {
                let policy_type = policy_type(policy).to_string();
                if CONVERTED_CALLOUTS.contains(&policy_type.as_str()) {
                    warnings.push(format!(
                        "converted {} policy '{}' to ExtensionCallout",
                        policy_type,
                        policy_name(policy)
                    ));
                    policy["type"] = json!("ExtensionCallout");
                }
            }
        }
    }
}

fn transform_target_server(node: &ResourceNode, payload: &mut Value) -> Result<()> {
    let reference = &node.reference;

    match payload.get("host").and_then(Value::as_str) {
        Some(host) if !host.trim().is_empty() => {}
        _ => return Err(MigrateError::validation(reference, "target server has no host")),
    }
    match payload.get("port").and_then(Value::as_u64) {
        Some(port) if (1..=65535).contains(&port) => {}
        _ => {
            return Err(MigrateError::validation(
                reference,
                "target server port must be an integer between 1 and 65535",
            ));
        }
    }

    if payload.get("protocol").is_none() {
        let ssl = payload
            .get("sslInfo")
            .or_else(|| payload.get("ssl_info"))
            .and_then(|s| s.get("enabled"))
            .is_some_and(|e| e == &json!(true) || e == &json!("true"));
        payload["protocol"] = json!(if ssl { "HTTPS" } else { "HTTP" });
    }

    Ok(())
}

fn policy_type(policy: &Value) -> &str {
    policy.get("type").and_then(Value::as_str).unwrap_or("")
}

fn policy_name(policy: &Value) -> &str {
    policy.get("name").and_then(Value::as_str).unwrap_or("unnamed")
}
