//! X management API client
//!
//! Reads and writes resources as JSON documents under
//! `{base}/organizations/{org}`. Environment-scoped kinds live under
//! `environments/{env}`; developer apps live under their developer.
//!
//! HTTP status codes never surface as `ureq` errors: the agent is built with
//! `http_status_as_error(false)` and every status is mapped onto a
//! [`GatewayError`] category. Timeouts come from the agent and count as
//! transient.

use migrate::{
    Endpoint, GatewayClient, GatewayError, ResourceKind, ResourceNode, ResourceRef,
    ResourceSource, Scope, WriteOutcome,
};
use serde_json::Value;
use std::time::Duration;

pub struct ApigeeClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl ApigeeClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn org_url(&self, org: &str) -> String {
        format!("{}/organizations/{org}", self.base_url)
    }

    /// Collection URL for listing a kind
    fn list_url(&self, endpoint: &Endpoint, kind: ResourceKind) -> String {
        let org = self.org_url(&endpoint.org);
        match kind {
            ResourceKind::Proxy => format!("{org}/apis"),
            ResourceKind::SharedFlow => format!("{org}/sharedflows"),
            ResourceKind::TargetServer => {
                format!("{org}/environments/{}/targetservers", endpoint.env)
            }
            ResourceKind::Kvm => format!("{org}/environments/{}/keyvaluemaps", endpoint.env),
            ResourceKind::ApiProduct => format!("{org}/apiproducts?expand=true"),
            ResourceKind::Developer => format!("{org}/developers?expand=true"),
            ResourceKind::DeveloperApp => format!("{org}/apps?expand=true"),
        }
    }

    /// Collection URL a resource is created in
    fn collection_url(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
        payload: &Value,
    ) -> Result<String, GatewayError> {
        let org = self.org_url(&endpoint.org);
        let env_path = |env: &str, collection: &str| {
            format!("{org}/environments/{env}/{collection}")
        };

        Ok(match (reference.kind, &reference.scope) {
            (ResourceKind::Proxy, _) => format!("{org}/apis"),
            (ResourceKind::SharedFlow, _) => format!("{org}/sharedflows"),
            (ResourceKind::TargetServer, Scope::Environment(env)) => {
                env_path(env, "targetservers")
            }
            (ResourceKind::TargetServer, Scope::Organization) => {
                env_path(&endpoint.env, "targetservers")
            }
            (ResourceKind::Kvm, Scope::Environment(env)) => env_path(env, "keyvaluemaps"),
            (ResourceKind::Kvm, Scope::Organization) => format!("{org}/keyvaluemaps"),
            (ResourceKind::ApiProduct, _) => format!("{org}/apiproducts"),
            (ResourceKind::Developer, _) => format!("{org}/developers"),
            (ResourceKind::DeveloperApp, _) => {
                let developer = ["developerEmail", "developer_email", "developerId"]
                    .iter()
                    .find_map(|f| payload.get(f).and_then(Value::as_str))
                    .ok_or_else(|| GatewayError::Validation {
                        message: format!("{reference} has no developer"),
                    })?;
                format!("{org}/developers/{developer}/apps")
            }
        })
    }

    fn item_url(collection: &str, reference: &ResourceRef) -> Result<String, GatewayError> {
        if reference.name.contains(['/', '?', '#']) {
            return Err(GatewayError::Validation {
                message: format!("{reference}: name cannot be used in a URL"),
            });
        }
        Ok(format!("{collection}/{}", reference.name))
    }

    fn bearer(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    /// GET a URL; `Ok(None)` on 404
    fn get_json(&self, url: &str, subject: &str) -> Result<Option<Value>, GatewayError> {
        log::debug!("GET {url}");
        let mut request = self.agent.get(url).header("Accept", "application/json");
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request.call().map_err(transport_error)?;

        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        let body = response.body_mut().read_to_string().map_err(transport_error)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::from_status(status, &body, subject));
        }
        parse_body(&body, subject).map(Some)
    }

    /// POST or PUT a payload
    fn send_json(
        &self,
        method: &str,
        url: &str,
        payload: &Value,
        subject: &str,
    ) -> Result<(), GatewayError> {
        log::debug!("{method} {url}");
        let mut request = match method {
            "PUT" => self.agent.put(url),
            _ => self.agent.post(url),
        };
        if let Some(auth) = self.bearer() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request.send_json(payload).map_err(transport_error)?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(GatewayError::from_write_status(status, &body, subject))
    }

    /// Every resource of one kind
    fn fetch_kind(
        &self,
        endpoint: &Endpoint,
        kind: ResourceKind,
    ) -> Result<Vec<ResourceNode>, GatewayError> {
        let url = self.list_url(endpoint, kind);
        let Some(listing) = self.get_json(&url, kind.as_str())? else {
            return Ok(Vec::new());
        };

        let collection = url.split('?').next().unwrap_or(&url).to_string();
        let mut nodes = Vec::new();
        for item in list_items(listing) {
            // Name-only listings need one more call per item
            let payload = match item {
                Value::String(name) => {
                    let item_url = format!("{collection}/{name}");
                    match self.get_json(&item_url, &format!("{kind}/{name}"))? {
                        Some(payload) => payload,
                        None => continue,
                    }
                }
                other => other,
            };
            match ResourceNode::from_payload(kind, Some(&endpoint.env), payload) {
                Ok(node) => nodes.push(node),
                Err(e) => log::warn!("Skipping {kind} from {endpoint}: {e}"),
            }
        }
        Ok(nodes)
    }
}

/// Items of a listing response
///
/// Listings come as a bare array, or as an object wrapping one array
/// (`{"proxies": [...]}`, `{"apiProduct": [...]}`).
fn list_items(listing: Value) -> Vec<Value> {
    match listing {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn parse_body(body: &str, subject: &str) -> Result<Value, GatewayError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| GatewayError::Transient {
        message: format!("unreadable response for {subject}: {e}"),
    })
}

/// Errors below the HTTP status level: DNS, TLS, timeouts, broken bodies
fn transport_error(err: ureq::Error) -> GatewayError {
    match err {
        ureq::Error::StatusCode(code) => GatewayError::from_status(code, "", "request"),
        other => GatewayError::Transient {
            message: other.to_string(),
        },
    }
}

impl ResourceSource for ApigeeClient {
    fn fetch_snapshot(
        &self,
        endpoint: &Endpoint,
        kinds: &[ResourceKind],
    ) -> Result<Vec<ResourceNode>, GatewayError> {
        let mut nodes = Vec::new();
        for &kind in kinds {
            let found = self.fetch_kind(endpoint, kind)?;
            log::debug!("Fetched {} {} from {endpoint}", found.len(), kind.label());
            nodes.extend(found);
        }
        Ok(nodes)
    }

    fn fetch_resource(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
    ) -> Result<Option<ResourceNode>, GatewayError> {
        // Apps are addressed through their developer, which the ref does not carry
        if reference.kind == ResourceKind::DeveloperApp {
            return Ok(self
                .fetch_kind(endpoint, reference.kind)?
                .into_iter()
                .find(|node| &node.reference == reference));
        }

        let collection = self.collection_url(endpoint, reference, &Value::Null)?;
        let url = Self::item_url(&collection, reference)?;
        let Some(payload) = self.get_json(&url, &reference.to_string())? else {
            return Ok(None);
        };
        let node = ResourceNode::from_payload(reference.kind, reference.scope.env(), payload)
            .map_err(|e| GatewayError::Validation {
                message: e.to_string(),
            })?;
        Ok(Some(node))
    }
}

impl GatewayClient for ApigeeClient {
    fn create_or_update(
        &self,
        endpoint: &Endpoint,
        reference: &ResourceRef,
        payload: &Value,
    ) -> Result<WriteOutcome, GatewayError> {
        let collection = self.collection_url(endpoint, reference, payload)?;
        let url = Self::item_url(&collection, reference)?;
        let subject = reference.to_string();

        if self.get_json(&url, &subject)?.is_some() {
            self.send_json("PUT", &url, payload, &subject)?;
            Ok(WriteOutcome::Updated)
        } else {
            self.send_json("POST", &collection, payload, &subject)?;
            Ok(WriteOutcome::Created)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ApigeeClient {
        ApigeeClient::new(
            "https://apigee.example.com/v1/",
            Some("t".into()),
            Duration::from_secs(5),
        )
    }

    fn prod() -> Endpoint {
        Endpoint::new("x-org", "prod")
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(client().base_url(), "https://apigee.example.com/v1");
    }

    #[test]
    fn test_list_urls() {
        let c = client();
        assert_eq!(
            c.list_url(&prod(), ResourceKind::Proxy),
            "https://apigee.example.com/v1/organizations/x-org/apis"
        );
        assert_eq!(
            c.list_url(&prod(), ResourceKind::TargetServer),
            "https://apigee.example.com/v1/organizations/x-org/environments/prod/targetservers"
        );
        assert_eq!(
            c.list_url(&prod(), ResourceKind::DeveloperApp),
            "https://apigee.example.com/v1/organizations/x-org/apps?expand=true"
        );
    }

    #[test]
    fn test_collection_urls_follow_scope() {
        let c = client();
        let env_kvm = ResourceRef::env(ResourceKind::Kvm, "settings", "test");
        assert_eq!(
            c.collection_url(&prod(), &env_kvm, &Value::Null).unwrap(),
            "https://apigee.example.com/v1/organizations/x-org/environments/test/keyvaluemaps"
        );

        let org_kvm = ResourceRef::org(ResourceKind::Kvm, "global");
        assert_eq!(
            c.collection_url(&prod(), &org_kvm, &Value::Null).unwrap(),
            "https://apigee.example.com/v1/organizations/x-org/keyvaluemaps"
        );
    }

    #[test]
    fn test_app_collection_needs_developer() {
        let c = client();
        let app = ResourceRef::org(ResourceKind::DeveloperApp, "mobile");
        let url = c
            .collection_url(&prod(), &app, &json!({"developerEmail": "dev@example.com"}))
            .unwrap();
        assert!(url.ends_with("/developers/dev@example.com/apps"));

        assert!(matches!(
            c.collection_url(&prod(), &app, &json!({})),
            Err(GatewayError::Validation { .. })
        ));
    }

    #[test]
    fn test_item_url_rejects_path_characters() {
        let r = ResourceRef::org(ResourceKind::Proxy, "a/b");
        assert!(ApigeeClient::item_url("http://x/apis", &r).is_err());

        let r = ResourceRef::org(ResourceKind::Proxy, "orders");
        assert_eq!(ApigeeClient::item_url("http://x/apis", &r).unwrap(), "http://x/apis/orders");
    }

    #[test]
    fn test_list_items_shapes() {
        assert_eq!(list_items(json!(["a", "b"])).len(), 2);
        assert_eq!(list_items(json!({"proxies": [{"name": "p"}]})).len(), 1);
        assert!(list_items(json!({})).is_empty());
        assert!(list_items(json!("nope")).is_empty());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body("  ", "s").unwrap(), Value::Null);
        assert!(parse_body("{\"a\":1}", "s").is_ok());
        assert!(matches!(
            parse_body("<html>", "s"),
            Err(GatewayError::Transient { .. })
        ));
    }
}
