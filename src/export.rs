//! Edge export reader
//!
//! An export is either one combined JSON file keyed by kind
//! (`{"proxies": [...], "target_servers": [...], ...}`) or a directory of
//! JSON files. In a directory, a file holding an array is named after its
//! kind (`kvms.json`), and a file holding an object is read like a combined
//! export. Files in a subdirectory only apply to the environment the
//! subdirectory is named after (`prod/target_servers.json`).

use migrate::{Endpoint, GatewayError, ResourceKind, ResourceNode, ResourceSource};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct ExportSource {
    root: PathBuf,
}

impl ExportSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// JSON files that apply to `env`, sorted by path
    fn files_for(&self, env: &str) -> Result<Vec<PathBuf>, GatewayError> {
        if self.root.is_file() {
            return Ok(vec![self.root.clone()]);
        }
        if !self.root.is_dir() {
            return Err(GatewayError::NotFound {
                missing: format!("export {}", self.root.display()),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !is_json(entry.path()) {
                continue;
            }
            if entry.depth() == 2 {
                let dir_env = entry
                    .path()
                    .parent()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str());
                if dir_env != Some(env) {
                    continue;
                }
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn read_json(path: &Path) -> Result<Value, GatewayError> {
    let content = fs::read_to_string(path).map_err(|e| GatewayError::Validation {
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    serde_json::from_str(&content).map_err(|e| GatewayError::Validation {
        message: format!("invalid JSON in {}: {e}", path.display()),
    })
}

/// Payloads of one file, by kind
fn sections(path: &Path, value: Value) -> Result<Vec<(ResourceKind, Vec<Value>)>, GatewayError> {
    match value {
        Value::Array(items) => {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let kind = stem.parse::<ResourceKind>().map_err(|_| GatewayError::Validation {
                message: format!("{}: cannot tell the resource kind from the file name", path.display()),
            })?;
            Ok(vec![(kind, items)])
        }
        Value::Object(map) => {
            let mut out = Vec::new();
            for (key, items) in map {
                let Ok(kind) = key.parse::<ResourceKind>() else {
                    log::debug!("{}: skipping section '{key}'", path.display());
                    continue;
                };
                match items {
                    Value::Array(items) => out.push((kind, items)),
                    _ => {
                        return Err(GatewayError::Validation {
                            message: format!("{}: section '{key}' is not an array", path.display()),
                        });
                    }
                }
            }
            Ok(out)
        }
        _ => Err(GatewayError::Validation {
            message: format!("{}: expected an array or an object", path.display()),
        }),
    }
}

impl ResourceSource for ExportSource {
    fn fetch_snapshot(
        &self,
        endpoint: &Endpoint,
        kinds: &[ResourceKind],
    ) -> Result<Vec<ResourceNode>, GatewayError> {
        let mut nodes = Vec::new();

        for path in self.files_for(&endpoint.env)? {
            let value = read_json(&path)?;
            for (kind, items) in sections(&path, value)? {
                if !kinds.contains(&kind) {
                    continue;
                }
                for payload in items {
                    match ResourceNode::from_payload(kind, Some(&endpoint.env), payload) {
                        Ok(node) => nodes.push(node),
                        Err(e) => log::warn!("{}: skipping {kind}: {e}", path.display()),
                    }
                }
            }
        }

        log::info!(
            "Read {} resources for {} from {}",
            nodes.len(),
            endpoint,
            self.root.display()
        );
        Ok(nodes)
    }
}
