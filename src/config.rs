//! edgex configuration
//!
//! Loaded from `config.toml` (preferred) or `config.json` in the config
//! directory, or from the file given with `--config`. Every section is
//! optional; command-line flags override what the file says.

use anyhow::{Context, Result, bail};
use migrate::{DiffOptions, ResourceKind, RetryPolicy, Settings, TransformOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Default management API base for X
pub const DEFAULT_BASE_URL: &str = "https://apigee.googleapis.com/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgexConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub migration: MigrationConfig,
    pub diff: DiffOptions,
    pub transform: TransformOptions,
}

/// The Edge side, read from an export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub org: String,
    pub env: String,
    /// Export directory or combined export file
    pub export: Option<String>,
}

/// The X side, reached over the management API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub org: String,
    pub env: String,
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            org: String::new(),
            env: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub jobs: usize,
    pub dry_run: bool,
    /// Kind names; aliases such as `proxies` or `kvms` are accepted
    pub kinds: Vec<String>,
    pub retry: RetryPolicy,
    /// Timeout for each management API call
    pub timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            dry_run: false,
            kinds: Vec::new(),
            retry: RetryPolicy::default(),
            timeout_secs: 30,
        }
    }
}

impl MigrationConfig {
    /// Configured kinds, normalized
    pub fn kinds(&self) -> Result<Vec<ResourceKind>> {
        parse_kinds(&self.kinds)
    }
}

/// Normalize kind names given on the command line or in the config file
pub fn parse_kinds(names: &[String]) -> Result<Vec<ResourceKind>> {
    names
        .iter()
        .flat_map(|n| n.split(','))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.parse::<ResourceKind>().map_err(Into::into))
        .collect()
}

impl EdgexConfig {
    /// Load from an explicit file, or from the config directory
    ///
    /// A missing default config file yields the defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let dir = paths::config_dir()?;
        for name in ["config.toml", "config.json"] {
            let path = dir.join(name);
            if path.exists() {
                return Self::load_file(&path);
            }
        }

        log::debug!("No config file in {}, using defaults", dir.display());
        Ok(Self::default())
    }

    /// Load a TOML or JSON file, picked by extension
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
            Some("toml") | None => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            Some(other) => bail!("Unsupported config format '.{other}' ({})", path.display()),
        };

        if let Err(e) = config.migration.retry.validate() {
            bail!("Invalid [migration.retry] in {}: {e}", path.display());
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Path of the default config file
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join("config.toml"))
    }

    /// Export location with `~` and variables expanded
    pub fn export_path(&self) -> Option<PathBuf> {
        self.source.export.as_deref().map(paths::expand)
    }

    /// Orchestrator settings derived from this config
    pub fn settings(&self) -> Settings {
        Settings {
            jobs: self.migration.jobs.max(1),
            retry: self.migration.retry.clone(),
            diff: self.diff.clone(),
            transform: self.transform.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[source]
org = "edge-org"
env = "prod"
export = "/srv/export"

[target]
org = "x-org"
env = "prod"

[migration]
jobs = 8
kinds = ["proxies", "kvms"]

[migration.retry]
max_attempts = 5
base_delay_ms = 100

[diff]
ignored_fields = ["lastModifiedAt"]

[transform]
convert_callouts = false
"#,
        )
        .unwrap();

        let config = EdgexConfig::load(Some(&path)).unwrap();
        assert_eq!(config.source.org, "edge-org");
        assert_eq!(config.target.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.migration.jobs, 8);
        assert_eq!(
            config.migration.kinds().unwrap(),
            vec![ResourceKind::Proxy, ResourceKind::Kvm]
        );
        assert_eq!(config.migration.retry.max_attempts, 5);
        assert_eq!(config.migration.retry.base_delay, Duration::from_millis(100));
        assert!(config.diff.is_ignored("lastModifiedAt"));
        assert!(!config.transform.convert_callouts);
        assert!(config.transform.remove_unsupported_policies);

        let settings = config.settings();
        assert_eq!(settings.jobs, 8);
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"target": {"org": "x-org", "env": "test", "token": "abc"}, "migration": {"dry_run": true}}"#,
        )
        .unwrap();

        let config = EdgexConfig::load(Some(&path)).unwrap();
        assert_eq!(config.target.token.as_deref(), Some("abc"));
        assert!(config.migration.dry_run);
        assert_eq!(config.migration.jobs, 4);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(EdgexConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "source: {}").unwrap();
        assert!(EdgexConfig::load_file(&path).is_err());
    }

    #[test]
    fn test_negative_backoff_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[migration.retry]\nbackoff_factor = -2.0\n").unwrap();

        let err = EdgexConfig::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("backoff_factor"));
    }

    #[test]
    fn test_parse_kinds_accepts_commas() {
        let kinds = parse_kinds(&["apis,targetservers".to_string(), " apps ".to_string()]).unwrap();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Proxy,
                ResourceKind::TargetServer,
                ResourceKind::DeveloperApp
            ]
        );
        assert!(parse_kinds(&["environments".to_string()]).is_err());
    }
}
