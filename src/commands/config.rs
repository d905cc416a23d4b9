use anyhow::{Context as AnyhowContext, Result, bail};
use std::fs;

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::EdgexConfig;
use crate::{paths, ui};

/// Starter config written by `edgex config init`
const TEMPLATE: &str = r#"# edgex configuration

[source]
# Edge organization and environment the export was taken from
org = ""
env = ""
# Export directory (one <kind>.json per kind) or combined export file
export = "~/edge-export"

[target]
org = ""
env = ""
base_url = "https://apigee.googleapis.com/v1"
# Prefer the EDGEX_TOKEN environment variable over storing a token here
# token = ""

[migration]
jobs = 4
dry_run = false
# Empty means every kind
kinds = []
timeout_secs = 30

[migration.retry]
max_attempts = 3
base_delay_ms = 500
backoff_factor = 2.0
max_delay_ms = 30000

[diff]
# Replaces the built-in list (revision, createdAt, lastModifiedAt, metaData, ...)
# ignored_fields = ["revision", "lastModifiedAt"]

[transform]
remove_unsupported_policies = true
convert_callouts = true
"#;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Init { force } => init(force),
        ConfigCommand::Dir => dir(),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let mut config = EdgexConfig::load(ctx.config.as_deref())?;
    if config.target.token.is_some() {
        config.target.token = Some("********".into());
    }
    let rendered = serde_json::to_string_pretty(&config).context("Could not render config")?;
    println!("{rendered}");
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let path = EdgexConfig::default_path()?;
    if path.exists() && !force {
        bail!(
            "{} already exists; use --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(&path, TEMPLATE).with_context(|| format!("Could not write {}", path.display()))?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn dir() -> Result<()> {
    ui::kv("Config", &paths::config_dir()?.display().to_string());
    ui::kv("Jobs", &paths::jobs_dir()?.display().to_string());
    Ok(())
}
