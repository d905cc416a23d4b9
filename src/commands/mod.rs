//! Command implementations
//!
//! `plan`, `diff` and `migrate` share one setup: load the config, apply the
//! command-line overrides, then wire the export reader, the X client and the
//! job store into an orchestrator.

pub mod config;
pub mod diff;
pub mod jobs;
pub mod migrate;
pub mod plan;

use anyhow::{Context as AnyhowContext, Result, bail};
use ::migrate::{Endpoint, JobIntent, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::apigee::ApigeeClient;
use crate::cli::EndpointArgs;
use crate::config::{EdgexConfig, parse_kinds};
use crate::export::ExportSource;
use crate::state::FileJobStore;

/// Everything a migration command needs
pub struct Session {
    pub intent: JobIntent,
    pub orchestrator: Orchestrator,
}

/// Load the config and apply command-line overrides
pub fn load_config(ctx: &Context, args: &EndpointArgs) -> Result<EdgexConfig> {
    let mut config = EdgexConfig::load(ctx.config.as_deref())?;
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut EdgexConfig, args: &EndpointArgs) {
    fn set(slot: &mut String, value: Option<&String>) {
        if let Some(value) = value {
            slot.clone_from(value);
        }
    }
    set(&mut config.source.org, args.source_org.as_ref());
    set(&mut config.source.env, args.source_env.as_ref());
    set(&mut config.target.org, args.target_org.as_ref());
    set(&mut config.target.env, args.target_env.as_ref());
    set(&mut config.target.base_url, args.base_url.as_ref());

    if args.export.is_some() {
        config.source.export.clone_from(&args.export);
    }
    if args.token.is_some() {
        config.target.token.clone_from(&args.token);
    }
    if !args.kinds.is_empty() {
        config.migration.kinds.clone_from(&args.kinds);
    }
}

/// Build the job intent a config describes
pub fn intent(config: &EdgexConfig) -> Result<JobIntent> {
    let missing = [
        (&config.source.org, "source organization", "--source-org", "[source] org"),
        (&config.source.env, "source environment", "--source-env", "[source] env"),
        (&config.target.org, "target organization", "--target-org", "[target] org"),
        (&config.target.env, "target environment", "--target-env", "[target] env"),
    ];
    for (value, what, flag, key) in missing {
        if value.trim().is_empty() {
            bail!("No {what} configured; pass {flag} or set {key} in the config file");
        }
    }

    let kinds = if config.migration.kinds.is_empty() {
        Vec::new()
    } else {
        parse_kinds(&config.migration.kinds)?
    };

    Ok(JobIntent::new(
        Endpoint::new(&config.source.org, &config.source.env),
        Endpoint::new(&config.target.org, &config.target.env),
    )
    .with_kinds(kinds)
    .dry_run(config.migration.dry_run))
}

/// Wire up an orchestrator for the configured endpoints
pub fn session(config: &EdgexConfig) -> Result<Session> {
    let intent = intent(config)?;
    let export = config
        .export_path()
        .context("No Edge export configured; pass --export or set [source] export")?;

    if config.target.token.is_none() {
        log::warn!("No access token configured; X requests will be unauthenticated");
    }

    let client = Arc::new(ApigeeClient::new(
        config.target.base_url.clone(),
        config.target.token.clone(),
        Duration::from_secs(config.migration.timeout_secs.max(1)),
    ));
    let store = Arc::new(FileJobStore::open_default()?);

    log::debug!("Reading Edge export from {}", export.display());
    log::debug!("Writing to X through {}", client.base_url());
    log::debug!("Job records in {}", store.dir().display());

    let orchestrator = Orchestrator::new(
        Arc::new(ExportSource::new(export)),
        client.clone(),
        client,
        store,
        config.settings(),
    );

    Ok(Session {
        intent,
        orchestrator,
    })
}
