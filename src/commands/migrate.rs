use anyhow::{Result, bail};
use chrono::Utc;
use migrate::{DiffSummary, JobStatus};
use std::sync::Arc;

use crate::Context;
use crate::cli::MigrateArgs;
use crate::progress::JobProgress;
use crate::ui;

pub fn run(ctx: &Context, args: MigrateArgs) -> Result<()> {
    let mut config = super::load_config(ctx, &args.endpoints)?;
    if args.dry_run {
        config.migration.dry_run = true;
    }
    if let Some(jobs) = args.jobs {
        config.migration.jobs = jobs.max(1);
    }

    let session = super::session(&config)?;
    let intent = session.intent.clone();

    ui::header(&format!("Migrating {} → {}", intent.source, intent.target));
    if intent.dry_run {
        ui::warn("Dry run - nothing will be written to the target");
    }

    ui::step(1, 2, "Comparing source and target");
    let records = session.orchestrator.diff(&intent)?;
    let summary = DiffSummary::from_records(&records);
    if !ctx.quiet {
        super::diff::display_diff(&records, false, false);
    }

    if !summary.has_changes() {
        println!();
        ui::success("Target already matches the source");
        return Ok(());
    }

    if !args.yes && !intent.dry_run && !confirm_proceed()? {
        ui::info("Cancelled");
        return Ok(());
    }

    println!();
    ui::step(2, 2, "Migrating resources");
    let progress = if ctx.quiet {
        JobProgress::hidden()
    } else {
        JobProgress::new(ctx.verbose > 0)
    };
    let orchestrator = session.orchestrator.with_progress(Arc::new(progress));

    let name = args
        .name
        .unwrap_or_else(|| format!("{}-{}", intent.target.org, Utc::now().format("%Y%m%d-%H%M%S")));
    let job = orchestrator.create_job(name, intent)?;
    let status = orchestrator.start(&job.id)?;
    let job = orchestrator.job(&job.id)?;

    println!();
    super::jobs::show(&job)?;
    println!();

    match status {
        JobStatus::Completed => {
            ui::success(&format!(
                "Migrated {} resources ({})",
                job.completed_resources, job.id
            ));
            Ok(())
        }
        JobStatus::PartiallyFailed => bail!(
            "{} of {} resources failed; see `edgex jobs logs {}`",
            job.failed_resources,
            job.total_resources,
            job.id
        ),
        other => bail!("Job {} ended {other}; see `edgex jobs logs {}`", job.id, job.id),
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
