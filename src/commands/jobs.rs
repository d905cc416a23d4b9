use anyhow::{Result, bail};
use colored::Colorize;
use migrate::{JobStore, MigrationJob, OutcomeKind};

use crate::Context;
use crate::cli::JobsCommand;
use crate::state::FileJobStore;
use crate::ui;

pub fn run(ctx: &Context, cmd: JobsCommand) -> Result<()> {
    let store = FileJobStore::open_default()?;
    match cmd {
        JobsCommand::List => list(ctx, &store),
        JobsCommand::Show { id } => show(&find(&store, &id)?),
        JobsCommand::Logs { id, errors } => logs(&find(&store, &id)?, errors),
    }
}

fn list(ctx: &Context, store: &FileJobStore) -> Result<()> {
    let jobs = store.list()?;
    if jobs.is_empty() {
        if !ctx.quiet {
            ui::info("No migration jobs recorded yet");
            ui::dim(&format!("Job records live in {}", store.dir().display()));
        }
        return Ok(());
    }

    ui::header("Migration Jobs");
    println!();
    for job in jobs.iter().rev() {
        println!(
            "  {}  {:<18} {:<24} {:>3}/{:<3} {}",
            short_id(&job.id).bold(),
            ui::status(job.status),
            ui::truncate(&job.name, 24),
            job.completed_resources,
            job.total_resources,
            job.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
    }
    Ok(())
}

/// Resolve a full id or a unique prefix
fn find(store: &FileJobStore, id: &str) -> Result<MigrationJob> {
    if let Ok(job) = store.load(id) {
        return Ok(job);
    }

    let mut matches: Vec<MigrationJob> = store
        .list()?
        .into_iter()
        .filter(|job| job.id.starts_with(id))
        .collect();
    match matches.len() {
        0 => bail!("No job matches '{id}'"),
        1 => Ok(matches.remove(0)),
        n => bail!("'{id}' matches {n} jobs; use a longer prefix"),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn show(job: &MigrationJob) -> Result<()> {
    ui::header(&format!("Job {}", job.name));
    ui::kv("Id", &job.id);
    ui::kv("Status", &ui::status(job.status).to_string());
    ui::kv(
        "Route",
        &format!("{} → {}", job.intent.source, job.intent.target),
    );
    if job.intent.dry_run {
        ui::kv("Mode", "dry run");
    }
    ui::kv(
        "Progress",
        &format!(
            "{}/{} completed, {} failed ({:.0}%)",
            job.completed_resources,
            job.total_resources,
            job.failed_resources,
            job.percentage()
        ),
    );
    ui::kv("Created", &job.created_at.to_rfc3339());
    if let Some(at) = job.completed_at {
        ui::kv("Finished", &at.to_rfc3339());
    }

    if !job.outcomes.is_empty() {
        ui::section("Resources");
        for outcome in &job.outcomes {
            let detail = match (&outcome.message, outcome.kind) {
                (Some(message), OutcomeKind::Failed) => message.red().to_string(),
                (Some(message), _) => message.dimmed().to_string(),
                (None, _) if outcome.changes > 0 => {
                    format!("{} changes", outcome.changes).dimmed().to_string()
                }
                (None, _) => String::new(),
            };
            println!(
                "  {} {:<40} {}",
                ui::outcome_symbol(outcome.kind),
                outcome.reference.to_string(),
                detail
            );
            if let Some(category) = outcome.category {
                ui::dim(&format!("    {}", category.advice()));
            }
        }
    }

    if !job.warnings.is_empty() {
        ui::section("Warnings");
        for warning in &job.warnings {
            ui::warn(warning);
        }
    }
    Ok(())
}

fn logs(job: &MigrationJob, errors_only: bool) -> Result<()> {
    let logs = job.job_logs();
    if errors_only {
        for error in &logs.errors {
            println!("{} {}", "✗".red(), error);
        }
        for warning in &logs.warnings {
            println!("{} {}", "⚠".yellow(), warning);
        }
        return Ok(());
    }

    for line in &logs.logs {
        let colored = if line.contains("] ERROR:") {
            line.red()
        } else if line.contains("] WARNING:") {
            line.yellow()
        } else if line.contains("] SUCCESS:") {
            line.green()
        } else {
            line.normal()
        };
        println!("{colored}");
    }
    Ok(())
}
