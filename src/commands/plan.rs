use anyhow::Result;
use colored::Colorize;
use migrate::MigrationOrder;

use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let config = super::load_config(ctx, &args.endpoints)?;
    let session = super::session(&config)?;
    let order = session.orchestrator.plan(&session.intent)?;

    if !ctx.quiet {
        ui::header(&format!(
            "Migration plan: {} → {}",
            session.intent.source, session.intent.target
        ));
    }
    display_order(&order);
    Ok(())
}

/// Print levels in execution order
pub fn display_order(order: &MigrationOrder) {
    if order.is_empty() {
        println!();
        println!("  {} Nothing to migrate", "✓".green());
        return;
    }

    for (index, level) in order.levels.iter().enumerate() {
        ui::section(&format!("Level {} ({} resources)", index + 1, level.len()));
        for reference in level {
            println!("  {} {}", "•".dimmed(), reference);
        }
    }

    if !order.warnings.is_empty() {
        println!();
        for warning in &order.warnings {
            ui::warn(warning);
        }
    }

    println!();
    ui::kv(
        "Total",
        &format!(
            "{} resources in {} levels",
            order.total_resources(),
            order.levels.len()
        ),
    );
}
