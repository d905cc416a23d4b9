use anyhow::Result;
use colored::Colorize;
use migrate::{Change, ChangeKind, ChangeRecord, DiffSummary, Presence, group_by_kind};
use serde_json::Value;

use crate::Context;
use crate::cli::DiffArgs;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let config = super::load_config(ctx, &args.endpoints)?;
    let session = super::session(&config)?;
    let records = session.orchestrator.diff(&session.intent)?;

    display_diff(&records, args.all, ctx.verbose > 0);
    Ok(())
}

/// Display change records grouped by kind
pub fn display_diff(records: &[ChangeRecord], all: bool, detailed: bool) {
    let summary = DiffSummary::from_records(records);
    let shown: Vec<ChangeRecord> = records
        .iter()
        .filter(|r| all || r.has_changes())
        .cloned()
        .collect();

    if shown.is_empty() {
        println!();
        println!("  {} Target is in sync with the source", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (kind, kind_records) in group_by_kind(&shown) {
        println!("│ {}", kind.label().bold());

        for record in kind_records {
            let Some(reference) = &record.reference else {
                continue;
            };
            println!(
                "│   {} {:<40} {}",
                record_symbol(record),
                reference.to_string(),
                describe(record).dimmed()
            );
            if detailed && record.presence == Presence::Both {
                for change in &record.changes {
                    display_change(change);
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} only on target, {} unchanged",
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.target_only.to_string().red(),
        summary.unchanged + summary.ignored_drift
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn record_symbol(record: &ChangeRecord) -> colored::ColoredString {
    if record.is_addition() {
        "+".green()
    } else if record.is_target_only() {
        "-".red()
    } else if record.requires_action {
        "~".yellow()
    } else {
        "○".dimmed()
    }
}

fn describe(record: &ChangeRecord) -> String {
    if record.is_addition() {
        "(missing on target)".to_string()
    } else if record.is_target_only() {
        "(only on target)".to_string()
    } else if record.requires_action {
        format!("({} changes)", record.changes.len())
    } else if record.has_changes() {
        "(ignored fields differ)".to_string()
    } else {
        "(in sync)".to_string()
    }
}

fn display_change(change: &Change) {
    let symbol = match change.kind {
        ChangeKind::Added => "+".green(),
        ChangeKind::Removed => "-".red(),
        ChangeKind::Modified => "~".yellow(),
    };
    println!("│       {} {}", symbol, change.path.cyan());

    // Nested values read better as a line diff
    if let (Some(source), Some(target)) = (&change.source, &change.target)
        && (source.is_object() || source.is_array())
    {
        display_value_diff(target, source);
        return;
    }
    if let Some(target) = &change.target {
        println!("│         {}", format!("- {}", compact(target)).red());
    }
    if let Some(source) = &change.source {
        println!("│         {}", format!("+ {}", compact(source)).green());
    }
}

/// Line diff of two pretty-printed values, from target to source
fn display_value_diff(from: &Value, to: &Value) {
    let text_a = serde_json::to_string_pretty(from).unwrap_or_default();
    let text_b = serde_json::to_string_pretty(to).unwrap_or_default();

    let diff = similar::TextDiff::from_lines(&text_a, &text_b);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                print!("│         {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                print!("│         {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }
}

fn compact(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 60 {
        let head: String = text.chars().take(57).collect();
        format!("{head}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrate::{DiffEngine, ResourceKind, ResourceNode, ResourceRef};
    use serde_json::json;

    fn node(payload: Value) -> ResourceNode {
        ResourceNode::new(ResourceRef::org(ResourceKind::Proxy, "p1"), payload)
    }

    #[test]
    fn test_describe() {
        let engine = DiffEngine::default();
        let a = node(json!({"name": "p1", "basepath": "/a"}));
        let b = node(json!({"name": "p1", "basepath": "/b"}));

        assert_eq!(describe(&engine.compare(Some(&a), None)), "(missing on target)");
        assert_eq!(describe(&engine.compare(None, Some(&a))), "(only on target)");
        assert_eq!(describe(&engine.compare(Some(&a), Some(&b))), "(1 changes)");
        assert_eq!(describe(&engine.compare(Some(&a), Some(&a))), "(in sync)");
    }

    #[test]
    fn test_compact_truncates() {
        assert_eq!(compact(&json!("short")), "\"short\"");
        let long = json!("x".repeat(100));
        assert_eq!(compact(&long).chars().count(), 60);
    }
}
