//! Terminal output helpers

use colored::{ColoredString, Colorize};
use migrate::{JobStatus, OutcomeKind};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

/// Color a job status for display
pub fn status(status: JobStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        JobStatus::Completed => text.green(),
        JobStatus::PartiallyFailed => text.yellow(),
        JobStatus::Failed => text.red(),
        JobStatus::Running => text.cyan(),
        JobStatus::Pending => text.dimmed(),
    }
}

/// Symbol for how a resource ended up
pub fn outcome_symbol(kind: OutcomeKind) -> ColoredString {
    match kind {
        OutcomeKind::Created => "+".green(),
        OutcomeKind::Updated => "~".yellow(),
        OutcomeKind::Unchanged => "○".dimmed(),
        OutcomeKind::Planned => "→".cyan(),
        OutcomeKind::Failed => "✗".red(),
    }
}

/// Truncate a resource reference for display, keeping the end
pub fn truncate(text: &str, max_len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{tail}")
    }
}

// ============================================================================
// Tests
// ============================================================================
