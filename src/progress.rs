//! Progress bar for running migration jobs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use migrate::{OutcomeKind, ProgressCallback, ProgressSnapshot, ResourceOutcome};

use crate::ui;

/// Draws one bar per job, advanced from worker threads
pub struct JobProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl JobProgress {
    pub fn new(verbose: bool) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        Self { bar, verbose }
    }

    /// Progress that draws nothing, for `--quiet`
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose: false,
        }
    }
}

impl ProgressCallback for JobProgress {
    fn on_job_start(&self, _job_id: &str, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_level_start(&self, level: usize, count: usize) {
        self.bar.set_message(format!("level {} ({count} resources)", level + 1));
    }

    fn on_resource_complete(&self, outcome: &ResourceOutcome) {
        let reference = outcome.reference.to_string();
        self.bar.set_message(format!(
            "{} {}",
            ui::outcome_symbol(outcome.kind),
            ui::truncate(&reference, 40)
        ));

        if outcome.kind == OutcomeKind::Failed {
            let message = outcome.message.as_deref().unwrap_or("failed");
            self.bar.suspend(|| {
                println!("  {} {} ({})", "✗".red(), reference, message);
            });
        } else if self.verbose {
            self.bar.suspend(|| {
                println!("  {} {}", ui::outcome_symbol(outcome.kind), reference);
            });
        }

        self.bar.inc(1);
    }

    fn on_job_complete(&self, _progress: &ProgressSnapshot) {
        self.bar.finish_and_clear();
    }
}
