use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edgex")]
#[command(version)]
#[command(about = "Migrate API-gateway configuration from Edge to X", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/edgex/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the order resources would be migrated in
    Plan(PlanArgs),

    /// Show how the target differs from the source
    Diff(DiffArgs),

    /// Run a migration job
    Migrate(MigrateArgs),

    /// Inspect recorded migration jobs
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where resources come from and go to
///
/// Every flag overrides the matching config file entry.
#[derive(Args, Default)]
pub struct EndpointArgs {
    /// Edge organization
    #[arg(long)]
    pub source_org: Option<String>,

    /// Edge environment
    #[arg(long)]
    pub source_env: Option<String>,

    /// Edge export directory or file
    #[arg(long)]
    pub export: Option<String>,

    /// X organization
    #[arg(long)]
    pub target_org: Option<String>,

    /// X environment
    #[arg(long)]
    pub target_env: Option<String>,

    /// X management API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// X access token
    #[arg(long, env = "EDGEX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Only these kinds (comma-separated): proxies, sharedflows, targetservers, kvms, apiproducts, developers, apps
    #[arg(short, long, value_delimiter = ',')]
    pub kinds: Vec<String>,
}

// ============================================================================
// Plan / Diff / Migrate
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
}

#[derive(Args)]
pub struct DiffArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,

    /// Also list resources that are already in sync
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,

    /// Record what would change without writing to the target
    #[arg(long)]
    pub dry_run: bool,

    /// Number of parallel workers per level
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Job name shown in `edgex jobs list`
    #[arg(long)]
    pub name: Option<String>,
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Subcommand)]
pub enum JobsCommand {
    /// List recorded jobs
    List,

    /// Show a job's progress and per-resource outcomes
    Show {
        /// Job id (a unique prefix is enough)
        id: String,
    },

    /// Print a job's log
    Logs {
        /// Job id (a unique prefix is enough)
        id: String,

        /// Only errors and warnings
        #[arg(short, long)]
        errors: bool,
    },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print config and state directories
    Dir,
}
