// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines sync, rollback, and init with their arguments and global flags.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scion")]
#[command(about = "Sync compose projects to a server over SSH, with snapshot rollback")]
#[command(version)]
pub struct Cli {
    /// Target environment (defined in .scion/project.yml)
    #[arg(short, long, global = true, default_value = "prod")]
    pub env: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only results and warnings
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .scion/project.yml in the current directory
    Init {
        /// Project name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy the project, or one service, to the environment's server
    Sync(SyncArgs),

    /// Restore a snapshot taken before an earlier sync
    Rollback(RollbackArgs),
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub command: Option<SyncCommands>,

    /// Sync only this service
    pub service: Option<String>,

    /// Build without cache
    #[arg(long)]
    pub no_cache: bool,

    /// Upload only, without building or restarting
    #[arg(long)]
    pub heave: bool,

    /// Build from a git commit instead of the working directory
    #[arg(long)]
    pub git: bool,

    /// Branch whose latest commit is built
    #[arg(long, requires = "git")]
    pub branch: Option<String>,

    /// Commit to build
    #[arg(long, requires = "git")]
    pub commit: Option<String>,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Upload the manifest and env files only
    Compose {
        /// Skip the restart
        #[arg(long)]
        heave: bool,
    },
}

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct RollbackArgs {
    #[command(subcommand)]
    pub command: Option<RollbackCommands>,

    /// Snapshot to restore (defaults to the newest)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Subcommand)]
pub enum RollbackCommands {
    /// Restore a single service
    Service {
        name: String,

        /// Snapshot to restore (defaults to the newest)
        #[arg(long)]
        to: Option<String>,
    },

    /// List snapshots, newest first
    List,

    /// Change how many snapshots are kept
    Config {
        #[arg(long)]
        keep: u32,
    },
}
