// ABOUTME: Entry point for the scion CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, RollbackCommands, SyncCommands};
use commands::Workspace;
use scion::config;
use scion::error::Result;
use scion::output::{Output, OutputMode};
use scion::sync::{GitSelection, SyncOptions};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let cwd = env::current_dir()?;
    let output = Output::new(mode);

    match cli.command {
        Commands::Init { name, force } => {
            config::init_project(&cwd, name.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Sync(args) => {
            let workspace = Workspace::load(&cwd, &cli.env)?;
            match args.command {
                Some(SyncCommands::Compose { heave }) => {
                    commands::sync_compose(&workspace, heave, output).await
                }
                None => {
                    let options = SyncOptions {
                        no_cache: args.no_cache,
                        heave: args.heave,
                        git: args.git.then(|| GitSelection {
                            branch: args.branch,
                            commit: args.commit,
                        }),
                    };
                    commands::sync(&workspace, args.service.as_deref(), &options, output).await
                }
            }
        }
        Commands::Rollback(args) => {
            let mut workspace = Workspace::load(&cwd, &cli.env)?;
            match args.command {
                None => commands::rollback(&workspace, args.to.as_deref(), output).await,
                Some(RollbackCommands::Service { name, to }) => {
                    commands::rollback_service(&workspace, &name, to.as_deref(), output).await
                }
                Some(RollbackCommands::List) => commands::list_snapshots(&workspace, output).await,
                Some(RollbackCommands::Config { keep }) => {
                    commands::configure_retention(&mut workspace, keep, output)
                }
            }
        }
    }
}
