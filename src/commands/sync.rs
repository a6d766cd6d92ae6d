// ABOUTME: The sync command: whole project, one service, or the manifest only.
// ABOUTME: Connects, runs the orchestrator, and reports what happened.

use super::Workspace;
use super::connection::{connect, disconnect, report_warnings};
use scion::diagnostics::Diagnostics;
use scion::error::Result;
use scion::output::Output;
use scion::snapshot::SnapshotOutcome;
use scion::sync::{Orchestrator, SyncContext, SyncOptions, SyncReport};
use scion::vcs::GitCli;

pub async fn sync(
    workspace: &Workspace,
    service: Option<&str>,
    options: &SyncOptions,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let target = service.unwrap_or(&workspace.project.name);
    output.progress(&format!(
        "Syncing {target} to {}",
        workspace.environment.name
    ));

    let action = match service {
        Some(name) => Action::Service(name, options),
        None => Action::Project(options),
    };
    let report = run(workspace, &output, action).await?;

    print_report(&report, &output);
    let verb = if options.heave { "Uploaded" } else { "Synced" };
    output.success(&format!(
        "{verb} {target} to {}",
        workspace.environment.name
    ));
    Ok(())
}

pub async fn sync_compose(workspace: &Workspace, heave: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Syncing manifest of {} to {}",
        workspace.project.name, workspace.environment.name
    ));

    let report = run(workspace, &output, Action::Compose { heave }).await?;

    print_report(&report, &output);
    output.success("Manifest synced");
    Ok(())
}

enum Action<'s> {
    Project(&'s SyncOptions),
    Service(&'s str, &'s SyncOptions),
    Compose { heave: bool },
}

/// Connect, run `action`, and disconnect whether or not it succeeded.
async fn run(workspace: &Workspace, output: &Output, action: Action<'_>) -> Result<SyncReport> {
    let secrets = workspace.secrets()?;
    let session = connect(&workspace.environment, output).await?;
    let vcs = GitCli::new(&workspace.dir);
    let mut diag = Diagnostics::default();

    let ctx = SyncContext {
        project: &workspace.project,
        environment: &workspace.environment,
        workdir: &workspace.dir,
        secrets: &secrets,
    };
    let result = {
        let orchestrator = Orchestrator::new(ctx, &session, &vcs, output);
        match action {
            Action::Project(options) => orchestrator.sync(options, &mut diag).await,
            Action::Service(name, options) => {
                orchestrator.sync_service(name, options, &mut diag).await
            }
            Action::Compose { heave } => orchestrator.sync_compose_only(heave, &mut diag).await,
        }
    };

    disconnect(session, &workspace.environment, &mut diag).await;
    report_warnings(&diag, output);
    result
}

fn print_report(report: &SyncReport, output: &Output) {
    match &report.snapshot {
        Some(SnapshotOutcome::Created(id)) => {
            output.progress(&format!("  ✓ Snapshot {id} taken"));
        }
        Some(SnapshotOutcome::Skipped(reason)) => {
            output.progress(&format!("  - Snapshot skipped: {reason}"));
        }
        None => {}
    }
    if let Some(commit) = &report.commit {
        output.progress(&format!("  ✓ Built from commit {commit}"));
    }
    for (name, strategy) in &report.strategies {
        output.progress(&format!("  ✓ {name}: {strategy}"));
    }
}
