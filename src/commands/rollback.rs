// ABOUTME: Rollback commands: restore a snapshot, restore one service, list, and retention.
// ABOUTME: Snapshot restores run over one SSH session with diagnostics reported at the end.

use super::Workspace;
use super::connection::{connect, disconnect, report_warnings};
use scion::diagnostics::Diagnostics;
use scion::error::Result;
use scion::output::Output;
use scion::remote::StepRunner;
use scion::rollback::{RestoreReport, RollbackEngine};
use scion::snapshot::SnapshotManager;
use scion::ssh::Session;

/// Restore the whole project from `to`, or from the newest snapshot.
pub async fn rollback(workspace: &Workspace, to: Option<&str>, output: Output) -> Result<()> {
    restore(workspace, to, None, output).await
}

/// Restore only `service` from `to`, or from the newest snapshot.
pub async fn rollback_service(
    workspace: &Workspace,
    service: &str,
    to: Option<&str>,
    output: Output,
) -> Result<()> {
    restore(workspace, to, Some(service), output).await
}

async fn restore(
    workspace: &Workspace,
    to: Option<&str>,
    service: Option<&str>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let environment = &workspace.environment;
    output.progress(&format!(
        "Rolling back {} on {}",
        service.unwrap_or(&workspace.project.name),
        environment.name
    ));

    let session = connect(environment, &output).await?;
    let mut diag = Diagnostics::default();
    let result = restore_on(&session, workspace, to, service, &output, &mut diag).await;
    disconnect(session, environment, &mut diag).await;
    report_warnings(&diag, &output);

    let report = result?;
    for image in &report.images {
        output.progress(&format!("  ✓ Loaded {image}"));
    }
    output.success(&format!("Restored snapshot {}", report.snapshot));
    Ok(())
}

async fn restore_on(
    session: &Session,
    workspace: &Workspace,
    to: Option<&str>,
    service: Option<&str>,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<RestoreReport> {
    let environment = &workspace.environment;
    let runner = StepRunner::new(session);
    let snapshots = SnapshotManager::new(
        runner,
        &environment.layout,
        environment.retention,
        environment.sudo,
    );
    let id = snapshots.resolve(to).await?;
    output.progress(&format!("  → Restoring snapshot {id}..."));

    let engine = RollbackEngine::new(runner, &environment.layout, environment.sudo);
    match service {
        Some(name) => engine.restore_service(&id, name, diag).await,
        None => engine.restore(&id, diag).await,
    }
}

/// Print the snapshots of the environment, newest first.
pub async fn list_snapshots(workspace: &Workspace, output: Output) -> Result<()> {
    let environment = &workspace.environment;
    let session = connect(environment, &output).await?;
    let mut diag = Diagnostics::default();

    let result = SnapshotManager::new(
        StepRunner::new(&session),
        &environment.layout,
        environment.retention,
        environment.sudo,
    )
    .list()
    .await;
    disconnect(session, environment, &mut diag).await;
    report_warnings(&diag, &output);

    let ids = result?;
    if ids.is_empty() {
        output.success(&format!("No snapshots for {}", environment.name));
        return Ok(());
    }
    for id in &ids {
        output.item(&format!("{id}  {}", id.display_time()));
    }
    Ok(())
}

/// Store a new retention count for the environment in the project config.
pub fn configure_retention(workspace: &mut Workspace, keep: u32, output: Output) -> Result<()> {
    let name = workspace.environment.name.clone();
    workspace.project.set_retention(&name, keep)?;
    workspace.project.save(&workspace.dir)?;
    output.success(&format!("{name} keeps {keep} snapshot(s)"));
    Ok(())
}
