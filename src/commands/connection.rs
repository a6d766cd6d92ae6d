// ABOUTME: Opens and closes the SSH session to an environment's server.
// ABOUTME: Shared by the sync and rollback commands.

use scion::config::EnvironmentContext;
use scion::diagnostics::{Diagnostics, Warning};
use scion::error::Result;
use scion::output::Output;
use scion::ssh::Session;

pub async fn connect(environment: &EnvironmentContext, output: &Output) -> Result<Session> {
    output.progress(&format!(
        "  → Connecting to {}...",
        environment.server.host
    ));
    Ok(Session::connect(environment.ssh_session_config()).await?)
}

/// Close the session; failures only produce a warning.
pub async fn disconnect(session: Session, environment: &EnvironmentContext, diag: &mut Diagnostics) {
    if let Err(e) = session.disconnect().await {
        diag.warn(Warning::ssh_disconnect(format!(
            "SSH disconnect failed for {}: {}",
            environment.server.host, e
        )));
    }
}

/// Print collected warnings.
pub fn report_warnings(diag: &Diagnostics, output: &Output) {
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
}
