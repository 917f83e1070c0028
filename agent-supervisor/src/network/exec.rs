//! Command execution seam for host configuration tools.

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SupervisorError};

/// Runs an external program to completion.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. A non-zero exit status is an error.
    async fn run(&self, program: &str, args: &[String]) -> Result<()>;
}

/// Runs commands on the host.
#[derive(Clone, Debug, Default)]
pub struct SystemCommandRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<()> {
        debug!("exec: {program} {}", args.join(" "));
        let output = Command::new(program).args(args).output().await.map_err(|err| {
            SupervisorError::Command(format!("failed to run {program}: {err}"))
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(SupervisorError::Command(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )))
    }
}
