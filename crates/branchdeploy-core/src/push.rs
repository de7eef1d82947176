//! Schema push through a user-configured shell command.
//!
//! The command runs through `sh -c` with `DATABASE_URL` pointing at the
//! temporary credential. Its stdout streams through to the pipeline log;
//! stderr is captured so a failure can be reported with secrets removed.

use crate::error::{DeployError, Result};
use crate::redact::redact;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCommand {
    pub command: String,
    pub workspace: Option<PathBuf>,
}

impl PushCommand {
    pub fn new(command: impl Into<String>, workspace: Option<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workspace,
        }
    }

    /// Run the push against `connection_url`. Failure text is redacted of
    /// both the service token and the connection URL.
    pub fn run(&self, connection_url: &str, secret: &str) -> Result<()> {
        tracing::info!(command = %self.command, "running schema push command");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", &self.command])
            .env("DATABASE_URL", connection_url)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());
        if let Some(dir) = self.workspace.as_deref() {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .map_err(|e| DeployError::PushFailed(format!("could not start '{}': {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = format!("{} exited with {}: {}", self.command, output.status, stderr.trim());
            return Err(DeployError::PushFailed(redact(
                &redact(&message, secret),
                connection_url,
            )));
        }
        Ok(())
    }
}
