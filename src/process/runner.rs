//! Subprocess runner backed by tokio

use crate::core::ProvisionError;
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs programs as child processes
///
/// Children are killed when the returned future is dropped, so an interrupted
/// step does not leave a stray `git push` or `wrangler deploy` behind.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        debug!("Running `{}` in {}", spec.display(), spec.cwd.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            command.env(key, value.expose());
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProvisionError::io(format!("failed to spawn {}", spec.program), e))?;

        let code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if code != 0 {
            warn!("`{}` exited with code {}: {}", spec.display(), code, stderr.trim());
        } else {
            debug!("`{}` returned {} bytes of output", spec.display(), stdout.len());
        }

        Ok(CommandOutput {
            code,
            stdout,
            stderr,
        })
    }
}
