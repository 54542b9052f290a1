//! Package dependency installation

use crate::core::template::MANIFEST_FILE;
use crate::core::{PipelineContext, ProvisionError, RetryPolicy, Step};
use crate::process::{CommandRunner, CommandSpec};
use crate::steps::INSTALL_DEPENDENCY;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::info;

/// Installs the web framework through the package manager
pub struct InstallDependency {
    runner: Arc<dyn CommandRunner>,
    npm: String,
    dependency: String,
    retry: RetryPolicy,
}

impl InstallDependency {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        npm: String,
        dependency: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            runner,
            npm,
            dependency,
            retry,
        }
    }

    /// Package name without a version suffix (`hono@4` -> `hono`, `@scope/pkg@1` -> `@scope/pkg`)
    pub fn package_name(&self) -> &str {
        let spec = self.dependency.as_str();
        match spec.char_indices().skip(1).find(|(_, c)| *c == '@') {
            Some((pos, _)) => &spec[..pos],
            None => spec,
        }
    }
}

#[async_trait]
impl Step for InstallDependency {
    fn name(&self) -> &'static str {
        INSTALL_DEPENDENCY
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        let path = ctx.path(MANIFEST_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(ProvisionError::io(
                    format!("failed to read {}", path.display()),
                    e,
                ))
            }
        };
        let manifest: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            ProvisionError::io(
                format!("failed to parse {}", path.display()),
                std::io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;

        Ok(manifest
            .get("dependencies")
            .and_then(|deps| deps.get(self.package_name()))
            .is_some())
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        info!("Installing {}", self.dependency);
        let spec = CommandSpec::new(&self.npm, &ctx.project_dir).args(["install", &self.dependency]);
        self.runner.run(&spec).await?.into_success(&self.npm)?;
        Ok(())
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(self.retry)
    }
}
