//! Remote repository creation on the source host

use crate::core::{PipelineContext, ProvisionError, RetryPolicy, Step};
use crate::host::SourceHost;
use crate::steps::CREATE_REMOTE;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates the remote repository and records its clone URL
pub struct CreateRemoteRepository {
    host: Arc<dyn SourceHost>,
    private: bool,
    retry: RetryPolicy,
}

impl CreateRemoteRepository {
    pub fn new(host: Arc<dyn SourceHost>, private: bool, retry: RetryPolicy) -> Self {
        Self {
            host,
            private,
            retry,
        }
    }
}

#[async_trait]
impl Step for CreateRemoteRepository {
    fn name(&self) -> &'static str {
        CREATE_REMOTE
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        match self.host.find_repository(&ctx.project_name).await? {
            Some(repo) => {
                ctx.remote_url = Some(repo.clone_url);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let repo = self
            .host
            .create_repository(&ctx.project_name, self.private)
            .await?;
        info!("Repository created: {}", repo.clone_url);
        ctx.remote_url = Some(repo.clone_url);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        self.host.delete_repository(&ctx.project_name).await?;
        ctx.remote_url = None;
        Ok(())
    }

    fn has_compensation(&self) -> bool {
        true
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(self.retry)
    }
}
