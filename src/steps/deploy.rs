//! Deployment to the edge platform

use crate::core::template::{DEPLOY_CONFIG_FILE, ENTRY_POINT_FILE, MANIFEST_FILE};
use crate::core::{PipelineContext, ProvisionError, RetryPolicy, Secret, Step};
use crate::process::{CommandRunner, CommandSpec};
use crate::steps::DEPLOY;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

const STATE_DIR: &str = ".provision";
const MARKER_FILE: &str = "deployment.json";

/// Files that make up a deployable build
const BUILD_INPUTS: [&str; 3] = [MANIFEST_FILE, ENTRY_POINT_FILE, DEPLOY_CONFIG_FILE];

/// Record of the last successful deployment, kept out of version control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMarker {
    pub build_hash: String,
    pub deployed_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

impl DeploymentMarker {
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(STATE_DIR).join(MARKER_FILE)
    }

    /// Load the marker; a missing or unreadable marker means "not deployed"
    pub async fn load(project_dir: &Path) -> Option<Self> {
        let content = tokio::fs::read_to_string(Self::path(project_dir)).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(marker) => Some(marker),
            Err(e) => {
                warn!("Ignoring unreadable deployment marker: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, project_dir: &Path) -> Result<(), ProvisionError> {
        let path = Self::path(project_dir);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProvisionError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            ProvisionError::io(
                "failed to serialize deployment marker",
                std::io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ProvisionError::io(format!("failed to write {}", path.display()), e))
    }
}

/// Hash of the files that make up the build
pub async fn build_hash(project_dir: &Path) -> Result<String, ProvisionError> {
    let mut hasher = blake3::Hasher::new();
    for name in BUILD_INPUTS {
        let path = project_dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ProvisionError::io(format!("failed to read {}", path.display()), e))?;
        hasher.update(name.as_bytes());
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn workers_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https://[A-Za-z0-9.-]+\.workers\.dev\S*").expect("workers URL pattern is valid")
    })
}

/// First workers.dev URL in the deploy output
pub fn extract_deployment_url(output: &str) -> Option<String> {
    workers_url_pattern()
        .find(output)
        .map(|m| m.as_str().to_string())
}

/// Deploys the worker through the platform CLI
pub struct DeployWorker {
    runner: Arc<dyn CommandRunner>,
    wrangler: String,
    account_id: String,
    api_token: Secret,
    retry: RetryPolicy,
}

impl DeployWorker {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        wrangler: String,
        account_id: String,
        api_token: Secret,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            runner,
            wrangler,
            account_id,
            api_token,
            retry,
        }
    }
}

#[async_trait]
impl Step for DeployWorker {
    fn name(&self) -> &'static str {
        DEPLOY
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        let Some(marker) = DeploymentMarker::load(&ctx.project_dir).await else {
            return Ok(false);
        };
        let current = build_hash(&ctx.project_dir).await?;
        if marker.build_hash != current {
            return Ok(false);
        }
        ctx.deployment_url = marker.url;
        Ok(true)
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        info!("Deploying {} to the edge platform", ctx.project_name);
        let spec = CommandSpec::new(&self.wrangler, &ctx.project_dir)
            .arg("deploy")
            .env("CLOUDFLARE_API_TOKEN", self.api_token.clone())
            .env("CLOUDFLARE_ACCOUNT_ID", Secret::new(self.account_id.clone()));
        let output = self.runner.run(&spec).await?.into_success(&self.wrangler)?;

        let url = extract_deployment_url(&output.stdout);
        if let Some(url) = &url {
            info!("Deployed to {}", url);
        }
        ctx.deployment_url = url.clone();

        let marker = DeploymentMarker {
            build_hash: build_hash(&ctx.project_dir).await?,
            deployed_at: Utc::now(),
            url,
            commit: ctx.head_commit.clone(),
        };
        marker.save(&ctx.project_dir).await
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(self.retry)
    }
}
