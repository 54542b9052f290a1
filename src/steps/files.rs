//! Local filesystem steps: project directory and generated files

use crate::core::template::{
    render_deploy_config, render_entry_point, render_manifest, DEPLOY_CONFIG_FILE,
    ENTRY_POINT_FILE, MANIFEST_FILE,
};
use crate::core::{PipelineContext, ProvisionError, Step};
use crate::steps::{
    path_exists, remove_dir_if_present, remove_file_if_present, CREATE_DIRECTORY, INIT_MANIFEST,
    WRITE_DEPLOY_CONFIG, WRITE_ENTRY_POINT,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

async fn write_file(path: &Path, contents: &str) -> Result<(), ProvisionError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| ProvisionError::io(format!("failed to write {}", path.display()), e))
}

/// Creates the project directory
///
/// Compensation removes the directory only if this step created it.
#[derive(Debug, Default)]
pub struct CreateProjectDirectory {
    created: AtomicBool,
}

impl CreateProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step for CreateProjectDirectory {
    fn name(&self) -> &'static str {
        CREATE_DIRECTORY
    }

    /// Satisfied only when the directory has content; an empty directory
    /// left by an interrupted run is treated as not yet created.
    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        let dir = &ctx.project_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(ProvisionError::io(
                    format!("failed to read {}", dir.display()),
                    e,
                ))
            }
        };
        let first = entries
            .next_entry()
            .await
            .map_err(|e| ProvisionError::io(format!("failed to read {}", dir.display()), e))?;
        Ok(first.is_some())
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let existing = tokio::fs::metadata(&ctx.project_dir)
            .await
            .is_ok_and(|meta| meta.is_dir());
        if existing {
            info!("Using existing directory {}", ctx.project_dir.display());
            return Ok(());
        }
        info!("Creating project directory {}", ctx.project_dir.display());
        tokio::fs::create_dir_all(&ctx.project_dir)
            .await
            .map_err(|e| {
                ProvisionError::io(
                    format!("failed to create {}", ctx.project_dir.display()),
                    e,
                )
            })?;
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        if !self.created.swap(false, Ordering::SeqCst) {
            info!(
                "Leaving {} in place; it existed before this run",
                ctx.project_dir.display()
            );
            return Ok(());
        }
        remove_dir_if_present(&ctx.project_dir).await
    }

    fn has_compensation(&self) -> bool {
        true
    }
}

/// Writes the package manifest
#[derive(Debug, Clone, Default)]
pub struct InitManifest;

#[async_trait]
impl Step for InitManifest {
    fn name(&self) -> &'static str {
        INIT_MANIFEST
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        path_exists(&ctx.path(MANIFEST_FILE)).await
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        info!("Writing {}", MANIFEST_FILE);
        write_file(&ctx.path(MANIFEST_FILE), &render_manifest(&ctx.project_name)).await
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        remove_file_if_present(&ctx.path(MANIFEST_FILE)).await
    }

    fn has_compensation(&self) -> bool {
        true
    }
}

/// Writes the worker entry point
#[derive(Debug, Clone, Default)]
pub struct WriteEntryPoint;

#[async_trait]
impl Step for WriteEntryPoint {
    fn name(&self) -> &'static str {
        WRITE_ENTRY_POINT
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        let path = ctx.path(ENTRY_POINT_FILE);
        let current = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(ProvisionError::io(
                    format!("failed to read {}", path.display()),
                    e,
                ))
            }
        };
        let expected = render_entry_point(&ctx.project_name);
        Ok(blake3::hash(&current) == blake3::hash(expected.as_bytes()))
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        info!("Writing {}", ENTRY_POINT_FILE);
        write_file(
            &ctx.path(ENTRY_POINT_FILE),
            &render_entry_point(&ctx.project_name),
        )
        .await
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        remove_file_if_present(&ctx.path(ENTRY_POINT_FILE)).await
    }

    fn has_compensation(&self) -> bool {
        true
    }
}

/// Writes the deployment config with the account id and today's date
#[derive(Debug, Clone)]
pub struct WriteDeployConfig {
    account_id: String,
    date: Option<NaiveDate>,
}

impl WriteDeployConfig {
    pub fn new(account_id: String) -> Self {
        Self {
            account_id,
            date: None,
        }
    }

    /// Pin the compatibility date instead of using today's
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

#[async_trait]
impl Step for WriteDeployConfig {
    fn name(&self) -> &'static str {
        WRITE_DEPLOY_CONFIG
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        path_exists(&ctx.path(DEPLOY_CONFIG_FILE)).await
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let date = self
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let contents = render_deploy_config(&ctx.project_name, &self.account_id, date)?;
        info!("Writing {}", DEPLOY_CONFIG_FILE);
        write_file(&ctx.path(DEPLOY_CONFIG_FILE), &contents).await
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        remove_file_if_present(&ctx.path(DEPLOY_CONFIG_FILE)).await
    }

    fn has_compensation(&self) -> bool {
        true
    }
}
