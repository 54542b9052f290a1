//! The provisioning step catalog
//!
//! Each step is an independent [`Step`] implementation. [`standard_catalog`]
//! wires them in their required order: the directory exists before files are
//! written, the commit exists before the push, the remote exists before the
//! push, and the push happens before the deploy.

pub mod dependency;
pub mod deploy;
pub mod files;
pub mod git;
pub mod remote;

use crate::core::{ProvisionConfig, ProvisionError, Step};
use crate::host::SourceHost;
use crate::process::CommandRunner;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

pub use dependency::InstallDependency;
pub use deploy::{DeployWorker, DeploymentMarker};
pub use files::{CreateProjectDirectory, InitManifest, WriteDeployConfig, WriteEntryPoint};
pub use git::{Git, InitRepository, PushToRemote};
pub use remote::CreateRemoteRepository;

pub const CREATE_DIRECTORY: &str = "Create local project directory";
pub const INIT_MANIFEST: &str = "Initialize package manifest";
pub const INSTALL_DEPENDENCY: &str = "Install dependency";
pub const WRITE_ENTRY_POINT: &str = "Write entry-point source file";
pub const WRITE_DEPLOY_CONFIG: &str = "Write deployment-config file";
pub const INIT_REPOSITORY: &str = "Initialize local version control";
pub const CREATE_REMOTE: &str = "Create remote repository";
pub const PUSH_REMOTE: &str = "Push to remote";
pub const DEPLOY: &str = "Deploy to edge platform";

/// Step names in execution order
pub const STEP_ORDER: [&str; 9] = [
    CREATE_DIRECTORY,
    INIT_MANIFEST,
    INSTALL_DEPENDENCY,
    WRITE_ENTRY_POINT,
    WRITE_DEPLOY_CONFIG,
    INIT_REPOSITORY,
    CREATE_REMOTE,
    PUSH_REMOTE,
    DEPLOY,
];

/// Build the nine provisioning steps in order
pub fn standard_catalog(
    config: &ProvisionConfig,
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn SourceHost>,
) -> Vec<Box<dyn Step>> {
    let settings = &config.settings;
    let credentials = &config.credentials;
    let git = Git::new(runner.clone(), settings.tools.git.clone());

    vec![
        Box::new(CreateProjectDirectory::new()),
        Box::new(InitManifest),
        Box::new(InstallDependency::new(
            runner.clone(),
            settings.tools.npm.clone(),
            settings.dependency.clone(),
            settings.retry,
        )),
        Box::new(WriteEntryPoint),
        Box::new(WriteDeployConfig::new(
            credentials.cloudflare_account_id.clone(),
        )),
        Box::new(InitRepository::new(
            git.clone(),
            settings.branch.clone(),
            settings.commit_message.clone(),
        )),
        Box::new(CreateRemoteRepository::new(
            host,
            settings.private,
            settings.retry,
        )),
        Box::new(PushToRemote::new(
            git,
            settings.branch.clone(),
            credentials.github_username.clone(),
            credentials.github_token.clone(),
            settings.retry,
        )),
        Box::new(DeployWorker::new(
            runner,
            settings.tools.wrangler.clone(),
            credentials.cloudflare_account_id.clone(),
            credentials.cloudflare_api_token.clone(),
            settings.retry,
        )),
    ]
}

/// `Ok(false)` for a missing path instead of an error
pub(crate) async fn path_exists(path: &Path) -> Result<bool, ProvisionError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| ProvisionError::io(format!("failed to inspect {}", path.display()), e))
}

/// Remove a file, treating an already-missing file as removed
pub(crate) async fn remove_file_if_present(path: &Path) -> Result<(), ProvisionError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::io(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}

/// Remove a directory tree, treating an already-missing directory as removed
pub(crate) async fn remove_dir_if_present(path: &Path) -> Result<(), ProvisionError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::io(
            format!("failed to remove {}", path.display()),
            e,
        )),
    }
}
