//! Version-control steps: local repository and push

use crate::core::config::ConfigError;
use crate::core::template::{render_gitignore, GITIGNORE_FILE};
use crate::core::{PipelineContext, ProvisionError, RetryPolicy, Secret, Step};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::steps::{path_exists, remove_dir_if_present, INIT_REPOSITORY, PUSH_REMOTE};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Thin wrapper around the git executable
#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, program: String) -> Self {
        Self { runner, program }
    }

    fn spec(&self, cwd: &Path, args: &[&str]) -> CommandSpec {
        CommandSpec::new(&self.program, cwd).args(args.iter().copied())
    }

    /// Run git and return the output whatever the exit code
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, ProvisionError> {
        self.runner.run(&self.spec(cwd, args)).await
    }

    /// Run git and fail on a non-zero exit
    pub async fn run_checked(
        &self,
        cwd: &Path,
        args: &[&str],
    ) -> Result<CommandOutput, ProvisionError> {
        self.run(cwd, args).await?.into_success(&self.program)
    }

    /// Run git with extra (secret) environment and fail on a non-zero exit
    pub async fn run_with_env(
        &self,
        cwd: &Path,
        args: &[&str],
        env: &[(String, Secret)],
    ) -> Result<CommandOutput, ProvisionError> {
        let mut spec = self.spec(cwd, args);
        spec.env.extend(env.iter().cloned());
        self.runner.run(&spec).await?.into_success(&self.program)
    }

    /// Commit at `HEAD`, or `None` when the repository has no commits
    pub async fn head_commit(&self, cwd: &Path) -> Result<Option<String>, ProvisionError> {
        let output = self.run(cwd, &["rev-parse", "--verify", "HEAD"]).await?;
        if !output.success() {
            return Ok(None);
        }
        let sha = output.stdout.trim();
        Ok((!sha.is_empty()).then(|| sha.to_string()))
    }
}

/// Environment that makes git send HTTP basic auth without storing it
///
/// Uses `GIT_CONFIG_*` so the token never lands in the remote URL,
/// `.git/config` or the process argument list.
pub fn auth_env(username: &str, token: &Secret) -> Vec<(String, Secret)> {
    let basic = STANDARD.encode(format!("{}:{}", username, token.expose()));
    vec![
        ("GIT_TERMINAL_PROMPT".to_string(), Secret::new("0")),
        ("GIT_CONFIG_COUNT".to_string(), Secret::new("1")),
        ("GIT_CONFIG_KEY_0".to_string(), Secret::new("http.extraHeader")),
        (
            "GIT_CONFIG_VALUE_0".to_string(),
            Secret::new(format!("Authorization: Basic {}", basic)),
        ),
    ]
}

fn nothing_to_commit(output: &CommandOutput) -> bool {
    output.stdout.contains("nothing to commit") || output.stderr.contains("nothing to commit")
}

/// Initializes the local repository and makes the first commit
pub struct InitRepository {
    git: Git,
    branch: String,
    commit_message: String,
}

impl InitRepository {
    pub fn new(git: Git, branch: String, commit_message: String) -> Self {
        Self {
            git,
            branch,
            commit_message,
        }
    }
}

#[async_trait]
impl Step for InitRepository {
    fn name(&self) -> &'static str {
        INIT_REPOSITORY
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        if !path_exists(&ctx.path(".git")).await? {
            return Ok(false);
        }
        match self.git.head_commit(&ctx.project_dir).await? {
            Some(sha) => {
                ctx.head_commit = Some(sha);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let dir = ctx.project_dir.clone();

        let gitignore = ctx.path(GITIGNORE_FILE);
        if !path_exists(&gitignore).await? {
            tokio::fs::write(&gitignore, render_gitignore())
                .await
                .map_err(|e| {
                    ProvisionError::io(format!("failed to write {}", gitignore.display()), e)
                })?;
        }

        info!("Initializing git repository on branch {}", self.branch);
        let initial_branch = format!("--initial-branch={}", self.branch);
        self.git.run_checked(&dir, &["init", &initial_branch]).await?;
        self.git.run_checked(&dir, &["add", "."]).await?;

        let commit = self
            .git
            .run(&dir, &["commit", "-m", &self.commit_message])
            .await?;
        if !commit.success() {
            if nothing_to_commit(&commit) {
                debug!("Nothing to commit in {}", dir.display());
            } else {
                commit.into_success(&self.git.program)?;
            }
        }

        ctx.head_commit = self.git.head_commit(&dir).await?;
        Ok(())
    }

    async fn compensate(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        ctx.head_commit = None;
        remove_dir_if_present(&ctx.path(".git")).await
    }

    fn has_compensation(&self) -> bool {
        true
    }
}

/// Pushes the local branch to the remote repository
pub struct PushToRemote {
    git: Git,
    branch: String,
    username: String,
    token: Secret,
    retry: RetryPolicy,
}

impl PushToRemote {
    pub fn new(
        git: Git,
        branch: String,
        username: String,
        token: Secret,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            git,
            branch,
            username,
            token,
            retry,
        }
    }

    async fn remote_head(
        &self,
        dir: &Path,
        remote_url: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let refname = format!("refs/heads/{}", self.branch);
        let env = auth_env(&self.username, &self.token);
        let output = self
            .git
            .run_with_env(dir, &["ls-remote", remote_url, &refname], &env)
            .await?;
        Ok(output
            .stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string))
    }
}

#[async_trait]
impl Step for PushToRemote {
    fn name(&self) -> &'static str {
        PUSH_REMOTE
    }

    async fn is_satisfied(&self, ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        let Some(remote_url) = ctx.remote_url.clone() else {
            return Ok(false);
        };
        if !path_exists(&ctx.path(".git")).await? {
            return Ok(false);
        }
        let Some(local) = self.git.head_commit(&ctx.project_dir).await? else {
            return Ok(false);
        };
        ctx.head_commit = Some(local.clone());

        let remote = self.remote_head(&ctx.project_dir, &remote_url).await?;
        Ok(remote.as_deref() == Some(local.as_str()))
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        let remote_url = ctx
            .remote_url
            .clone()
            .ok_or(ConfigError::MissingValue("remote repository URL"))?;
        let dir = ctx.project_dir.clone();

        let current = self.git.run(&dir, &["remote", "get-url", "origin"]).await?;
        if !current.success() {
            self.git
                .run_checked(&dir, &["remote", "add", "origin", &remote_url])
                .await?;
        } else if current.stdout.trim() != remote_url {
            self.git
                .run_checked(&dir, &["remote", "set-url", "origin", &remote_url])
                .await?;
        }

        info!("Pushing {} to {}", self.branch, remote_url);
        let env = auth_env(&self.username, &self.token);
        self.git
            .run_with_env(&dir, &["push", "-u", "origin", &self.branch], &env)
            .await?;

        ctx.head_commit = self.git.head_commit(&dir).await?;
        Ok(())
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(self.retry)
    }
}
