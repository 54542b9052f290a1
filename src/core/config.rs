//! Provisioning configuration: credentials from the environment, settings from YAML

use crate::core::step::RetryPolicy;
use crate::core::template::{worker_name, MAX_WORKER_NAME_LEN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const GITHUB_USERNAME: &str = "GITHUB_USERNAME";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const CLOUDFLARE_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
pub const CLOUDFLARE_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";

/// Dotenv file read from the working directory
pub const DOTENV_FILE: &str = ".env";

const MAX_PROJECT_NAME_LEN: usize = 100;

/// Configuration problems detected before (or while) the pipeline runs
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    #[error("invalid project name '{name}': {reason}")]
    InvalidProjectName { name: String, reason: String },

    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("missing required value: {0}")]
    MissingValue(&'static str),

    #[error("failed to read {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// A credential value that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value; only call this where the value is handed to its consumer
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Account identifiers and tokens for the source host and the edge platform
#[derive(Debug, Clone)]
pub struct Credentials {
    pub github_username: String,
    pub github_token: Secret,
    pub cloudflare_account_id: String,
    pub cloudflare_api_token: Secret,
}

impl Credentials {
    /// Resolve credentials from the process environment, then `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = read_dotenv(Path::new(DOTENV_FILE))?;
        Self::from_layers(|key| std::env::var(key).ok(), &file)
    }

    /// Resolve credentials from `env`, falling back to values read from a dotenv file
    pub fn from_layers<F>(env: F, file: &HashMap<String, String>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| {
            env(key)
                .filter(|value| !value.trim().is_empty())
                .or_else(|| file.get(key).cloned())
        })
    }

    /// Resolve credentials through an arbitrary lookup, reporting every missing key at once
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut fetch = |key: &'static str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let github_username = fetch(GITHUB_USERNAME);
        let github_token = fetch(GITHUB_TOKEN);
        let cloudflare_account_id = fetch(CLOUDFLARE_ACCOUNT_ID);
        let cloudflare_api_token = fetch(CLOUDFLARE_API_TOKEN);

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing));
        }

        Ok(Self {
            github_username,
            github_token: Secret::new(github_token),
            cloudflare_account_id,
            cloudflare_api_token: Secret::new(cloudflare_api_token),
        })
    }
}

/// What to do with completed work when a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Leave completed work in place; the next run continues after it
    #[default]
    Resume,
    /// Undo the steps executed in this run, newest first
    Rollback,
}

/// Executables invoked by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub git: String,
    pub npm: String,
    pub wrangler: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            npm: "npm".to_string(),
            wrangler: "wrangler".to_string(),
        }
    }
}

/// Tunable settings, optionally loaded from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory the project directory is created in
    pub parent_dir: PathBuf,

    /// Branch created locally and pushed
    pub branch: String,

    /// Create the remote repository as private
    pub private: bool,

    /// Message of the initial commit
    pub commit_message: String,

    /// Package installed into the project
    pub dependency: String,

    /// Base URL of the source-host API
    pub api_base: String,

    /// Recovery behaviour on failure
    pub rerun: RecoveryMode,

    /// Backoff applied to network-bound steps
    pub retry: RetryPolicy,

    /// Timeout for a single attempt of a step
    pub step_timeout_secs: u64,

    pub tools: ToolPaths,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parent_dir: PathBuf::from("."),
            branch: "master".to_string(),
            private: true,
            commit_message: "Initial commit for Hono Cloudflare Worker".to_string(),
            dependency: "hono".to_string(),
            api_base: "https://api.github.com".to_string(),
            rerun: RecoveryMode::Resume,
            retry: RetryPolicy::default(),
            step_timeout_secs: 300,
            tools: ToolPaths::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string; absent keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("branch must not be empty".to_string()));
        }
        if self.dependency.trim().is_empty() {
            return Err(ConfigError::Invalid("dependency must not be empty".to_string()));
        }
        if self.commit_message.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "commit_message must not be empty".to_string(),
            ));
        }
        if self.step_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "step_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        self.retry.validate()
    }
}

/// Everything resolved at startup and passed down into the pipeline
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub credentials: Credentials,
    pub settings: Settings,
}

impl ProvisionConfig {
    pub fn new(credentials: Credentials, settings: Settings) -> Self {
        Self {
            credentials,
            settings,
        }
    }

    /// Local path of the given project
    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.settings.parent_dir.join(project_name)
    }
}

fn project_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("project name pattern is valid")
    })
}

/// Check that a project name is usable as a directory, repository and worker name
/// Read `KEY=value` pairs from a dotenv file; a missing file yields none
pub fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let to_error = |source| ConfigError::Dotenv {
        path: path.to_path_buf(),
        source,
    };
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries.map(|entry| entry.map_err(to_error)).collect(),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(to_error(e)),
    }
}

pub fn validate_project_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidProjectName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(invalid("must be at most 100 characters"));
    }
    if !project_name_pattern().is_match(name) {
        return Err(invalid(
            "use letters, digits, '.', '_' or '-', starting with a letter or digit",
        ));
    }
    if worker_name(name).len() > MAX_WORKER_NAME_LEN {
        return Err(invalid("worker name must be at most 63 characters"));
    }
    Ok(())
}
