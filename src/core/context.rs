//! Pipeline context - values shared between the steps of one run

use std::path::{Path, PathBuf};

/// Mutable record owned by a single pipeline run
///
/// Carries the project identity plus anything an earlier step produces for a
/// later one. Discarded when the run ends.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Project name as given on the command line
    pub project_name: String,

    /// Resolved local project directory
    pub project_dir: PathBuf,

    /// Clone URL of the remote repository (set by create-remote or its check)
    pub remote_url: Option<String>,

    /// Commit at the local branch head (set by version-control init or the push check)
    pub head_commit: Option<String>,

    /// Public URL reported by the deployment
    pub deployment_url: Option<String>,
}

impl PipelineContext {
    /// Create a context for a project
    pub fn new(project_name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            project_dir: project_dir.into(),
            remote_url: None,
            head_commit: None,
            deployment_url: None,
        }
    }

    /// Path of a file inside the project directory
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.project_dir.join(relative)
    }
}
