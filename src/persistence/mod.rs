//! Persistence layer for the run journal

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{RunResult, RunStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one provisioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub project_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_steps: usize,
    /// Steps executed by this run
    pub completed_steps: usize,
    /// Steps found already satisfied
    pub skipped_steps: usize,
    /// Last step, in declared order, left in place
    pub last_completed_step: Option<String>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a run summary, replacing any previous entry with the same ID
    async fn save_run(&self, run: &RunSummary) -> Result<()>;

    /// List runs for a project, newest first
    async fn list_runs(&self, project_name: &str) -> Result<Vec<RunSummary>>;

    /// Most recent run for a project
    async fn latest_run(&self, project_name: &str) -> Result<Option<RunSummary>> {
        Ok(self.list_runs(project_name).await?.into_iter().next())
    }

    /// All project names that have runs, sorted
    async fn list_projects(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or `--no-history` runs)
#[derive(Default)]
pub struct InMemoryPersistence {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_run(&self, run: &RunSummary) -> Result<()> {
        self.runs.write().await.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn list_runs(&self, project_name: &str) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<RunSummary> = runs
            .values()
            .filter(|r| r.project_name == project_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_projects(&self) -> Result<Vec<String>> {
        let runs = self.runs.read().await;
        let mut names: Vec<String> = runs.values().map(|r| r.project_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a finished run
pub fn create_summary(result: &RunResult) -> RunSummary {
    RunSummary {
        run_id: result.run_id,
        project_name: result.project_name.clone(),
        status: result.status,
        started_at: result.started_at,
        completed_at: result.completed_at,
        total_steps: result.steps.len(),
        completed_steps: result.executed_steps().len(),
        skipped_steps: result.skipped_steps().len(),
        last_completed_step: result.last_done_step().map(str::to_string),
        failed_step: result.failed_step().map(str::to_string),
        error: result.failure.as_ref().map(|f| f.error.to_string()),
    }
}
