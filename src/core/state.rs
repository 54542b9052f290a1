//! Execution state models

use crate::core::error::StepFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every step completed or was already satisfied
    Succeeded,
    /// A step failed; completed work was left in place
    Failed,
    /// A step failed and executed steps were compensated
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
            RunStatus::RolledBack => "RolledBack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Succeeded" => Some(RunStatus::Succeeded),
            "Failed" => Some(RunStatus::Failed),
            "RolledBack" => Some(RunStatus::RolledBack),
            _ => None,
        }
    }
}

/// State of a single step within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Not reached yet
    Pending,
    /// Idempotency check reported the effect already in place
    Skipped {
        reason: String,
    },
    /// Executed successfully in this run
    Completed {
        attempts: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Check or action failed
    Failed {
        error: String,
        attempts: u32,
        failed_at: DateTime<Utc>,
    },
    /// Executed in this run, then undone during rollback
    Compensated,
    /// Rollback of this step failed
    CompensationFailed {
        error: String,
    },
}

impl StepState {
    /// Step finished without failing (ran or was already satisfied)
    pub fn is_done(&self) -> bool {
        matches!(self, StepState::Completed { .. } | StepState::Skipped { .. })
    }
}

/// Per-step entry of a run result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
}

/// Terminal outcome of a pipeline run
#[derive(Debug)]
pub struct RunResult {
    pub run_id: Uuid,
    pub project_name: String,
    pub status: RunStatus,
    pub steps: Vec<StepRecord>,
    /// First failed step and its cause
    pub failure: Option<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Name of the failed step, if any
    pub fn failed_step(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.step.as_str())
    }

    /// State of a step by name
    pub fn state_of(&self, name: &str) -> Option<&StepState> {
        self.steps.iter().find(|s| s.name == name).map(|s| &s.state)
    }

    /// Steps whose action ran in this run
    pub fn executed_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| {
                matches!(
                    s.state,
                    StepState::Completed { .. }
                        | StepState::Compensated
                        | StepState::CompensationFailed { .. }
                )
            })
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Steps skipped because they were already satisfied
    pub fn skipped_steps(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Skipped { .. }))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Steps that are in place at the end of the run
    pub fn done_count(&self) -> usize {
        self.steps.iter().filter(|s| s.state.is_done()).count()
    }

    /// Last step, in declared order, that is in place at the end of the run
    pub fn last_done_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .take_while(|s| s.state.is_done())
            .last()
            .map(|s| s.name.as_str())
    }
}
