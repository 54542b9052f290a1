//! Main execution engine - orchestrates the entire provisioning run

use crate::core::{
    PipelineContext, ProvisionError, RecoveryMode, RetryPolicy, RunResult, RunStatus, Step,
    StepFailure, StepRecord, StepState,
};
use crate::execution::StepExecutor;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        project_name: String,
        total_steps: usize,
    },
    StepSkipped {
        step: String,
        index: usize,
        total: usize,
    },
    StepStarted {
        step: String,
        index: usize,
        total: usize,
    },
    StepRetrying {
        step: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
    },
    StepCompleted {
        step: String,
        attempts: u32,
    },
    StepFailed {
        step: String,
        error: String,
    },
    CompensationStarted {
        step: String,
    },
    CompensationCompleted {
        step: String,
    },
    CompensationFailed {
        step: String,
        error: String,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// How a step ended up satisfied
enum StepOutcome {
    /// The check passed before any action ran
    AlreadySatisfied,
    /// The action ran; holds the number of action attempts
    Ran(u32),
}

/// Result of evaluating one idempotency check in plan mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub name: String,
    pub satisfied: bool,
}

/// Pipeline executor
///
/// Runs steps strictly in order. A satisfied step is skipped; the first
/// failure halts the run. In [`RecoveryMode::Rollback`] the steps executed
/// by this run are then compensated newest first.
pub struct ExecutionEngine {
    executor: StepExecutor,
    mode: RecoveryMode,
    event_handlers: Vec<EventHandler>,
}

impl ExecutionEngine {
    pub fn new(mode: RecoveryMode, step_timeout: Duration) -> Self {
        Self {
            executor: StepExecutor::new(step_timeout),
            mode,
            event_handlers: Vec::new(),
        }
    }

    /// Interrupt the run when the receiver observes `true`
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.executor = self.executor.with_cancellation(cancel);
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn mode(&self) -> RecoveryMode {
        self.mode
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Execute the steps against the context
    pub async fn execute(&self, steps: &[Box<dyn Step>], ctx: &mut PipelineContext) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = steps.len();

        info!("Starting provisioning run: {} ({})", ctx.project_name, run_id);
        self.emit_event(ExecutionEvent::PipelineStarted {
            run_id,
            project_name: ctx.project_name.clone(),
            total_steps: total,
        });

        let mut records: Vec<StepRecord> = steps
            .iter()
            .map(|s| StepRecord {
                name: s.name().to_string(),
                state: StepState::Pending,
            })
            .collect();
        let mut failure = None;

        for (index, step) in steps.iter().enumerate() {
            let name = step.name();
            let step_started = Utc::now();

            match self.run_step(step.as_ref(), ctx, index, total).await {
                Ok(StepOutcome::AlreadySatisfied) => {
                    info!("Step {} already satisfied, skipping", name);
                    records[index].state = StepState::Skipped {
                        reason: "already satisfied".to_string(),
                    };
                    self.emit_event(ExecutionEvent::StepSkipped {
                        step: name.to_string(),
                        index,
                        total,
                    });
                }
                Ok(StepOutcome::Ran(attempts)) => {
                    info!("Step {} completed", name);
                    records[index].state = StepState::Completed {
                        attempts,
                        started_at: step_started,
                        completed_at: Utc::now(),
                    };
                    self.emit_event(ExecutionEvent::StepCompleted {
                        step: name.to_string(),
                        attempts,
                    });
                }
                Err((e, attempts)) => {
                    failure = Some(self.mark_step_failed(&mut records[index], e, attempts));
                    break;
                }
            }
        }

        let status = match (&failure, self.mode) {
            (None, _) => RunStatus::Succeeded,
            (Some(_), RecoveryMode::Resume) => RunStatus::Failed,
            (Some(_), RecoveryMode::Rollback) => self.rollback(steps, &mut records, ctx).await,
        };

        info!(
            "Provisioning run finished: {} - {:?}",
            ctx.project_name, status
        );
        self.emit_event(ExecutionEvent::PipelineCompleted { run_id, status });

        RunResult {
            run_id,
            project_name: ctx.project_name.clone(),
            status,
            steps: records,
            failure,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Evaluate every idempotency check in order without running any action
    pub async fn plan(
        &self,
        steps: &[Box<dyn Step>],
        ctx: &mut PipelineContext,
    ) -> Result<Vec<PlannedStep>, StepFailure> {
        let mut planned = Vec::with_capacity(steps.len());
        for step in steps {
            let satisfied = self
                .executor
                .check(step.as_ref(), ctx)
                .await
                .map_err(|error| StepFailure {
                    step: step.name().to_string(),
                    error,
                })?;
            planned.push(PlannedStep {
                name: step.name().to_string(),
                satisfied,
            });
        }
        Ok(planned)
    }

    /// Check a step and run its action until it is satisfied
    ///
    /// Transient errors from either the check or the action are retried per
    /// the step's policy. The check runs again before every retry, so an
    /// action whose effect landed despite an error is not repeated.
    async fn run_step(
        &self,
        step: &dyn Step,
        ctx: &mut PipelineContext,
        index: usize,
        total: usize,
    ) -> Result<StepOutcome, (ProvisionError, u32)> {
        let policy = step.retry_policy().unwrap_or_else(RetryPolicy::none);
        let max_attempts = policy.max_retries + 1;
        let mut tries = 1;
        let mut attempts = 0;

        loop {
            if self.executor.is_cancelled() {
                return Err((ProvisionError::Interrupted, attempts));
            }

            let outcome = match self.executor.check(step, ctx).await {
                Ok(true) if attempts == 0 => Ok(StepOutcome::AlreadySatisfied),
                Ok(true) => {
                    info!(
                        "Step {} satisfied after a failed attempt, not repeating it",
                        step.name()
                    );
                    Ok(StepOutcome::Ran(attempts))
                }
                Ok(false) => {
                    if attempts == 0 {
                        self.emit_event(ExecutionEvent::StepStarted {
                            step: step.name().to_string(),
                            index,
                            total,
                        });
                    }
                    attempts += 1;
                    self.executor
                        .attempt(step, ctx)
                        .await
                        .map(|()| StepOutcome::Ran(attempts))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transient() && tries < max_attempts => {
                    let delay = policy.delay_for(tries);
                    warn!(
                        "Step {} failed on try {}/{}: {}; retrying in {:?}",
                        step.name(),
                        tries,
                        max_attempts,
                        e,
                        delay
                    );
                    self.emit_event(ExecutionEvent::StepRetrying {
                        step: step.name().to_string(),
                        attempt: tries + 1,
                        max_attempts,
                        delay,
                        error: e.to_string(),
                    });
                    if let Err(interrupted) = self.executor.pause(delay).await {
                        return Err((interrupted, attempts));
                    }
                    tries += 1;
                }
                Err(e) => return Err((e, attempts)),
            }
        }
    }

    /// Record a failed step and build the failure report
    fn mark_step_failed(
        &self,
        record: &mut StepRecord,
        error: ProvisionError,
        attempts: u32,
    ) -> StepFailure {
        error!("Step {} failed: {}", record.name, error);
        record.state = StepState::Failed {
            error: error.to_string(),
            attempts,
            failed_at: Utc::now(),
        };
        self.emit_event(ExecutionEvent::StepFailed {
            step: record.name.clone(),
            error: error.to_string(),
        });
        StepFailure {
            step: record.name.clone(),
            error,
        }
    }

    /// Compensate the steps this run executed, newest first
    ///
    /// Every compensation is attempted even if an earlier one fails.
    async fn rollback(
        &self,
        steps: &[Box<dyn Step>],
        records: &mut [StepRecord],
        ctx: &mut PipelineContext,
    ) -> RunStatus {
        let mut clean = true;

        for (step, record) in steps.iter().zip(records.iter_mut()).rev() {
            if !matches!(record.state, StepState::Completed { .. }) || !step.has_compensation() {
                continue;
            }

            info!("Compensating step {}", record.name);
            self.emit_event(ExecutionEvent::CompensationStarted {
                step: record.name.clone(),
            });

            match self.executor.compensate(step.as_ref(), ctx).await {
                Ok(()) => {
                    record.state = StepState::Compensated;
                    self.emit_event(ExecutionEvent::CompensationCompleted {
                        step: record.name.clone(),
                    });
                }
                Err(e) => {
                    error!("Compensation of {} failed: {}", record.name, e);
                    clean = false;
                    record.state = StepState::CompensationFailed {
                        error: e.to_string(),
                    };
                    self.emit_event(ExecutionEvent::CompensationFailed {
                        step: record.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if clean {
            RunStatus::RolledBack
        } else {
            RunStatus::Failed
        }
    }
}
