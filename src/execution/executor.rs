//! Step executor - runs one call into a step under a timeout and cancellation

use crate::core::{PipelineContext, ProvisionError, Step};
use std::future::Future;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};
use tracing::{debug, error};

/// Executes single step operations
///
/// Every call is bounded by the step timeout. When a cancellation receiver is
/// attached, a signal drops the in-flight future (killing any child process
/// it owns) and the call fails with [`ProvisionError::Interrupted`].
pub struct StepExecutor {
    step_timeout: Duration,
    cancel: Option<watch::Receiver<bool>>,
}

impl StepExecutor {
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            step_timeout,
            cancel: None,
        }
    }

    /// Attach a cancellation signal; sending `true` interrupts the current call
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the idempotency check of a step
    pub async fn check(
        &self,
        step: &dyn Step,
        ctx: &mut PipelineContext,
    ) -> Result<bool, ProvisionError> {
        debug!("Checking step: {}", step.name());
        self.guard(step.name(), step.is_satisfied(ctx)).await
    }

    /// Run one attempt of a step's action
    pub async fn attempt(
        &self,
        step: &dyn Step,
        ctx: &mut PipelineContext,
    ) -> Result<(), ProvisionError> {
        debug!("Executing step: {}", step.name());
        self.guard(step.name(), step.execute(ctx)).await
    }

    /// Run a step's compensation; only the timeout applies
    pub async fn compensate(
        &self,
        step: &dyn Step,
        ctx: &mut PipelineContext,
    ) -> Result<(), ProvisionError> {
        debug!("Compensating step: {}", step.name());
        match timeout(self.step_timeout, step.compensate(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout {
                secs: self.step_timeout.as_secs(),
            }),
        }
    }

    /// Sleep between retries, waking early on cancellation
    pub async fn pause(&self, delay: Duration) -> Result<(), ProvisionError> {
        match self.cancel.clone() {
            Some(mut rx) => tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                _ = cancelled(&mut rx) => Err(ProvisionError::Interrupted),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    async fn guard<T, F>(&self, name: &str, fut: F) -> Result<T, ProvisionError>
    where
        F: Future<Output = Result<T, ProvisionError>>,
    {
        let timed = timeout(self.step_timeout, fut);
        let result = match self.cancel.clone() {
            Some(mut rx) => tokio::select! {
                r = timed => r,
                _ = cancelled(&mut rx) => {
                    error!("Step {} interrupted", name);
                    return Err(ProvisionError::Interrupted);
                }
            },
            None => timed.await,
        };

        match result {
            Ok(inner) => inner,
            Err(_) => {
                error!("Timeout for step {} after {}s", name, self.step_timeout.as_secs());
                Err(ProvisionError::Timeout {
                    secs: self.step_timeout.as_secs(),
                })
            }
        }
    }
}

/// Resolves once the signal is `true`; never resolves if the sender goes away first
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
