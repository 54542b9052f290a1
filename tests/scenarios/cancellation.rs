//! Test: Cancellation - an interrupt fails the running step

use crate::helpers::*;
use async_trait::async_trait;
use provision::core::{ProvisionError, RecoveryMode, RetryPolicy, RunStatus, Step};
use provision::execution::ExecutionEngine;
use provision::PipelineContext;
use std::time::Duration;
use tokio::sync::watch;

struct HangingStep;

#[async_trait]
impl Step for HangingStep {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn is_satisfied(&self, _ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        Ok(false)
    }

    async fn execute(&self, _ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    fn retry_policy(&self) -> Option<RetryPolicy> {
        Some(RetryPolicy {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            multiplier: 1.0,
        })
    }
}

#[tokio::test]
async fn test_interrupt_fails_current_step() {
    let log = new_log();
    let steps: Vec<Box<dyn Step>> = vec![
        RecordingStep::new("before", &log).boxed(),
        Box::new(HangingStep),
        RecordingStep::new("after", &log).boxed(),
    ];
    let (tx, rx) = watch::channel(false);
    let engine =
        ExecutionEngine::new(RecoveryMode::Resume, Duration::from_secs(30)).with_cancellation(rx);
    let mut ctx = PipelineContext::new(PROJECT, "unused");

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    let result = engine.execute(&steps, &mut ctx).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_step(), Some("hanging"));
    assert!(matches!(
        result.failure.as_ref().map(|f| &f.error),
        Some(ProvisionError::Interrupted)
    ));
    // Interrupts are final even for steps with a retry policy
    assert_eq!(entries(&log), vec!["check:before", "run:before"]);
}

#[tokio::test]
async fn test_step_timeout_is_reported() {
    let steps: Vec<Box<dyn Step>> = vec![Box::new(HangingStep)];
    let engine = ExecutionEngine::new(RecoveryMode::Resume, Duration::from_millis(20));
    let mut ctx = PipelineContext::new(PROJECT, "unused");

    let result = engine.execute(&steps, &mut ctx).await;

    assert_eq!(result.failed_step(), Some("hanging"));
    assert!(matches!(
        result.failure.as_ref().map(|f| &f.error),
        Some(ProvisionError::Timeout { .. })
    ));
    // Timeouts are transient, so the retry was used up first
    assert!(matches!(
        result.state_of("hanging"),
        Some(provision::StepState::Failed { attempts: 2, .. })
    ));
}
