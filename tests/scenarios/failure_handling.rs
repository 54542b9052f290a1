//! Test: Failure handling - fail fast, then resume on the next run

use crate::helpers::*;
use provision::core::{ApiErrorKind, RecoveryMode, RunStatus, StepState};
use provision::execution::ExecutionEngine;
use provision::steps::{CREATE_REMOTE, DEPLOY, INIT_REPOSITORY, PUSH_REMOTE};
use provision::PipelineContext;
use std::time::Duration;

#[tokio::test]
async fn test_conflict_stops_at_remote_creation() {
    let harness = Harness::new();
    harness.host.conflict_on_create();

    let (result, ctx) = harness.run(RecoveryMode::Resume).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_step(), Some(CREATE_REMOTE));
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.error.api_kind(), Some(ApiErrorKind::Conflict));
    assert!(failure.to_string().contains(CREATE_REMOTE));

    // Conflicts are not retried
    assert_eq!(harness.host.count("create"), 1);

    assert!(matches!(result.state_of(PUSH_REMOTE), Some(StepState::Pending)));
    assert!(matches!(result.state_of(DEPLOY), Some(StepState::Pending)));
    assert_eq!(harness.toolchain.count("git", &["push"]), 0);
    assert_eq!(harness.toolchain.count("git", &["ls-remote"]), 0);
    assert_eq!(harness.toolchain.count("wrangler", &[]), 0);

    // Work before the failure is left in place for the next run
    assert!(matches!(
        result.state_of(INIT_REPOSITORY),
        Some(StepState::Completed { .. })
    ));
    assert_eq!(result.last_done_step(), Some(INIT_REPOSITORY));
    assert!(harness.project_dir().join(".git").exists());
    assert!(ctx.remote_url.is_none());
}

#[tokio::test]
async fn test_next_run_resumes_at_failed_step() {
    let harness = Harness::new();
    harness.toolchain.fail_pushes(10);

    let (first, _) = harness.run(RecoveryMode::Resume).await;
    assert_eq!(first.failed_step(), Some(PUSH_REMOTE));
    assert!(matches!(
        first.state_of(PUSH_REMOTE),
        Some(StepState::Failed { attempts: 3, .. })
    ));
    assert_eq!(harness.toolchain.count("wrangler", &["deploy"]), 0);

    harness.toolchain.fail_pushes(0);
    harness.toolchain.clear();

    let (second, ctx) = harness.run(RecoveryMode::Resume).await;
    assert!(second.is_success(), "{:?}", second.failure);
    assert_eq!(second.executed_steps(), vec![PUSH_REMOTE, DEPLOY]);
    assert_eq!(second.skipped_steps().len(), 7);
    assert_eq!(harness.toolchain.count("git", &["commit"]), 0);
    assert_eq!(harness.toolchain.count("git", &["push"]), 1);
    assert!(ctx.deployment_url.is_some());
}

#[tokio::test]
async fn test_failing_step_halts_later_steps() {
    let log = new_log();
    let steps = vec![
        RecordingStep::new("one", &log).boxed(),
        RecordingStep::new("two", &log).failing(conflict).boxed(),
        RecordingStep::new("three", &log).boxed(),
    ];
    let engine = ExecutionEngine::new(RecoveryMode::Resume, Duration::from_secs(5));
    let mut ctx = PipelineContext::new(PROJECT, "unused");

    let result = engine.execute(&steps, &mut ctx).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_step(), Some("two"));
    assert_eq!(
        entries(&log),
        vec!["check:one", "run:one", "check:two", "run:two"]
    );
    assert!(matches!(result.state_of("three"), Some(StepState::Pending)));
}
