//! Test: Retry behavior - transient failures retried with backoff

use crate::helpers::*;
use provision::core::{RecoveryMode, StepState};
use provision::execution::{ExecutionEngine, ExecutionEvent};
use provision::steps::{CREATE_REMOTE, DEPLOY, PUSH_REMOTE};
use provision::PipelineContext;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_transient_push_failure_recovers() {
    let harness = Harness::new();
    harness.toolchain.fail_pushes(2);

    let (result, _) = harness.run(RecoveryMode::Resume).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert!(matches!(
        result.state_of(PUSH_REMOTE),
        Some(StepState::Completed { attempts: 3, .. })
    ));
    assert_eq!(harness.toolchain.count("git", &["push"]), 3);
}

#[tokio::test]
async fn test_server_error_on_create_is_retried() {
    let harness = Harness::new();
    harness.host.fail_creates(1);

    let (result, _) = harness.run(RecoveryMode::Resume).await;

    assert!(result.is_success());
    assert!(matches!(
        result.state_of(CREATE_REMOTE),
        Some(StepState::Completed { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_lost_create_response_is_not_repeated() {
    let harness = Harness::new();
    harness.host.lose_create_responses(1);

    let (result, ctx) = harness.run(RecoveryMode::Resume).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert_eq!(harness.host.count("create"), 1);
    assert!(matches!(
        result.state_of(CREATE_REMOTE),
        Some(StepState::Completed { attempts: 1, .. })
    ));
    assert_eq!(
        ctx.remote_url.as_deref(),
        Some(FakeSourceHost::clone_url(PROJECT).as_str())
    );
    assert_eq!(
        harness.toolchain.pushed_commit(&FakeSourceHost::clone_url(PROJECT), "master"),
        ctx.head_commit
    );
}

#[tokio::test]
async fn test_failed_lookup_is_retried() {
    let harness = Harness::new();
    harness.host.fail_lookups(1);

    let (result, _) = harness.run(RecoveryMode::Resume).await;

    assert!(result.is_success(), "{:?}", result.failure);
    assert_eq!(harness.host.count("find"), 2);
    assert_eq!(harness.host.count("create"), 1);
    assert!(matches!(
        result.state_of(CREATE_REMOTE),
        Some(StepState::Completed { attempts: 1, .. })
    ));
}

#[tokio::test]
async fn test_retry_events_report_backoff() {
    let harness = Harness::new();
    harness.toolchain.fail_deploys(2);

    let steps = provision::standard_catalog(
        &harness.config,
        harness.toolchain.clone(),
        harness.host.clone(),
    );
    let mut engine = ExecutionEngine::new(RecoveryMode::Resume, Duration::from_secs(5));
    let retries = Arc::new(Mutex::new(Vec::new()));
    let seen = retries.clone();
    engine.add_event_handler(move |event| {
        if let ExecutionEvent::StepRetrying {
            step,
            attempt,
            delay,
            ..
        } = event
        {
            seen.lock().unwrap().push((step.clone(), *attempt, *delay));
        }
    });
    let mut ctx = PipelineContext::new(PROJECT, harness.project_dir());

    let result = engine.execute(&steps, &mut ctx).await;

    assert!(result.is_success());
    assert_eq!(
        *retries.lock().unwrap(),
        vec![
            (DEPLOY.to_string(), 2, Duration::from_millis(1)),
            (DEPLOY.to_string(), 3, Duration::from_millis(2)),
        ]
    );
}

#[tokio::test]
async fn test_non_transient_failure_is_not_retried() {
    let log = new_log();
    let steps = vec![RecordingStep::new("only", &log).failing(conflict).boxed()];
    let engine = ExecutionEngine::new(RecoveryMode::Resume, Duration::from_secs(5));
    let mut ctx = PipelineContext::new(PROJECT, "unused");

    let result = engine.execute(&steps, &mut ctx).await;

    assert!(!result.is_success());
    assert_eq!(entries(&log), vec!["check:only", "run:only"]);
}
