//! Test: Idempotence - re-running a finished project changes nothing

use crate::helpers::*;
use provision::core::{RecoveryMode, RunStatus};
use provision::steps::STEP_ORDER;

#[tokio::test]
async fn test_second_run_skips_every_step() {
    let harness = Harness::new();
    let (first, _) = harness.run(RecoveryMode::Resume).await;
    assert!(first.is_success());

    harness.toolchain.clear();
    let calls_before = harness.host.calls().len();

    let (second, ctx) = harness.run(RecoveryMode::Resume).await;

    assert_eq!(second.status, RunStatus::Succeeded);
    assert_eq!(second.skipped_steps(), STEP_ORDER.to_vec());
    assert!(second.executed_steps().is_empty());

    // Only read-only checks reach the tools
    assert_eq!(harness.toolchain.count("npm", &["install"]), 0);
    assert_eq!(harness.toolchain.count("git", &["init"]), 0);
    assert_eq!(harness.toolchain.count("git", &["commit"]), 0);
    assert_eq!(harness.toolchain.count("git", &["push"]), 0);
    assert_eq!(harness.toolchain.count("wrangler", &["deploy"]), 0);
    assert!(harness.host.calls()[calls_before..]
        .iter()
        .all(|c| c.starts_with("find")));

    // Checks rehydrate what later steps and the report need
    assert_eq!(
        ctx.remote_url.as_deref(),
        Some(FakeSourceHost::clone_url(PROJECT).as_str())
    );
    assert!(ctx.head_commit.is_some());
    assert_eq!(
        ctx.deployment_url.as_deref(),
        Some("https://demo-api.octocat.workers.dev")
    );
}

#[tokio::test]
async fn test_edited_entry_point_is_restored() {
    let harness = Harness::new();
    let (first, _) = harness.run(RecoveryMode::Resume).await;
    assert!(first.is_success());

    // An edited entry point is restored, so the build hash is unchanged
    std::fs::write(harness.project_dir().join("index.js"), "export default {};\n").unwrap();
    harness.toolchain.clear();

    let (second, _) = harness.run(RecoveryMode::Resume).await;
    assert!(second.is_success());
    assert_eq!(
        second.executed_steps(),
        vec![provision::steps::WRITE_ENTRY_POINT]
    );
    assert_eq!(harness.toolchain.count("wrangler", &["deploy"]), 0);
}

#[tokio::test]
async fn test_edited_deploy_config_triggers_deploy() {
    let harness = Harness::new();
    let (first, _) = harness.run(RecoveryMode::Resume).await;
    assert!(first.is_success());

    let config = harness.project_dir().join("wrangler.toml");
    let mut content = std::fs::read_to_string(&config).unwrap();
    content.push_str("\n[vars]\nGREETING = \"hi\"\n");
    std::fs::write(&config, content).unwrap();
    harness.toolchain.clear();

    let (second, _) = harness.run(RecoveryMode::Resume).await;
    assert!(second.is_success());
    assert_eq!(second.executed_steps(), vec![provision::steps::DEPLOY]);
    assert_eq!(harness.toolchain.count("wrangler", &["deploy"]), 1);
}
