//! Test: End to end - fresh project through all nine steps

use crate::helpers::*;
use provision::core::{RecoveryMode, RunStatus, StepState};
use provision::steps::{DeploymentMarker, STEP_ORDER};

#[tokio::test]
async fn test_fresh_project_is_fully_provisioned() {
    let harness = Harness::new();
    let (result, ctx) = harness.run(RecoveryMode::Resume).await;

    assert_eq!(result.status, RunStatus::Succeeded, "{:?}", result.failure);
    assert_eq!(result.executed_steps(), STEP_ORDER.to_vec());
    for name in STEP_ORDER {
        assert!(
            matches!(result.state_of(name), Some(StepState::Completed { .. })),
            "{} should have completed",
            name
        );
    }

    let dir = harness.project_dir();
    for file in ["package.json", "index.js", "wrangler.toml", ".gitignore"] {
        assert!(dir.join(file).is_file(), "{} missing", file);
    }

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("package.json")).unwrap()).unwrap();
    assert_eq!(manifest["name"], "demo-api");
    assert!(manifest["dependencies"]["hono"].is_string());

    let wrangler = std::fs::read_to_string(dir.join("wrangler.toml")).unwrap();
    assert!(wrangler.contains("name = \"demo-api\""));
    assert!(wrangler.contains("0123456789abcdef"));

    let remote_url = FakeSourceHost::clone_url(PROJECT);
    assert_eq!(ctx.remote_url.as_deref(), Some(remote_url.as_str()));
    assert!(harness.host.has_repository(PROJECT));
    assert_eq!(
        harness.toolchain.pushed_commit(&remote_url, "master"),
        ctx.head_commit
    );

    assert_eq!(
        ctx.deployment_url.as_deref(),
        Some("https://demo-api.octocat.workers.dev")
    );
    let marker = DeploymentMarker::load(&dir).await.unwrap();
    assert_eq!(marker.url, ctx.deployment_url);
    assert_eq!(marker.commit, ctx.head_commit);
}

#[tokio::test]
async fn test_credentials_never_appear_in_arguments() {
    let harness = Harness::new();
    let (result, _) = harness.run(RecoveryMode::Resume).await;
    assert!(result.is_success());

    for invocation in harness.toolchain.invocations() {
        for arg in &invocation.args {
            assert!(!arg.contains(GITHUB_TOKEN), "token leaked into {:?}", invocation);
            assert!(!arg.contains(CLOUDFLARE_TOKEN), "token leaked into {:?}", invocation);
        }
    }

    let push = harness
        .toolchain
        .invocations()
        .into_iter()
        .find(|i| i.starts_with("git", &["push"]))
        .unwrap();
    assert!(push.env_keys.contains(&"GIT_CONFIG_VALUE_0".to_string()));

    let deploy = harness
        .toolchain
        .invocations()
        .into_iter()
        .find(|i| i.starts_with("wrangler", &["deploy"]))
        .unwrap();
    let token_index = deploy
        .env_keys
        .iter()
        .position(|k| k == "CLOUDFLARE_API_TOKEN")
        .unwrap();
    assert_eq!(deploy.env_values[token_index], CLOUDFLARE_TOKEN);

    let git_config = harness.project_dir().join(".git").join("REMOTE_ORIGIN");
    let origin = std::fs::read_to_string(git_config).unwrap();
    assert!(!origin.contains(GITHUB_TOKEN));
}
