//! Test utilities: a fake toolchain, a fake source host and recording steps

use async_trait::async_trait;
use provision::core::config::{Credentials, Settings};
use provision::core::{
    ApiErrorKind, PipelineContext, ProvisionConfig, ProvisionError, RecoveryMode, RetryPolicy,
    RunResult, Step,
};
use provision::execution::ExecutionEngine;
use provision::host::{RemoteRepository, SourceHost};
use provision::process::{CommandOutput, CommandRunner, CommandSpec};
use provision::standard_catalog;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROJECT: &str = "demo-api";
pub const USERNAME: &str = "octocat";
pub const GITHUB_TOKEN: &str = "ghp_fake_token_value";
pub const CLOUDFLARE_TOKEN: &str = "cf_fake_token_value";

pub fn credentials() -> Credentials {
    let env: HashMap<&str, &str> = [
        ("GITHUB_USERNAME", USERNAME),
        ("GITHUB_TOKEN", GITHUB_TOKEN),
        ("CLOUDFLARE_ACCOUNT_ID", "0123456789abcdef"),
        ("CLOUDFLARE_API_TOKEN", CLOUDFLARE_TOKEN),
    ]
    .into_iter()
    .collect();
    Credentials::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 2.0,
    }
}

pub fn test_config(parent: &Path) -> ProvisionConfig {
    let settings = Settings {
        parent_dir: parent.to_path_buf(),
        retry: fast_retry(),
        step_timeout_secs: 5,
        ..Settings::default()
    };
    ProvisionConfig::new(credentials(), settings)
}

/// One recorded process invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env_keys: Vec<String>,
    pub env_values: Vec<String>,
}

impl Invocation {
    pub fn starts_with(&self, program: &str, args: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= args.len()
            && self.args.iter().zip(args).all(|(a, b)| a == b)
    }
}

/// Simulates npm, git and wrangler against the real project directory
///
/// Local git state lives in files under `.git`; pushed refs live in memory.
#[derive(Default)]
pub struct FakeToolchain {
    invocations: Mutex<Vec<Invocation>>,
    pushed: Mutex<HashMap<(String, String), String>>,
    push_failures: AtomicU32,
    deploy_failures: AtomicU32,
    commits: AtomicU32,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` pushes fail with a network error
    pub fn fail_pushes(&self, count: u32) {
        self.push_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` deploys fail
    pub fn fail_deploys(&self, count: u32) {
        self.deploy_failures.store(count, Ordering::SeqCst);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self, program: &str, args: &[&str]) -> usize {
        self.invocations()
            .iter()
            .filter(|i| i.starts_with(program, args))
            .count()
    }

    pub fn clear(&self) {
        self.invocations.lock().unwrap().clear();
    }

    pub fn pushed_commit(&self, url: &str, branch: &str) -> Option<String> {
        self.pushed
            .lock()
            .unwrap()
            .get(&(url.to_string(), branch.to_string()))
            .cloned()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn npm(&self, spec: &CommandSpec) -> CommandOutput {
        let [command, package] = spec.args.as_slice() else {
            return exit(1, "", "unexpected npm invocation");
        };
        if command != "install" {
            return exit(1, "", "unexpected npm command");
        }
        let manifest = spec.cwd.join("package.json");
        let Ok(content) = std::fs::read_to_string(&manifest) else {
            return exit(254, "", "npm ERR! enoent Could not read package.json");
        };
        let mut json: serde_json::Value = serde_json::from_str(&content).unwrap();
        json["dependencies"][package.as_str()] = serde_json::Value::from("^4.6.0");
        std::fs::write(&manifest, serde_json::to_string_pretty(&json).unwrap()).unwrap();
        std::fs::create_dir_all(spec.cwd.join("node_modules").join(package)).unwrap();
        exit(0, "added 1 package", "")
    }

    fn git(&self, spec: &CommandSpec) -> CommandOutput {
        let git_dir = spec.cwd.join(".git");
        let head = git_dir.join("HEAD_COMMIT");
        let remote = git_dir.join("REMOTE_ORIGIN");
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();

        match args.as_slice() {
            ["init", ..] => {
                std::fs::create_dir_all(&git_dir).unwrap();
                exit(0, "Initialized empty Git repository", "")
            }
            ["add", "."] => {
                if git_dir.exists() {
                    exit(0, "", "")
                } else {
                    exit(128, "", "fatal: not a git repository")
                }
            }
            ["commit", "-m", _] => {
                if head.exists() {
                    return exit(1, "nothing to commit, working tree clean", "");
                }
                let n = self.commits.fetch_add(1, Ordering::SeqCst);
                std::fs::write(&head, format!("{:040x}", 0xc0ffee + n as u64)).unwrap();
                exit(0, "[master (root-commit)] Initial commit", "")
            }
            ["rev-parse", "--verify", "HEAD"] => match std::fs::read_to_string(&head) {
                Ok(sha) => exit(0, &format!("{}\n", sha), ""),
                Err(_) => exit(128, "", "fatal: Needed a single revision"),
            },
            ["remote", "get-url", "origin"] => match std::fs::read_to_string(&remote) {
                Ok(url) => exit(0, &format!("{}\n", url), ""),
                Err(_) => exit(2, "", "error: No such remote 'origin'"),
            },
            ["remote", "add" | "set-url", "origin", url] => {
                std::fs::write(&remote, url).unwrap();
                exit(0, "", "")
            }
            ["push", "-u", "origin", branch] => {
                if Self::take_failure(&self.push_failures) {
                    return exit(128, "", "fatal: unable to access remote: Could not resolve host");
                }
                let url = std::fs::read_to_string(&remote).unwrap();
                let sha = std::fs::read_to_string(&head).unwrap();
                self.pushed
                    .lock()
                    .unwrap()
                    .insert((url, branch.to_string()), sha);
                exit(0, "", "branch 'master' set up to track 'origin/master'")
            }
            ["ls-remote", url, refname] => {
                let branch = refname.trim_start_matches("refs/heads/");
                match self.pushed_commit(url, branch) {
                    Some(sha) => exit(0, &format!("{}\t{}\n", sha, refname), ""),
                    None => exit(0, "", ""),
                }
            }
            _ => exit(1, "", "unexpected git invocation"),
        }
    }

    fn wrangler(&self, spec: &CommandSpec) -> CommandOutput {
        if spec.args.first().map(String::as_str) != Some("deploy") {
            return exit(1, "", "unexpected wrangler invocation");
        }
        if Self::take_failure(&self.deploy_failures) {
            return exit(1, "", "✘ [ERROR] A request to the Cloudflare API failed.");
        }
        let name = spec
            .cwd
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        exit(
            0,
            &format!(
                "Uploaded {name} (1.02 sec)\nPublished {name} (0.31 sec)\n  https://{name}.{USERNAME}.workers.dev\nCurrent Deployment ID: 42"
            ),
            "",
        )
    }
}

fn exit(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl CommandRunner for FakeToolchain {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        self.invocations.lock().unwrap().push(Invocation {
            program: spec.program.clone(),
            args: spec.args.clone(),
            env_keys: spec.env.iter().map(|(k, _)| k.clone()).collect(),
            env_values: spec.env.iter().map(|(_, v)| v.expose().to_string()).collect(),
        });

        Ok(match spec.program.as_str() {
            "npm" => self.npm(spec),
            "git" => self.git(spec),
            "wrangler" => self.wrangler(spec),
            other => {
                return Err(ProvisionError::io(
                    format!("failed to spawn {}", other),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ))
            }
        })
    }
}

/// In-memory source host
#[derive(Default)]
pub struct FakeSourceHost {
    repositories: Mutex<HashMap<String, RemoteRepository>>,
    calls: Mutex<Vec<String>>,
    conflict_on_create: Mutex<bool>,
    server_errors: AtomicU32,
    lost_responses: AtomicU32,
    lookup_errors: AtomicU32,
}

impl FakeSourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject creation as if the name were taken
    pub fn conflict_on_create(&self) {
        *self.conflict_on_create.lock().unwrap() = true;
    }

    /// Make the next `count` create calls fail with a server error
    pub fn fail_creates(&self, count: u32) {
        self.server_errors.store(count, Ordering::SeqCst);
    }

    /// Create the repository on the next `count` create calls but fail them
    /// with a network error, as if the response never arrived
    pub fn lose_create_responses(&self, count: u32) {
        self.lost_responses.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` lookups fail with a server error
    pub fn fail_lookups(&self, count: u32) {
        self.lookup_errors.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn has_repository(&self, name: &str) -> bool {
        self.repositories.lock().unwrap().contains_key(name)
    }

    pub fn clone_url(name: &str) -> String {
        format!("https://github.com/{}/{}.git", USERNAME, name)
    }
}

#[async_trait]
impl SourceHost for FakeSourceHost {
    async fn find_repository(&self, name: &str) -> Result<Option<RemoteRepository>, ProvisionError> {
        self.calls.lock().unwrap().push(format!("find {}", name));
        if FakeToolchain::take_failure(&self.lookup_errors) {
            return Err(ProvisionError::RemoteApi {
                service: "GitHub",
                kind: ApiErrorKind::Server,
                message: "HTTP 502 Bad Gateway".to_string(),
            });
        }
        Ok(self.repositories.lock().unwrap().get(name).cloned())
    }

    async fn create_repository(
        &self,
        name: &str,
        private: bool,
    ) -> Result<RemoteRepository, ProvisionError> {
        self.calls.lock().unwrap().push(format!("create {}", name));
        if *self.conflict_on_create.lock().unwrap() {
            return Err(ProvisionError::RemoteApi {
                service: "GitHub",
                kind: ApiErrorKind::Conflict,
                message: "name already exists on this account".to_string(),
            });
        }
        if FakeToolchain::take_failure(&self.server_errors) {
            return Err(ProvisionError::RemoteApi {
                service: "GitHub",
                kind: ApiErrorKind::Server,
                message: "HTTP 502 Bad Gateway".to_string(),
            });
        }
        let repo = RemoteRepository {
            name: name.to_string(),
            full_name: format!("{}/{}", USERNAME, name),
            clone_url: Self::clone_url(name),
            private,
            html_url: format!("https://github.com/{}/{}", USERNAME, name),
        };
        self.repositories
            .lock()
            .unwrap()
            .insert(name.to_string(), repo.clone());
        if FakeToolchain::take_failure(&self.lost_responses) {
            return Err(ProvisionError::RemoteApi {
                service: "GitHub",
                kind: ApiErrorKind::Network,
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(repo)
    }

    async fn delete_repository(&self, name: &str) -> Result<(), ProvisionError> {
        self.calls.lock().unwrap().push(format!("delete {}", name));
        self.repositories.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Full provisioning setup against fakes
pub struct Harness {
    pub parent: tempfile::TempDir,
    pub toolchain: Arc<FakeToolchain>,
    pub host: Arc<FakeSourceHost>,
    pub config: ProvisionConfig,
}

impl Harness {
    pub fn new() -> Self {
        let parent = tempfile::tempdir().unwrap();
        let config = test_config(parent.path());
        Self {
            parent,
            toolchain: Arc::new(FakeToolchain::new()),
            host: Arc::new(FakeSourceHost::new()),
            config,
        }
    }

    pub fn project_dir(&self) -> PathBuf {
        self.config.project_dir(PROJECT)
    }

    pub async fn run(&self, mode: RecoveryMode) -> (RunResult, PipelineContext) {
        let steps = standard_catalog(&self.config, self.toolchain.clone(), self.host.clone());
        let engine = ExecutionEngine::new(mode, Duration::from_secs(5));
        let mut ctx = PipelineContext::new(PROJECT, self.project_dir());
        let result = engine.execute(&steps, &mut ctx).await;
        (result, ctx)
    }
}

/// Shared log of what recording steps were asked to do
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Step that records checks, actions and compensations
pub struct RecordingStep {
    name: &'static str,
    satisfied: bool,
    failure: Option<fn() -> ProvisionError>,
    compensable: bool,
    log: CallLog,
}

impl RecordingStep {
    pub fn new(name: &'static str, log: &CallLog) -> Self {
        Self {
            name,
            satisfied: false,
            failure: None,
            compensable: true,
            log: log.clone(),
        }
    }

    pub fn satisfied(mut self) -> Self {
        self.satisfied = true;
        self
    }

    pub fn failing(mut self, error: fn() -> ProvisionError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn without_compensation(mut self) -> Self {
        self.compensable = false;
        self
    }

    pub fn boxed(self) -> Box<dyn Step> {
        Box::new(self)
    }

    fn record(&self, what: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", what, self.name));
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn is_satisfied(&self, _ctx: &mut PipelineContext) -> Result<bool, ProvisionError> {
        self.record("check");
        Ok(self.satisfied)
    }

    async fn execute(&self, _ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        self.record("run");
        match self.failure {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn compensate(&self, _ctx: &mut PipelineContext) -> Result<(), ProvisionError> {
        self.record("undo");
        Ok(())
    }

    fn has_compensation(&self) -> bool {
        self.compensable
    }
}

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn conflict() -> ProvisionError {
    ProvisionError::RemoteApi {
        service: "GitHub",
        kind: ApiErrorKind::Conflict,
        message: "name already exists on this account".to_string(),
    }
}

pub fn process_failure() -> ProvisionError {
    ProvisionError::ExternalProcess {
        program: "wrangler".to_string(),
        code: 1,
        stdout: String::new(),
        stderr: "Authentication error".to_string(),
    }
}
