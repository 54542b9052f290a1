use anyhow::{Context, Result};
use provision::cli::interrupt::listen_for_interrupts;
use provision::cli::output::*;
use provision::cli::Cli;
use provision::core::config::{validate_project_name, Credentials, ProvisionConfig, Settings};
use provision::core::{PipelineContext, RecoveryMode, RunStatus};
use provision::execution::ExecutionEngine;
use provision::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};
use provision::process::{CommandRunner, TokioCommandRunner};
use provision::{standard_catalog, GitHubClient, SourceHost};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("PROVISION_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    if let Err(e) = validate_project_name(&cli.project_name) {
        eprintln!("{} {}", CROSS, e);
        return Ok(ExitCode::FAILURE);
    }

    let store = open_store(cli.no_history).await?;

    if cli.history {
        show_history(store.as_ref(), &cli.project_name).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            return Ok(ExitCode::FAILURE);
        }
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner::new());
    let host: Arc<dyn SourceHost> = Arc::new(GitHubClient::new(
        config.settings.api_base.clone(),
        config.credentials.github_username.clone(),
        config.credentials.github_token.clone(),
    )?);
    let steps = standard_catalog(&config, runner, host);

    let cancel_rx = listen_for_interrupts();

    let mut engine = ExecutionEngine::new(
        config.settings.rerun,
        Duration::from_secs(config.settings.step_timeout_secs),
    )
    .with_cancellation(cancel_rx);

    let mut ctx = PipelineContext::new(
        cli.project_name.clone(),
        config.project_dir(&cli.project_name),
    );

    if cli.plan {
        return match engine.plan(&steps, &mut ctx).await {
            Ok(planned) => {
                println!("{}", format_plan(&planned));
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => {
                eprintln!("{} {}", CROSS, failure);
                Ok(ExitCode::FAILURE)
            }
        };
    }

    report_previous_failure(store.as_ref(), &cli.project_name, engine.mode()).await;

    let reporter = EventReporter::new();
    engine.add_event_handler(move |event| reporter.handle(event));

    let result = engine.execute(&steps, &mut ctx).await;

    if !cli.no_history {
        let summary = create_summary(&result);
        match store.save_run(&summary).await {
            Ok(()) => debug!("Run {} saved to history", summary.run_id),
            Err(e) => warn!("Failed to save run to history: {:#}", e),
        }
    }

    println!();
    println!(
        "{}",
        format_run_result(&result, ctx.deployment_url.as_deref())
    );

    Ok(if result.status == RunStatus::Succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Resolve settings and credentials; nothing runs if this fails
fn load_config(cli: &Cli) -> Result<ProvisionConfig> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    if let Some(dir) = &cli.dir {
        settings.parent_dir = dir.clone();
    }
    if cli.rollback {
        settings.rerun = RecoveryMode::Rollback;
    }

    let credentials = Credentials::from_env().context("Failed to resolve credentials")?;
    Ok(ProvisionConfig::new(credentials, settings))
}

async fn open_store(no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        match provision::persistence::SqliteRunStore::with_default_path().await {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) => warn!("Run history unavailable: {:#}", e),
        }
    }

    Ok(Arc::new(InMemoryPersistence::new()))
}

async fn report_previous_failure(
    store: &dyn PersistenceBackend,
    project_name: &str,
    mode: RecoveryMode,
) {
    match store.latest_run(project_name).await {
        Ok(Some(previous)) if !previous.is_success() => {
            let step = previous.failed_step.as_deref().unwrap_or("unknown step");
            let plan = match mode {
                RecoveryMode::Resume => "resuming",
                RecoveryMode::Rollback => "resuming, rolling back this run on failure",
            };
            println!(
                "{} Previous run {} at '{}'; {}",
                INFO,
                format_status(previous.status),
                style(step).yellow(),
                plan
            );
        }
        Ok(_) => {}
        Err(e) => debug!("Could not read run history: {:#}", e),
    }
}

async fn show_history(store: &dyn PersistenceBackend, project_name: &str) -> Result<()> {
    let runs = store.list_runs(project_name).await?;

    if runs.is_empty() {
        println!("{} No runs recorded for {}", INFO, style(project_name).bold());
        let projects = store.list_projects().await?;
        if !projects.is_empty() {
            println!("  Projects with history: {}", projects.join(", "));
        }
        return Ok(());
    }

    println!("{} Runs for {}:", INFO, style(project_name).bold());
    for run in &runs {
        println!("  {}", format_run_summary(run));
        if let Some(error) = &run.error {
            println!("      {}", style(error).dim());
        }
    }

    Ok(())
}
