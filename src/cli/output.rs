//! CLI output formatting

use crate::core::{RunResult, RunStatus};
use crate::execution::{ExecutionEvent, PlannedStep};
use crate::persistence::RunSummary;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static UNDO: Emoji<'_, '_> = Emoji("↩️  ", "< ");

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// Spinner shown while a step is running
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner
}

/// Drives a spinner from execution events
///
/// Finished lines are printed above the spinner so they stay on screen.
pub struct EventReporter {
    spinner: ProgressBar,
}

impl EventReporter {
    pub fn new() -> Self {
        Self {
            spinner: create_spinner(),
        }
    }

    pub fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StepStarted { step, index, total } => {
                self.spinner
                    .set_message(format!("[{}/{}] {}", index + 1, total, style(step).cyan()));
                self.spinner.enable_steady_tick(Duration::from_millis(100));
            }
            ExecutionEvent::PipelineCompleted { .. } => {
                self.spinner.finish_and_clear();
            }
            _ => {
                if matches!(
                    event,
                    ExecutionEvent::StepCompleted { .. } | ExecutionEvent::StepFailed { .. }
                ) {
                    self.spinner.disable_steady_tick();
                    self.spinner.set_message("");
                }
                let line = format_execution_event(event);
                self.spinner.suspend(|| println!("{}", line));
            }
        }
    }
}

impl Default for EventReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::RolledBack => style("ROLLED BACK").yellow().to_string(),
    }
}

/// Format a run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::RolledBack => UNDO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} ran, {} skipped of {}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        summary.started_at.format("%Y-%m-%d %H:%M:%S"),
        format_status(summary.status),
        summary.completed_steps,
        summary.skipped_steps,
        summary.total_steps,
    );
    if let Some(step) = &summary.failed_step {
        line.push_str(&format!(" - failed at {}", style(step).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            project_name,
            total_steps,
        } => format!(
            "{} Provisioning {} ({} steps, run {})",
            ROCKET,
            style(project_name).bold(),
            total_steps,
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StepSkipped { step, index, total } => format!(
            "{} [{}/{}] {} {}",
            SKIP,
            index + 1,
            total,
            style(step).dim(),
            style("(already done)").dim()
        ),
        ExecutionEvent::StepStarted { step, index, total } => {
            format!("{} [{}/{}] {}", INFO, index + 1, total, style(step).cyan())
        }
        ExecutionEvent::StepRetrying {
            step,
            attempt,
            max_attempts,
            delay,
            error,
        } => format!(
            "{} {} failed: {} (attempt {}/{} in {}ms)",
            WARN,
            style(step).yellow(),
            style(error).dim(),
            attempt,
            max_attempts,
            delay.as_millis()
        ),
        ExecutionEvent::StepCompleted { step, attempts } => {
            if *attempts > 1 {
                format!(
                    "{} {} {}",
                    CHECK,
                    style(step).green(),
                    style(format!("(after {} attempts)", attempts)).dim()
                )
            } else {
                format!("{} {}", CHECK, style(step).green())
            }
        }
        ExecutionEvent::StepFailed { step, error } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::CompensationStarted { step } => {
            format!("{} Undoing {}", UNDO, style(step).yellow())
        }
        ExecutionEvent::CompensationCompleted { step } => {
            format!("{} Undid {}", CHECK, style(step).dim())
        }
        ExecutionEvent::CompensationFailed { step, error } => format!(
            "{} Could not undo {}: {}",
            CROSS,
            style(step).red(),
            style(error).dim()
        ),
        ExecutionEvent::PipelineCompleted { run_id, status } => format!(
            "{} Run {} {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format the outcome of a plan
pub fn format_plan(planned: &[PlannedStep]) -> String {
    planned
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let marker = if step.satisfied {
                style("done").green()
            } else {
                style("pending").yellow()
            };
            format!("[{}/{}] {:<32} {}", i + 1, planned.len(), step.name, marker)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final report of a run
pub fn format_run_result(result: &RunResult, deployment_url: Option<&str>) -> String {
    match (&result.failure, result.status) {
        (None, _) => {
            let mut report = format!(
                "{} {} provisioned ({} ran, {} already done)",
                CHECK,
                style(&result.project_name).bold(),
                result.executed_steps().len(),
                result.skipped_steps().len()
            );
            if let Some(url) = deployment_url {
                report.push_str(&format!("\n{} Live at {}", ROCKET, style(url).cyan()));
            }
            report
        }
        (Some(failure), status) => {
            let mut report = format!(
                "{} Step '{}' failed: {}",
                CROSS,
                style(&failure.step).red(),
                failure.error
            );
            match status {
                RunStatus::RolledBack => {
                    report.push_str("\nChanges made by this run were rolled back.")
                }
                _ => report.push_str(&format!(
                    "\nRe-run `provision {}` to resume from this step.",
                    result.project_name
                )),
            }
            report
        }
    }
}
