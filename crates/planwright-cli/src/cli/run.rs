//! `planwright run`: execute a plan with the built-in tools.
//!
//! Lifecycle events stream to stderr while the plan runs. Failures are
//! answered interactively (`--on-failure ask`, the default) or by one of the
//! automatic policies. A summary table (or the full outcome as JSON) is
//! printed to stdout at the end.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use dialoguer::{Input, Select};
use planwright_core::engine::{
    AbortOnFailure, FailureContext, PlanExecutor, PlanOutcome, PlanRun,
    RecoveryAction, RecoveryDecision, RetryThenSkip, SkipOnFailure,
};
use planwright_core::event::ExecutionObserver;
use planwright_types::config::EngineConfig;
use planwright_types::event::PlanEvent;
use planwright_types::plan::{ExecutionMode, StepDefinition};
use planwright_types::status::StepStatus;
use serde_json::Value;

use super::tools::builtin_registry;
use super::validate::{load_plan, unknown_tools};
use crate::config::load_engine_config;

/// Arguments of `planwright run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the plan file (JSON or YAML).
    pub file: PathBuf,

    /// Override the plan's execution mode (sequential or dag).
    #[arg(long)]
    pub mode: Option<ExecutionMode>,

    /// Maximum number of steps running at once in DAG mode.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// How to handle a failed step.
    #[arg(long, value_enum, default_value_t = FailureMode::Ask)]
    pub on_failure: FailureMode,

    /// Retries per step before skipping it (with `--on-failure retry`).
    #[arg(long, default_value = "2")]
    pub retries: u32,

    /// Per-invocation tool timeout in seconds.
    #[arg(long)]
    pub step_timeout: Option<u64>,

    /// Whole-plan timeout in seconds.
    #[arg(long)]
    pub plan_timeout: Option<u64>,

    /// Config file (defaults to ~/.planwright/config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Failure handling strategy selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailureMode {
    /// Prompt for retry, regenerate, skip, or abort.
    Ask,
    /// Abort the plan on the first failure.
    Abort,
    /// Skip every failed step.
    Skip,
    /// Retry failed steps, then skip them.
    Retry,
}

/// Handle `planwright run`.
pub async fn run_plan(args: RunArgs, json: bool, quiet: bool) -> Result<()> {
    let plan = load_plan(&args.file, args.mode)?;
    let unknown = unknown_tools(&plan);
    if !unknown.is_empty() {
        tracing::warn!("steps use tools that are not built in: {}", unknown.join(", "));
    }

    let config = apply_overrides(load_engine_config(args.config.as_deref()).await, &args);
    tracing::debug!(?config, "engine configuration");

    let mut executor = PlanExecutor::new(builtin_registry(), config);
    if !json && !quiet {
        executor = executor.with_observer(EventPrinter);
    }

    let mode = resolve_failure_mode(args.on_failure);
    let run = executor.start(plan);
    let cancel = run.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = match mode {
        FailureMode::Ask => drive_interactive(run).await?,
        FailureMode::Abort => run.drive(&AbortOnFailure).await?,
        FailureMode::Skip => run.drive(&SkipOnFailure).await?,
        FailureMode::Retry => {
            run.drive(&RetryThenSkip {
                max_retries: args.retries,
            })
            .await?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !quiet {
        print_summary(&outcome);
    }

    if !outcome.is_success() {
        bail!(
            "Plan aborted: {}",
            outcome.abort_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    Ok(())
}

/// CLI flags take precedence over the config file.
fn apply_overrides(mut config: EngineConfig, args: &RunArgs) -> EngineConfig {
    if args.max_concurrency.is_some() {
        config.max_concurrency = args.max_concurrency;
    }
    if args.step_timeout.is_some() {
        config.step_timeout_secs = args.step_timeout;
    }
    if args.plan_timeout.is_some() {
        config.plan_timeout_secs = args.plan_timeout;
    }
    config
}

/// Prompts need a terminal; without one, `ask` degrades to `abort`.
fn resolve_failure_mode(mode: FailureMode) -> FailureMode {
    if mode == FailureMode::Ask && !console::Term::stderr().is_term() {
        tracing::warn!("stderr is not a terminal, failures will abort the plan");
        return FailureMode::Abort;
    }
    mode
}

// ---------------------------------------------------------------------------
// Interactive recovery
// ---------------------------------------------------------------------------

async fn drive_interactive(mut run: PlanRun) -> Result<PlanOutcome> {
    while let Some(pending) = run.next_failure().await {
        let decision = tokio::task::block_in_place(|| prompt_decision(pending.context()))
            .unwrap_or_else(|e| RecoveryDecision::Reject(format!("recovery prompt failed: {e}")));
        tracing::debug!(step_id = pending.step_id(), ?decision, "user decided");
        pending.decide(decision);
    }
    Ok(run.wait().await?)
}

fn prompt_decision(failure: &FailureContext) -> Result<RecoveryDecision> {
    eprintln!();
    eprintln!(
        "  {} Step '{}' ({}) failed on attempt {}",
        style("!").red().bold(),
        style(&failure.step_id).cyan(),
        failure.tool,
        failure.attempt
    );
    eprintln!("  {}", style(&failure.error).red());
    if let Some(input) = &failure.input {
        eprintln!("  Input: {}", style(input).dim());
    }
    eprintln!();

    let items = [
        "Retry with the same input",
        "Regenerate from a replacement step file",
        "Skip this step",
        "Abort the plan",
    ];
    let selection = Select::new()
        .with_prompt("How should the plan continue?")
        .items(&items[..])
        .default(0)
        .interact()?;

    let decision = match selection {
        0 => RecoveryDecision::Resolve(RecoveryAction::Retry),
        1 => {
            let path: String = Input::new()
                .with_prompt("Replacement step file (JSON or YAML)")
                .interact_text()?;
            let replacement = load_replacement(Path::new(path.trim()), &failure.step_id)?;
            RecoveryDecision::Resolve(RecoveryAction::Regenerate(replacement))
        }
        2 => RecoveryDecision::Resolve(RecoveryAction::Skip),
        _ => RecoveryDecision::Reject(format!("aborted by user at step '{}'", failure.step_id)),
    };
    Ok(decision)
}

/// Read a replacement step definition. The ID may be omitted; the failed
/// step's ID is kept either way.
fn load_replacement(path: &Path, step_id: &str) -> Result<StepDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?,
    };

    if let Some(obj) = value.as_object_mut() {
        let has_id = ["step_id", "id", "stepId"].iter().any(|k| obj.contains_key(*k));
        if !has_id {
            obj.insert("step_id".to_string(), Value::String(step_id.to_string()));
        }
    }

    serde_json::from_value(value)
        .with_context(|| format!("{} is not a valid step definition", path.display()))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Prints lifecycle events to stderr as they happen.
struct EventPrinter;

impl ExecutionObserver for EventPrinter {
    fn on_event(&self, event: &PlanEvent) {
        if let Some(line) = format_event(event) {
            eprintln!("{line}");
        }
    }
}

fn format_event(event: &PlanEvent) -> Option<String> {
    match event {
        PlanEvent::StepStart {
            step_id,
            tool,
            attempt,
            ..
        } => {
            let retry = if *attempt > 1 {
                format!(" (attempt {attempt})")
            } else {
                String::new()
            };
            Some(format!(
                "  {} {} {}{}",
                style(">").cyan(),
                style(step_id).bold(),
                style(tool).dim(),
                retry
            ))
        }
        PlanEvent::StepSuccess {
            step_id,
            duration_ms,
            ..
        } => Some(format!(
            "  {} {} {}",
            style("+").green().bold(),
            step_id,
            style(format!("{duration_ms}ms")).dim()
        )),
        PlanEvent::StepError { step_id, error, .. } => Some(format!(
            "  {} {}: {}",
            style("x").red().bold(),
            step_id,
            style(error).red()
        )),
        PlanEvent::StepSkipped { step_id, .. } => Some(format!(
            "  {} {} skipped",
            style("-").yellow().bold(),
            step_id
        )),
        PlanEvent::PlanComplete {
            succeeded,
            skipped,
            duration_ms,
            ..
        } => Some(format!(
            "  {} Plan complete: {succeeded} succeeded, {skipped} skipped in {duration_ms}ms",
            style("*").green().bold()
        )),
        PlanEvent::PlanAborted { reason, .. } => Some(format!(
            "  {} Plan aborted: {}",
            style("!").red().bold(),
            reason
        )),
        PlanEvent::StepReady { .. }
        | PlanEvent::ToolResult { .. }
        | PlanEvent::RecoveryPending { .. } => None,
    }
}

fn print_summary(outcome: &PlanOutcome) {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Step").fg(Color::White),
        Cell::new("Tool").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Attempts").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Result").fg(Color::White),
    ]);

    for step in &outcome.steps {
        let result = match (&step.output, &step.error) {
            (Some(output), _) => truncate(&output.to_string(), 60),
            (None, Some(error)) => truncate(error, 60),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(&step.id).fg(Color::Cyan),
            Cell::new(&step.tool),
            Cell::new(step.status.to_string()).fg(status_color(step.status)),
            Cell::new(step.attempts),
            Cell::new(
                step.duration_ms
                    .map(|ms| format!("{ms}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(result),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  Run {} {} in {}ms",
        style(outcome.run_id).dim(),
        if outcome.is_success() {
            style("completed").green().to_string()
        } else {
            style("aborted").red().to_string()
        },
        outcome.duration_ms
    );
    println!();
}

fn status_color(status: StepStatus) -> Color {
    match status {
        StepStatus::Success => Color::Green,
        StepStatus::Error => Color::Red,
        StepStatus::Skipped => Color::Yellow,
        StepStatus::Pending | StepStatus::Ready | StepStatus::Running => Color::DarkGrey,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::event::FailureKind;
    use std::io::Write;
    use uuid::Uuid;

    fn args() -> RunArgs {
        RunArgs {
            file: PathBuf::from("plan.json"),
            mode: None,
            max_concurrency: None,
            on_failure: FailureMode::Abort,
            retries: 2,
            step_timeout: None,
            plan_timeout: None,
            config: None,
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let file_config = EngineConfig {
            max_concurrency: Some(8),
            step_timeout_secs: Some(30),
            ..EngineConfig::default()
        };
        let mut args = args();
        args.max_concurrency = Some(2);
        args.plan_timeout = Some(60);

        let config = apply_overrides(file_config, &args);
        assert_eq!(config.max_concurrency, Some(2));
        assert_eq!(config.step_timeout_secs, Some(30));
        assert_eq!(config.plan_timeout_secs, Some(60));
    }

    #[test]
    fn test_format_event_lines() {
        let run_id = Uuid::now_v7();
        let line = format_event(&PlanEvent::StepError {
            run_id,
            step_id: "fetch".into(),
            error: "boom".into(),
            kind: FailureKind::Tool,
        })
        .unwrap();
        assert!(line.contains("fetch"));
        assert!(line.contains("boom"));

        let line = format_event(&PlanEvent::StepStart {
            run_id,
            step_id: "fetch".into(),
            tool: "echo".into(),
            attempt: 2,
            input: Value::Null,
        })
        .unwrap();
        assert!(line.contains("attempt 2"));

        assert!(
            format_event(&PlanEvent::StepReady {
                run_id,
                step_id: "fetch".into()
            })
            .is_none()
        );
    }

    #[test]
    fn test_load_replacement_json_keeps_failed_id() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(br#"{"tool": "echo", "input": {"q": 1}, "outputSchema": {"type": "object"}}"#)
            .unwrap();

        let step = load_replacement(file.path(), "search").unwrap();
        assert_eq!(step.id, "search");
        assert_eq!(step.tool, "echo");
        assert_eq!(step.input, serde_json::json!({"q": 1}));
    }

    #[test]
    fn test_load_replacement_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"tool: wrap\ninput:\n  value: [1, 2]\noutputSchema:\n  type: object\n")
            .unwrap();

        let step = load_replacement(file.path(), "search").unwrap();
        assert_eq!(step.id, "search");
        assert_eq!(step.tool, "wrap");
        assert_eq!(step.input, serde_json::json!({"value": [1, 2]}));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
