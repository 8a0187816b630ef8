//! `planwright validate`: structural checks plus a dependency-wave preview.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use planwright_core::plan::{Plan, ValidationError, dag, load_plan_file, validate, validate_tools};
use planwright_types::plan::ExecutionMode;

use super::tools::builtin_registry;

/// Load and validate a plan file, optionally forcing the execution mode.
pub fn load_plan(path: &Path, mode: Option<ExecutionMode>) -> Result<Plan> {
    let mut document = load_plan_file(path).map_err(|e| match e {
        ValidationError::Parse(msg) => anyhow::anyhow!("Failed to parse {}: {msg}", path.display()),
        other => anyhow::Error::new(other).context(format!("Failed to read {}", path.display())),
    })?;

    if let Some(mode) = mode {
        document.execution_mode = mode;
    }

    validate(document).with_context(|| format!("Plan {} is invalid", path.display()))
}

/// Steps that name a tool the built-in registry does not have, as
/// `step (tool)` labels.
pub fn unknown_tools(plan: &Plan) -> Vec<String> {
    let Err(errors) = validate_tools(plan, &builtin_registry()) else {
        return Vec::new();
    };
    errors
        .into_iter()
        .map(|e| match e {
            ValidationError::UnknownTool { step_id, tool } => format!("{step_id} ({tool})"),
            other => other.to_string(),
        })
        .collect()
}

/// Handle `planwright validate <file>`.
pub fn validate_plan(path: &Path, json: bool) -> Result<()> {
    let plan = load_plan(path, None)?;
    let waves = dag::execution_waves(&plan);
    let unknown = unknown_tools(&plan);

    if json {
        let out = serde_json::json!({
            "valid": true,
            "mode": plan.mode().to_string(),
            "steps": plan.len(),
            "waves": waves,
            "unknown_tools": unknown,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Plan '{}' is valid",
        style("*").green().bold(),
        style(path.display()).cyan()
    );
    println!("  Mode:  {}", plan.mode());
    println!("  Steps: {}", plan.len());
    println!();

    let label = match plan.mode() {
        ExecutionMode::Sequential => "Dependency waves (run one step at a time)",
        ExecutionMode::Dag => "Dependency waves (steps in a wave may run in parallel)",
    };
    println!("  {}", style(label).bold());
    for (i, wave) in waves.iter().enumerate() {
        println!("    {} {}", style(format!("{}.", i + 1)).dim(), wave.join(", "));
    }

    if !unknown.is_empty() {
        println!();
        println!(
            "  {} Not a built-in tool: {}",
            style("!").yellow().bold(),
            unknown.join(", ")
        );
    }
    println!();

    Ok(())
}
