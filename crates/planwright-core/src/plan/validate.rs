//! Plan document parsing and validation.
//!
//! Converts JSON/YAML plan documents into a validated [`Plan`]. Validation
//! failures are fatal for the whole plan: nothing runs unless every check
//! passes.

use std::collections::HashSet;
use std::path::Path;

use planwright_types::plan::{ExecutionMode, OutputSchema, PlanDocument, SchemaType};
use thiserror::Error;

use super::dag::find_cycle;
use super::{Plan, PlanStep};
use crate::tool::ToolRegistry;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Reasons a plan document is rejected before execution.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Filesystem I/O failure while loading a plan file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plan must have at least one step")]
    EmptyPlan,

    /// Step IDs must be non-empty and use only `[A-Za-z0-9_-]` so that
    /// templates can reference them.
    #[error("invalid step ID '{0}' (use letters, digits, '_' or '-')")]
    InvalidStepId(String),

    #[error("step '{0}' has an empty tool name")]
    EmptyToolName(String),

    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("cycle detected: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    #[error(
        "step '{step_id}' declares output type '{found}'; outputs must be objects \
         (wrap arrays and scalars in a named property)"
    )]
    InvalidOutputSchema { step_id: String, found: SchemaType },

    /// Sequential plans run in array order, so a dependency must come first.
    #[error("step '{step_id}' depends on '{dependency}', which comes later in a sequential plan")]
    ForwardDependency { step_id: String, dependency: String },

    #[error("step '{step_id}' uses unregistered tool '{tool}'")]
    UnknownTool { step_id: String, tool: String },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON plan document. Does not validate.
pub fn parse_plan_json(json: &str) -> Result<PlanDocument, ValidationError> {
    serde_json::from_str(json).map_err(|e| ValidationError::Parse(e.to_string()))
}

/// Parse a YAML plan document. Does not validate.
pub fn parse_plan_yaml(yaml: &str) -> Result<PlanDocument, ValidationError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| ValidationError::Parse(e.to_string()))
}

/// Load a plan document from disk, choosing the parser by extension.
///
/// `.yaml` / `.yml` files are parsed as YAML, everything else as JSON.
pub fn load_plan_file(path: &Path) -> Result<PlanDocument, ValidationError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_plan_yaml(&content),
        _ => parse_plan_json(&content),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a plan document and produce an executable [`Plan`].
///
/// Checks, in order:
/// - at least one step; step IDs well-formed and tool names non-empty
/// - step IDs unique; dependencies reference existing steps
/// - no dependency cycles (the error names the cycle)
/// - every `outputSchema.type` is `"object"`
/// - sequential plans: dependencies precede their dependents
///
/// Sequential plans where no step declares `dependencies` get an implicit
/// chain (each step depends on its predecessor). As soon as one step declares
/// dependencies, declarations are authoritative and omitted means none.
pub fn validate(document: PlanDocument) -> Result<Plan, ValidationError> {
    let PlanDocument {
        execution_mode,
        steps,
    } = document;

    if steps.is_empty() {
        return Err(ValidationError::EmptyPlan);
    }

    for step in &steps {
        if !is_valid_step_id(&step.id) {
            return Err(ValidationError::InvalidStepId(step.id.clone()));
        }
        if step.tool.trim().is_empty() {
            return Err(ValidationError::EmptyToolName(step.id.clone()));
        }
    }

    // Unique step IDs
    let mut seen_ids = HashSet::new();
    for step in &steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    // Dependencies reference existing steps
    for step in &steps {
        for dep in step.dependencies.iter().flatten() {
            if !seen_ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let implicit_chain = execution_mode == ExecutionMode::Sequential
        && steps.iter().all(|s| s.dependencies.is_none());

    let effective: Vec<Vec<String>> = steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            if implicit_chain {
                if i == 0 {
                    vec![]
                } else {
                    vec![steps[i - 1].id.clone()]
                }
            } else {
                dedup_preserving_order(step.dependencies.as_deref().unwrap_or(&[]))
            }
        })
        .collect();

    // No cycles
    let pairs: Vec<(&str, &[String])> = steps
        .iter()
        .zip(&effective)
        .map(|(s, d)| (s.id.as_str(), d.as_slice()))
        .collect();
    if let Some(cycle) = find_cycle(&pairs) {
        return Err(ValidationError::Cycle { cycle });
    }

    // Output schemas describe objects
    for step in &steps {
        validate_output_schema(&step.id, &step.output_schema)?;
    }

    // Sequential plans advance in array order
    if execution_mode == ExecutionMode::Sequential {
        for (i, (step, deps)) in steps.iter().zip(&effective).enumerate() {
            for dep in deps {
                let dep_pos = steps.iter().position(|s| &s.id == dep).unwrap_or(i);
                if dep_pos > i {
                    return Err(ValidationError::ForwardDependency {
                        step_id: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
    }

    let plan_steps = steps
        .into_iter()
        .zip(effective)
        .map(|(definition, dependencies)| PlanStep {
            definition,
            dependencies,
            implicit_dependencies: implicit_chain,
        })
        .collect();

    Ok(Plan::new(execution_mode, plan_steps))
}

/// Reject non-object output schemas.
///
/// Also used when a failed step is regenerated with a replacement definition.
pub fn validate_output_schema(step_id: &str, schema: &OutputSchema) -> Result<(), ValidationError> {
    if schema.schema_type != SchemaType::Object {
        return Err(ValidationError::InvalidOutputSchema {
            step_id: step_id.to_string(),
            found: schema.schema_type,
        });
    }
    Ok(())
}

/// Check that every step names a tool present in `registry`, reporting all
/// offending steps in plan order.
///
/// Advisory: the engine tolerates unknown tools and reports them as failed
/// tool results at invocation time, where recovery can regenerate the step.
pub fn validate_tools(plan: &Plan, registry: &ToolRegistry) -> Result<(), Vec<ValidationError>> {
    let unknown: Vec<_> = plan
        .steps()
        .iter()
        .filter(|step| !registry.contains(&step.definition.tool))
        .map(|step| ValidationError::UnknownTool {
            step_id: step.id().to_string(),
            tool: step.definition.tool.clone(),
        })
        .collect();

    if unknown.is_empty() { Ok(()) } else { Err(unknown) }
}

fn is_valid_step_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn dedup_preserving_order(deps: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    deps.iter()
        .filter(|d| seen.insert(d.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use planwright_types::plan::StepDefinition;
    use serde_json::json;

    fn step(id: &str) -> StepDefinition {
        StepDefinition::new(id, "echo", json!({}))
    }

    fn doc(mode: ExecutionMode, steps: Vec<StepDefinition>) -> PlanDocument {
        PlanDocument {
            execution_mode: mode,
            steps,
        }
    }

    // -----------------------------------------------------------------------
    // Structural checks
    // -----------------------------------------------------------------------

    #[test]
    fn test_valid_dag_plan() {
        let plan = validate(doc(
            ExecutionMode::Dag,
            vec![step("a"), step("b").depends_on(["a"])],
        ))
        .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = validate(doc(ExecutionMode::Dag, vec![])).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPlan));
    }

    #[test]
    fn test_duplicate_step_id_rejected() {
        let err = validate(doc(ExecutionMode::Dag, vec![step("a"), step("a")])).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateStepId(ref id) if id == "a"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = validate(doc(
            ExecutionMode::Dag,
            vec![step("a").depends_on(["missing"])],
        ))
        .unwrap_err();
        assert!(err.to_string().contains("unknown step 'missing'"));
    }

    #[test]
    fn test_invalid_step_id_rejected() {
        let err = validate(doc(ExecutionMode::Dag, vec![step("has.dot")])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidStepId(_)));

        let err = validate(doc(ExecutionMode::Dag, vec![step("")])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidStepId(_)));
    }

    #[test]
    fn test_empty_tool_rejected() {
        let err = validate(doc(
            ExecutionMode::Dag,
            vec![StepDefinition::new("a", "  ", json!({}))],
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::EmptyToolName(_)));
    }

    // -----------------------------------------------------------------------
    // Cycles
    // -----------------------------------------------------------------------

    #[test]
    fn test_three_step_cycle_rejected_before_execution() {
        let err = validate(doc(
            ExecutionMode::Dag,
            vec![
                step("a").depends_on(["c"]),
                step("b").depends_on(["a"]),
                step("c").depends_on(["b"]),
            ],
        ))
        .unwrap_err();
        match err {
            ValidationError::Cycle { cycle } => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_message_names_steps() {
        let err = validate(doc(
            ExecutionMode::Dag,
            vec![step("a").depends_on(["b"]), step("b").depends_on(["a"])],
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "cycle detected: a -> b -> a");
    }

    #[test]
    fn test_cycle_reported_before_forward_dependency_in_sequential_mode() {
        let err = validate(doc(
            ExecutionMode::Sequential,
            vec![step("a").depends_on(["b"]), step("b").depends_on(["a"])],
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Cycle { .. }));
    }

    // -----------------------------------------------------------------------
    // Output schemas
    // -----------------------------------------------------------------------

    #[test]
    fn test_array_output_schema_rejected() {
        let err = validate(doc(
            ExecutionMode::Dag,
            vec![step("a").with_output_schema(OutputSchema::of(SchemaType::Array))],
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidOutputSchema { found: SchemaType::Array, .. }
        ));
        assert!(err.to_string().contains("wrap arrays"));
    }

    #[test]
    fn test_wrapped_array_output_schema_accepted() {
        let schema = OutputSchema::object().with_property("results", SchemaType::Array);
        assert!(validate(doc(ExecutionMode::Dag, vec![step("a").with_output_schema(schema)])).is_ok());
    }

    // -----------------------------------------------------------------------
    // Sequential dependency rules
    // -----------------------------------------------------------------------

    #[test]
    fn test_sequential_without_dependencies_gets_implicit_chain() {
        let plan = validate(doc(
            ExecutionMode::Sequential,
            vec![step("a"), step("b"), step("c")],
        ))
        .unwrap();
        assert!(plan.step("a").unwrap().dependencies.is_empty());
        assert_eq!(plan.step("b").unwrap().dependencies, vec!["a"]);
        assert_eq!(plan.step("c").unwrap().dependencies, vec!["b"]);
        assert!(plan.steps().iter().all(|s| s.implicit_dependencies));
    }

    #[test]
    fn test_sequential_declared_dependencies_are_authoritative() {
        let plan = validate(doc(
            ExecutionMode::Sequential,
            vec![step("a"), step("b"), step("c").depends_on(["a"])],
        ))
        .unwrap();
        // b omitted its dependencies; with any declaration present it has none
        assert!(plan.step("b").unwrap().dependencies.is_empty());
        assert_eq!(plan.step("c").unwrap().dependencies, vec!["a"]);
        assert!(!plan.step("c").unwrap().implicit_dependencies);
    }

    #[test]
    fn test_dag_without_dependencies_has_no_implicit_chain() {
        let plan = validate(doc(ExecutionMode::Dag, vec![step("a"), step("b")])).unwrap();
        assert!(plan.step("b").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_sequential_forward_dependency_rejected() {
        let err = validate(doc(
            ExecutionMode::Sequential,
            vec![step("a").depends_on(["b"]), step("b").depends_on(Vec::<String>::new())],
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::ForwardDependency { .. }));
    }

    #[test]
    fn test_dag_forward_dependency_allowed() {
        let plan = validate(doc(
            ExecutionMode::Dag,
            vec![step("a").depends_on(["b"]), step("b")],
        ))
        .unwrap();
        assert_eq!(plan.step("a").unwrap().dependencies, vec!["b"]);
    }

    #[test]
    fn test_duplicate_dependencies_collapsed() {
        let plan = validate(doc(
            ExecutionMode::Dag,
            vec![step("a"), step("b").depends_on(["a", "a"])],
        ))
        .unwrap();
        assert_eq!(plan.step("b").unwrap().dependencies, vec!["a"]);
    }

    #[test]
    fn test_validate_tools_reports_every_unknown_tool() {
        use crate::tool::FnTool;
        use planwright_types::error::ToolError;
        use serde_json::Value;
        use tokio_util::sync::CancellationToken;

        let registry = ToolRegistry::new().with(FnTool::new(
            "echo",
            |args: Value, _cancel: CancellationToken| async move { Ok::<_, ToolError>(args) },
        ));
        let plan = validate(doc(
            ExecutionMode::Dag,
            vec![
                step("a"),
                StepDefinition::new("b", "web_search", json!({})),
                StepDefinition::new("c", "summarize", json!({})),
            ],
        ))
        .unwrap();

        let errors = validate_tools(&plan, &registry).unwrap_err();
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "step 'b' uses unregistered tool 'web_search'",
                "step 'c' uses unregistered tool 'summarize'",
            ]
        );

        let known = validate(doc(ExecutionMode::Dag, vec![step("a")])).unwrap();
        assert!(validate_tools(&known, &registry).is_ok());
    }

    // -----------------------------------------------------------------------
    // Parsing and files
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_plan_json_error() {
        let err = parse_plan_json("{ not json").unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[test]
    fn test_load_yaml_plan_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(
            &path,
            r#"
executionMode: dag
steps:
  - step_id: fetch
    tool: echo
    input:
      url: "https://example.com"
    outputSchema:
      type: object
    reason: fetch the page
"#,
        )
        .unwrap();

        let doc = load_plan_file(&path).unwrap();
        assert_eq!(doc.execution_mode, ExecutionMode::Dag);
        assert_eq!(doc.steps[0].id, "fetch");
        assert!(validate(doc).is_ok());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_plan_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ValidationError::Io(_)));
    }
}
