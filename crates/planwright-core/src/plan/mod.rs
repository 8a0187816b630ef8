//! Plan model: the validated, immutable form of a plan document.
//!
//! - `validate` -- parsing and structural validation (`PlanDocument` -> `Plan`)
//! - `dag` -- dependency graph, cycle detection, parallel wave computation

pub mod dag;
pub mod validate;

use std::collections::HashMap;

use planwright_types::plan::{ExecutionMode, StepDefinition};

pub use validate::{
    ValidationError, load_plan_file, parse_plan_json, parse_plan_yaml, validate, validate_tools,
};

/// A step together with its effective dependencies.
///
/// Effective dependencies differ from the declared ones only for sequential
/// plans authored without any `dependencies` field, where each step depends
/// on its predecessor.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub definition: StepDefinition,
    pub dependencies: Vec<String>,
    /// True when `dependencies` is the implicit predecessor chain. Such
    /// dependencies order execution but carry no data, so a skipped
    /// predecessor only matters if the input references it.
    pub implicit_dependencies: bool,
}

impl PlanStep {
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// A validated plan. Only obtainable through [`validate`].
#[derive(Debug, Clone)]
pub struct Plan {
    mode: ExecutionMode,
    steps: Vec<PlanStep>,
    index: HashMap<String, usize>,
}

impl Plan {
    pub(crate) fn new(mode: ExecutionMode, steps: Vec<PlanStep>) -> Self {
        let index = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id().to_string(), i))
            .collect();

        Self { mode, steps, index }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Steps in plan order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
