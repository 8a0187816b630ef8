//! Plan document types.
//!
//! A plan is produced by an external planner (usually an LLM) as JSON:
//!
//! ```json
//! {
//!   "executionMode": "dag",
//!   "steps": [
//!     {
//!       "step_id": "search",
//!       "tool": "web_search",
//!       "input": { "query": "rust async" },
//!       "outputSchema": { "type": "object", "properties": { "results": { "type": "array" } } },
//!       "reason": "find sources"
//!     }
//!   ]
//! }
//! ```
//!
//! These types are the raw, unvalidated document. The engine turns a
//! `PlanDocument` into a validated plan before anything runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Plan document
// ---------------------------------------------------------------------------

/// The plan document as authored by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Execution discipline for the whole plan.
    #[serde(default, rename = "executionMode", alias = "execution_mode")]
    pub execution_mode: ExecutionMode,
    /// Ordered list of steps.
    pub steps: Vec<StepDefinition>,
}

/// How ready steps are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// At most one step running at a time, in plan order.
    #[default]
    Sequential,
    /// All ready steps run concurrently, ordered only by dependencies.
    Dag,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Dag => write!(f, "dag"),
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "dag" => Ok(ExecutionMode::Dag),
            other => Err(format!("unknown execution mode: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Step definition
// ---------------------------------------------------------------------------

/// A single tool-invocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step ID within the plan.
    #[serde(rename = "step_id", alias = "id", alias = "stepId")]
    pub id: String,
    /// Name of the tool to invoke.
    pub tool: String,
    /// Tool arguments. String leaves may contain `{{ step.field }}` templates.
    #[serde(default)]
    pub input: Value,
    /// Declared shape of the tool output.
    #[serde(rename = "outputSchema", alias = "output_schema")]
    pub output_schema: OutputSchema,
    /// Why the planner chose this step. Informational only.
    #[serde(default)]
    pub reason: String,
    /// Step IDs this step depends on. `None` means the field was omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    /// Whether a skipped dependency still lets this step run.
    #[serde(
        default,
        rename = "tolerateSkipped",
        alias = "tolerate_skipped",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub tolerate_skipped: bool,
}

impl StepDefinition {
    /// Build a step with an object output schema and no explicit dependencies.
    pub fn new(id: impl Into<String>, tool: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            input,
            output_schema: OutputSchema::object(),
            reason: String::new(),
            dependencies: None,
            tolerate_skipped: false,
        }
    }

    /// Set explicit dependencies.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(deps.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the output schema.
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = schema;
        self
    }

    /// Opt in to running when a dependency was skipped.
    pub fn tolerating_skipped(mut self) -> Self {
        self.tolerate_skipped = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Output schema
// ---------------------------------------------------------------------------

/// JSON-schema-like description of a step's output.
///
/// Only `type` and `properties` are interpreted; anything else is preserved
/// verbatim for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutputSchema {
    /// An object schema with no declared properties.
    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    /// A bare schema of the given type.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            properties: Map::new(),
            extra: Map::new(),
        }
    }

    /// Add a named property with the given type.
    pub fn with_property(mut self, name: impl Into<String>, schema_type: SchemaType) -> Self {
        self.properties.insert(
            name.into(),
            serde_json::json!({ "type": schema_type.to_string() }),
        );
        self
    }
}

/// The JSON type a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        };
        f.write_str(s)
    }
}
