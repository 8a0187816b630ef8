//! Template expressions inside step inputs.
//!
//! String leaves of a step's `input` may reference earlier step outputs with
//! `{{ stepId }}` or `{{ stepId.field.path }}`. Parsing and resolution are
//! separate: `parser` turns a string into a [`Template`], `resolver` evaluates
//! templates against the outputs recorded so far.

pub mod parser;
pub mod resolver;

use thiserror::Error;

pub use parser::{FieldAccess, Segment, Template, parse};
pub use resolver::{OutputStore, resolve_expression, resolve_input};

/// Why a step input could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("template syntax error: {0}")]
    Syntax(String),

    #[error("template references unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{step_id}' has not completed successfully")]
    StepNotSucceeded { step_id: String },

    #[error("step '{step_id}' was skipped")]
    SkippedDependency { step_id: String },

    #[error("output of step '{step_id}' has no field '{path}'")]
    MissingField { step_id: String, path: String },

    #[error(
        "step '{step_id}' has a non-object output; '{path}' cannot be accessed \
         (reference the whole output instead)"
    )]
    FieldOnDirectOutput { step_id: String, path: String },

    #[error(
        "'{expression}' uses an 'output' segment; reference fields directly \
         (e.g. '{{{{step.field}}}}')"
    )]
    OutputWrapperSegment { expression: String },
}
