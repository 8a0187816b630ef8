//! Plan execution: scheduling, failure recovery, and the public executor API.
//!
//! - `executor` -- `PlanExecutor` / `PlanRun` / `PlanOutcome`
//! - `scheduler` -- the per-run actor that owns all mutable run state
//! - `recovery` -- pending failures, decisions, and automatic policies
//! - `state` -- the step state table and scheduler invariant errors

pub mod executor;
pub mod recovery;
mod scheduler;
pub mod state;

pub use executor::{ExecutorError, PlanExecutor, PlanOutcome, PlanRun, RunStatus, StepReport};
pub use recovery::{
    AbortOnFailure, FailureContext, PendingFailure, RecoveryAction, RecoveryDecision,
    RecoveryPolicy, RetryThenSkip, SkipOnFailure,
};
pub use state::SchedulerError;
