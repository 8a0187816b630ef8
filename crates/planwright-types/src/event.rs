//! Lifecycle events emitted during plan execution.
//!
//! `PlanEvent` is the unified event type published by the scheduler. All
//! variants are Clone + Send + Sync for use with tokio broadcast channels.
//! Events are informational: nothing a subscriber does with them feeds back
//! into scheduling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::tool::ToolResult;

/// Events emitted while a plan runs, in state-transition order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlanEvent {
    /// All dependencies of a step are satisfied.
    StepReady { run_id: Uuid, step_id: String },

    /// A step's tool invocation is starting.
    StepStart {
        run_id: Uuid,
        step_id: String,
        tool: String,
        /// 1-based attempt number (retries and regenerations increment it).
        attempt: u32,
        /// The fully resolved tool input.
        input: Value,
    },

    /// A tool invocation returned (successfully or not).
    ToolResult {
        run_id: Uuid,
        step_id: String,
        tool: String,
        result: ToolResult,
    },

    /// A step completed successfully.
    StepSuccess {
        run_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },

    /// A step entered the error state.
    StepError {
        run_id: Uuid,
        step_id: String,
        error: String,
        kind: FailureKind,
    },

    /// A failure is waiting for a recovery decision. Dispatch is paused.
    RecoveryPending {
        run_id: Uuid,
        step_id: String,
        error: String,
    },

    /// A failed step was skipped by a recovery decision.
    StepSkipped { run_id: Uuid, step_id: String },

    /// Every step reached a terminal state.
    PlanComplete {
        run_id: Uuid,
        duration_ms: u64,
        succeeded: usize,
        skipped: usize,
    },

    /// The plan was aborted (rejected failure, cancellation, or timeout).
    PlanAborted { run_id: Uuid, reason: String },
}

/// Why a step ended up in the error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Template resolution of the step input failed.
    Resolution,
    /// The tool failed, timed out, or was not found.
    Tool,
    /// The whole plan was aborted while the step was unfinished.
    Aborted,
}

impl PlanEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> Uuid {
        match self {
            PlanEvent::StepReady { run_id, .. }
            | PlanEvent::StepStart { run_id, .. }
            | PlanEvent::ToolResult { run_id, .. }
            | PlanEvent::StepSuccess { run_id, .. }
            | PlanEvent::StepError { run_id, .. }
            | PlanEvent::RecoveryPending { run_id, .. }
            | PlanEvent::StepSkipped { run_id, .. }
            | PlanEvent::PlanComplete { run_id, .. }
            | PlanEvent::PlanAborted { run_id, .. } => *run_id,
        }
    }

    /// The step this event concerns, or None for plan-level events.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            PlanEvent::StepReady { step_id, .. }
            | PlanEvent::StepStart { step_id, .. }
            | PlanEvent::ToolResult { step_id, .. }
            | PlanEvent::StepSuccess { step_id, .. }
            | PlanEvent::StepError { step_id, .. }
            | PlanEvent::RecoveryPending { step_id, .. }
            | PlanEvent::StepSkipped { step_id, .. } => Some(step_id),

            PlanEvent::PlanComplete { .. } | PlanEvent::PlanAborted { .. } => None,
        }
    }

    /// Stable kebab-case name of the event kind (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            PlanEvent::StepReady { .. } => "step-ready",
            PlanEvent::StepStart { .. } => "step-start",
            PlanEvent::ToolResult { .. } => "tool-result",
            PlanEvent::StepSuccess { .. } => "step-success",
            PlanEvent::StepError { .. } => "step-error",
            PlanEvent::RecoveryPending { .. } => "recovery-pending",
            PlanEvent::StepSkipped { .. } => "step-skipped",
            PlanEvent::PlanComplete { .. } => "plan-complete",
            PlanEvent::PlanAborted { .. } => "plan-aborted",
        }
    }

    /// Whether this is the last event of a run.
    pub fn is_final(&self) -> bool {
        matches!(self, PlanEvent::PlanComplete { .. } | PlanEvent::PlanAborted { .. })
    }
}
