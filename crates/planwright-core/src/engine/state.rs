//! Per-run step state table.
//!
//! Owned exclusively by the scheduler task. Every status change goes through
//! [`ExecutionTable::transition`], which rejects anything the step state
//! machine does not allow.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use planwright_types::plan::StepDefinition;
use planwright_types::status::StepStatus;
use planwright_types::tool::ToolResult;
use serde_json::Value;
use thiserror::Error;

use crate::plan::Plan;

/// Broken scheduler invariants. Any of these aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("illegal transition for step '{step_id}': {from} -> {to}")]
    IllegalTransition {
        step_id: String,
        from: StepStatus,
        to: StepStatus,
    },

    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error(
        "step '{attempted}' failed while a failure of step '{outstanding}' is still awaiting a decision"
    )]
    SecondPendingFailure {
        outstanding: String,
        attempted: String,
    },

    #[error("no step can make progress; waiting: {}", pending.join(", "))]
    Stalled { pending: Vec<String> },

    #[error("tool task failed: {0}")]
    TaskFailed(String),
}

/// Mutable execution state of one step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Current definition; replaced wholesale (minus id and dependencies) by
    /// a regenerate decision.
    pub definition: StepDefinition,
    pub dependencies: Vec<String>,
    /// See [`PlanStep::implicit_dependencies`](crate::plan::PlanStep).
    pub implicit_dependencies: bool,
    pub status: StepStatus,
    /// Input of the latest attempt that got past template resolution.
    pub resolved_input: Option<Value>,
    pub result: Option<ToolResult>,
    pub last_error: Option<String>,
    /// Number of dispatch attempts so far (1-based once started).
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

#[derive(Debug)]
pub struct ExecutionTable {
    records: Vec<StepRecord>,
    index: HashMap<String, usize>,
}

impl ExecutionTable {
    /// One pending record per plan step, in plan order.
    pub fn from_plan(plan: &Plan) -> Self {
        let records: Vec<StepRecord> = plan
            .steps()
            .iter()
            .map(|step| StepRecord {
                definition: step.definition.clone(),
                dependencies: step.dependencies.clone(),
                implicit_dependencies: step.implicit_dependencies,
                status: StepStatus::Pending,
                resolved_input: None,
                result: None,
                last_error: None,
                attempts: 0,
                started_at: None,
                finished_at: None,
            })
            .collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().to_string(), i))
            .collect();
        Self { records, index }
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    pub fn get(&self, step_id: &str) -> Result<&StepRecord, SchedulerError> {
        self.index
            .get(step_id)
            .map(|&i| &self.records[i])
            .ok_or_else(|| SchedulerError::UnknownStep(step_id.to_string()))
    }

    pub fn get_mut(&mut self, step_id: &str) -> Result<&mut StepRecord, SchedulerError> {
        match self.index.get(step_id) {
            Some(&i) => Ok(&mut self.records[i]),
            None => Err(SchedulerError::UnknownStep(step_id.to_string())),
        }
    }

    pub fn status(&self, step_id: &str) -> Result<StepStatus, SchedulerError> {
        self.get(step_id).map(|r| r.status)
    }

    /// Move a step to `to`, stamping start/finish times.
    ///
    /// Returns the previous status.
    pub fn transition(&mut self, step_id: &str, to: StepStatus) -> Result<StepStatus, SchedulerError> {
        let record = self.get_mut(step_id)?;
        let from = record.status;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::IllegalTransition {
                step_id: step_id.to_string(),
                from,
                to,
            });
        }

        record.status = to;
        match to {
            StepStatus::Running => {
                record.started_at = Some(Utc::now());
                record.finished_at = None;
            }
            StepStatus::Success | StepStatus::Error | StepStatus::Skipped => {
                record.finished_at = Some(Utc::now());
            }
            StepStatus::Pending | StepStatus::Ready => {}
        }
        Ok(from)
    }

    /// Promote every pending step whose dependencies have all settled
    /// (succeeded or been skipped). Returns the promoted IDs in plan order.
    ///
    /// Steps that do not tolerate skipped dependencies are promoted too; their
    /// dispatch fails resolution so the skip surfaces as a recoverable error.
    /// For implicit-chain dependencies that only happens when the input
    /// actually references the skipped step.
    pub fn promote_ready(&mut self) -> Vec<String> {
        let promotable: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.status == StepStatus::Pending)
            .filter(|r| r.dependencies.iter().all(|dep| self.is_settled(dep)))
            .map(|r| r.id().to_string())
            .collect();

        for id in &promotable {
            if let Some(&i) = self.index.get(id) {
                self.records[i].status = StepStatus::Ready;
            }
        }
        promotable
    }

    /// Lowest-index ready step.
    pub fn first_ready(&self) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.status == StepStatus::Ready)
            .map(StepRecord::id)
    }

    pub fn running_count(&self) -> usize {
        self.count(StepStatus::Running)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Dependencies of `step_id` that were skipped.
    pub fn skipped_dependencies(&self, step_id: &str) -> Result<Vec<String>, SchedulerError> {
        let record = self.get(step_id)?;
        Ok(record
            .dependencies
            .iter()
            .filter(|dep| self.status(dep).ok() == Some(StepStatus::Skipped))
            .cloned()
            .collect())
    }

    /// True once every step succeeded or was skipped.
    pub fn all_settled(&self) -> bool {
        self.records
            .iter()
            .all(|r| matches!(r.status, StepStatus::Success | StepStatus::Skipped))
    }

    /// Steps that have not succeeded or been skipped, in plan order.
    pub fn unsettled_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| !matches!(r.status, StepStatus::Success | StepStatus::Skipped))
            .map(|r| r.id().to_string())
            .collect()
    }

    fn is_settled(&self, step_id: &str) -> bool {
        matches!(
            self.status(step_id),
            Ok(StepStatus::Success | StepStatus::Skipped)
        )
    }
}
