//! Executor API: start plan runs, answer their failures, collect outcomes.
//!
//! ```ignore
//! let executor = PlanExecutor::new(registry, EngineConfig::default());
//! let mut run = executor.start_document(document)?;
//! while let Some(failure) = run.next_failure().await {
//!     failure.retry();
//! }
//! let outcome = run.wait().await?;
//! ```
//!
//! Each run gets its own scheduler task, state table, and pending-failure
//! slot. Runs started from the same executor share only the tool registry,
//! configuration, event bus, and observers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use planwright_types::config::EngineConfig;
use planwright_types::event::PlanEvent;
use planwright_types::plan::PlanDocument;
use planwright_types::status::StepStatus;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::event::{EventBus, EventEmitter, ExecutionObserver, RunEvents};
use crate::plan::{Plan, ValidationError, validate};
use crate::tool::{ToolInvoker, ToolRegistry};

use super::recovery::{PendingFailure, RecoveryPolicy};
use super::scheduler::Scheduler;
use super::state::StepRecord;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("invalid plan: {0}")]
    Validation(#[from] ValidationError),

    #[error("scheduler task failed: {0}")]
    Join(String),
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every step succeeded or was skipped.
    Completed,
    /// A failure was rejected, or the run was cancelled or timed out.
    Aborted,
}

/// Final report of a plan run.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub duration_ms: u64,
    /// Per-step reports in plan order.
    pub steps: Vec<StepReport>,
}

impl PlanOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn step(&self, step_id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Output of a successful step.
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.step(step_id).and_then(|s| s.output.as_ref())
    }
}

/// Final state of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: String,
    pub tool: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<StepRecord> for StepReport {
    fn from(record: StepRecord) -> Self {
        let succeeded = record.status == StepStatus::Success;
        let duration_ms = record.result.as_ref().map(|r| r.duration_ms);
        let output = if succeeded {
            record.result.and_then(|r| r.output)
        } else {
            None
        };
        Self {
            id: record.definition.id,
            tool: record.definition.tool,
            status: record.status,
            attempts: record.attempts,
            input: record.resolved_input,
            output,
            error: record.last_error,
            duration_ms,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

// ---------------------------------------------------------------------------
// PlanExecutor
// ---------------------------------------------------------------------------

/// Entry point for running plans against a tool registry.
pub struct PlanExecutor {
    invoker: ToolInvoker,
    config: EngineConfig,
    event_bus: EventBus,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl PlanExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self {
            invoker: ToolInvoker::new(registry).with_timeout(config.step_timeout()),
            event_bus: EventBus::new(config.event_capacity),
            config,
            observers: Vec::new(),
        }
    }

    /// Add a synchronous observer for every run started afterwards.
    pub fn with_observer(mut self, observer: impl ExecutionObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Subscribe to lifecycle events of all runs.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.event_bus.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.invoker.registry()
    }

    /// Start running a validated plan on a new task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self, plan: Plan) -> PlanRun {
        self.spawn_run(Uuid::now_v7(), plan)
    }

    /// Start a plan together with a subscription to its events, taken before
    /// the first event is published.
    pub fn start_observed(&self, plan: Plan) -> (PlanRun, RunEvents) {
        let run_id = Uuid::now_v7();
        let events = self.event_bus.subscribe_run(run_id);
        (self.spawn_run(run_id, plan), events)
    }

    fn spawn_run(&self, run_id: Uuid, plan: Plan) -> PlanRun {
        let cancel = CancellationToken::new();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let scheduler = Scheduler::new(
            run_id,
            plan,
            self.invoker.clone(),
            EventEmitter::new(self.event_bus.clone(), self.observers.clone()),
            failures_tx,
            cancel.clone(),
            &self.config,
        );
        let span = tracing::info_span!("plan_run", run_id = %run_id);
        let handle = tokio::spawn(scheduler.run().instrument(span));

        PlanRun {
            run_id,
            failures: failures_rx,
            cancel,
            handle,
        }
    }

    /// Validate a plan document and start it.
    pub fn start_document(&self, document: PlanDocument) -> Result<PlanRun, ExecutorError> {
        Ok(self.start(validate(document)?))
    }

    /// Run a plan to the end, answering failures with `policy`.
    pub async fn execute<P: RecoveryPolicy>(
        &self,
        plan: Plan,
        policy: &P,
    ) -> Result<PlanOutcome, ExecutorError> {
        self.start(plan).drive(policy).await
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PlanRun
// ---------------------------------------------------------------------------

/// Handle to an in-flight plan run.
///
/// Failures arrive one at a time through [`next_failure`](Self::next_failure);
/// the run stays paused until each is resolved or dropped.
#[derive(Debug)]
pub struct PlanRun {
    run_id: Uuid,
    failures: mpsc::UnboundedReceiver<PendingFailure>,
    cancel: CancellationToken,
    handle: JoinHandle<PlanOutcome>,
}

impl PlanRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The next failure awaiting a decision, or None once the run has ended.
    pub async fn next_failure(&mut self) -> Option<PendingFailure> {
        self.failures.recv().await
    }

    /// Abort the run. Running tools see their cancellation token fire.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end.
    ///
    /// Stops listening for failures first, so any failure still to come
    /// rejects the plan.
    pub async fn wait(self) -> Result<PlanOutcome, ExecutorError> {
        drop(self.failures);
        self.handle
            .await
            .map_err(|e| ExecutorError::Join(e.to_string()))
    }

    /// Answer every failure with `policy` until the run ends.
    pub async fn drive<P: RecoveryPolicy>(mut self, policy: &P) -> Result<PlanOutcome, ExecutorError> {
        while let Some(pending) = self.failures.recv().await {
            let decision = policy.decide(pending.context()).await;
            tracing::debug!(
                run_id = %self.run_id,
                step_id = pending.step_id(),
                ?decision,
                "policy decided"
            );
            pending.decide(decision);
        }
        self.wait().await
    }
}
