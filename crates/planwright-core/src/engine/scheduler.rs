//! Dependency scheduler: the single task that drives a plan run.
//!
//! The scheduler owns the state table, the output store, and the
//! pending-failure slot; nothing else mutates them. Tool invocations run on a
//! `JoinSet` and report back as completions. Each loop iteration:
//!
//! 1. applies queued completions (unless a failure awaits a decision)
//! 2. promotes steps whose dependencies have settled
//! 3. dispatches ready steps (one at a time in sequential mode, up to the
//!    concurrency limit in DAG mode), unless a failure awaits a decision
//! 4. waits for a completion, a decision, cancellation, or the plan deadline
//!
//! Completions that arrive while a failure awaits a decision are queued and
//! applied after it is resolved, so no new step starts in the meantime.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use planwright_types::config::EngineConfig;
use planwright_types::event::{FailureKind, PlanEvent};
use planwright_types::plan::ExecutionMode;
use planwright_types::status::StepStatus;
use planwright_types::tool::ToolResult;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::EventEmitter;
use crate::plan::Plan;
use crate::plan::validate::validate_output_schema;
use crate::template::{OutputStore, ResolutionError, resolve_input};
use crate::tool::ToolInvoker;

use super::executor::{PlanOutcome, RunStatus, StepReport};
use super::recovery::{
    FailureContext, PendingFailure, RecoveryAction, RecoveryCoordinator, RecoveryDecision,
};
use super::state::{ExecutionTable, SchedulerError};

/// Result of one tool task.
struct Completion {
    step_id: String,
    result: ToolResult,
}

/// What woke the scheduler loop.
enum Wake {
    Completed(Result<Completion, JoinError>),
    Decision(String, RecoveryDecision),
    Cancelled,
    TimedOut,
}

pub(crate) struct Scheduler {
    run_id: Uuid,
    mode: ExecutionMode,
    table: ExecutionTable,
    outputs: OutputStore,
    recovery: RecoveryCoordinator,
    invoker: ToolInvoker,
    emitter: EventEmitter,
    running: JoinSet<Completion>,
    deferred: VecDeque<Completion>,
    cancel: CancellationToken,
    max_concurrency: usize,
    max_attempts: u32,
    plan_timeout_secs: Option<u64>,
    deadline: Option<Instant>,
    abort: Option<String>,
    started: Instant,
}

impl Scheduler {
    pub(crate) fn new(
        run_id: Uuid,
        plan: Plan,
        invoker: ToolInvoker,
        emitter: EventEmitter,
        failures: mpsc::UnboundedSender<PendingFailure>,
        cancel: CancellationToken,
        config: &EngineConfig,
    ) -> Self {
        let started = Instant::now();
        let outputs = OutputStore::new(plan.steps().iter().map(|s| s.id().to_string()));
        Self {
            run_id,
            mode: plan.mode(),
            table: ExecutionTable::from_plan(&plan),
            outputs,
            recovery: RecoveryCoordinator::new(failures),
            invoker,
            emitter,
            running: JoinSet::new(),
            deferred: VecDeque::new(),
            cancel,
            max_concurrency: config.max_concurrency.unwrap_or(usize::MAX).max(1),
            max_attempts: config.max_attempts.max(1),
            plan_timeout_secs: config.plan_timeout_secs,
            deadline: config.plan_timeout().map(|limit| started + limit),
            abort: None,
            started,
        }
    }

    /// Drive the plan until every step settles or the run aborts.
    pub(crate) async fn run(mut self) -> PlanOutcome {
        tracing::info!(
            mode = %self.mode,
            steps = self.table.records().len(),
            "starting plan run"
        );

        loop {
            if let Err(e) = self.advance() {
                self.abort_with(format!("scheduler invariant violated: {e}"));
            }
            if self.abort.is_some() || self.table.all_settled() {
                break;
            }
            if self.running.is_empty() && !self.recovery.is_pending() {
                let stalled = SchedulerError::Stalled {
                    pending: self.table.unsettled_ids(),
                };
                self.abort_with(format!("scheduler invariant violated: {stalled}"));
                break;
            }

            let wake = tokio::select! {
                Some(joined) = self.running.join_next(), if !self.running.is_empty() => {
                    Wake::Completed(joined)
                }
                (step_id, decision) = self.recovery.next_decision(), if self.recovery.is_pending() => {
                    Wake::Decision(step_id, decision)
                }
                _ = self.cancel.cancelled() => Wake::Cancelled,
                _ = wait_for(self.deadline) => Wake::TimedOut,
            };

            let handled = match wake {
                Wake::Completed(Ok(completion)) => {
                    if self.recovery.is_pending() {
                        tracing::debug!(
                            step_id = completion.step_id.as_str(),
                            "deferring completion until the pending failure is decided"
                        );
                        self.deferred.push_back(completion);
                        Ok(())
                    } else {
                        self.apply_completion(completion)
                    }
                }
                Wake::Completed(Err(join_err)) => {
                    Err(SchedulerError::TaskFailed(join_err.to_string()))
                }
                Wake::Decision(step_id, decision) => self.apply_decision(&step_id, decision),
                Wake::Cancelled => {
                    self.abort_with("plan cancelled".to_string());
                    Ok(())
                }
                Wake::TimedOut => {
                    let secs = self.plan_timeout_secs.unwrap_or_default();
                    self.abort_with(format!("plan timed out after {secs}s"));
                    Ok(())
                }
            };
            if let Err(e) = handled {
                self.abort_with(format!("scheduler invariant violated: {e}"));
            }
        }

        self.finish().await
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    fn advance(&mut self) -> Result<(), SchedulerError> {
        while !self.recovery.is_pending() && self.abort.is_none() {
            let Some(completion) = self.deferred.pop_front() else {
                break;
            };
            self.apply_completion(completion)?;
        }
        if self.abort.is_some() {
            return Ok(());
        }

        for step_id in self.table.promote_ready() {
            tracing::debug!(step_id = step_id.as_str(), "step ready");
            self.emitter.emit(PlanEvent::StepReady {
                run_id: self.run_id,
                step_id,
            });
        }

        self.dispatch_ready()
    }

    fn dispatch_ready(&mut self) -> Result<(), SchedulerError> {
        let limit = match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Dag => self.max_concurrency,
        };

        while !self.recovery.is_pending() && self.abort.is_none() {
            if self.table.running_count() >= limit {
                break;
            }
            let Some(step_id) = self.table.first_ready().map(str::to_string) else {
                break;
            };
            self.dispatch(&step_id, None)?;
        }
        Ok(())
    }

    /// Start an attempt of `step_id`. With `reuse` the previous resolved
    /// input is sent again; otherwise the input is resolved now.
    fn dispatch(&mut self, step_id: &str, reuse: Option<Value>) -> Result<(), SchedulerError> {
        let skipped = if self.table.get(step_id)?.implicit_dependencies {
            Vec::new()
        } else {
            self.table.skipped_dependencies(step_id)?
        };
        let record = self.table.get_mut(step_id)?;
        record.attempts += 1;
        let definition = record.definition.clone();

        let input = match reuse {
            Some(input) => Ok(input),
            None => match skipped.first() {
                Some(dep) if !definition.tolerate_skipped => {
                    Err(ResolutionError::SkippedDependency {
                        step_id: dep.clone(),
                    })
                }
                _ => resolve_input(&definition.input, &self.outputs, definition.tolerate_skipped),
            },
        };

        match input {
            Ok(input) => self.start(step_id, input),
            Err(e) => self.fail_step(step_id, e.to_string(), FailureKind::Resolution),
        }
    }

    fn start(&mut self, step_id: &str, input: Value) -> Result<(), SchedulerError> {
        self.table.transition(step_id, StepStatus::Running)?;
        let record = self.table.get_mut(step_id)?;
        record.resolved_input = Some(input.clone());
        record.result = None;
        record.last_error = None;
        let attempt = record.attempts;
        let tool = record.definition.tool.clone();

        tracing::info!(step_id, tool = tool.as_str(), attempt, "step started");
        self.emitter.emit(PlanEvent::StepStart {
            run_id: self.run_id,
            step_id: step_id.to_string(),
            tool: tool.clone(),
            attempt,
            input: input.clone(),
        });

        let invoker = self.invoker.clone();
        let token = self.cancel.child_token();
        let id = step_id.to_string();
        self.running.spawn(async move {
            let started = std::time::Instant::now();
            let result = match AssertUnwindSafe(invoker.invoke(&tool, input, token))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => ToolResult::failed(
                    format!("tool panicked: {}", panic_message(panic.as_ref())),
                    started.elapsed().as_millis() as u64,
                ),
            };
            Completion { step_id: id, result }
        });
        Ok(())
    }

    fn apply_completion(&mut self, completion: Completion) -> Result<(), SchedulerError> {
        let Completion { step_id, result } = completion;
        let record = self.table.get_mut(&step_id)?;
        record.result = Some(result.clone());
        let tool = record.definition.tool.clone();
        let kind = record.definition.output_schema.schema_type;

        self.emitter.emit(PlanEvent::ToolResult {
            run_id: self.run_id,
            step_id: step_id.clone(),
            tool,
            result: result.clone(),
        });

        if !result.success {
            return self.fail_step(&step_id, result.error_message().to_string(), FailureKind::Tool);
        }

        self.table.transition(&step_id, StepStatus::Success)?;
        self.outputs
            .record_success(&step_id, kind, result.output.unwrap_or(Value::Null));
        tracing::info!(
            step_id = step_id.as_str(),
            duration_ms = result.duration_ms,
            "step succeeded"
        );
        self.emitter.emit(PlanEvent::StepSuccess {
            run_id: self.run_id,
            step_id,
            duration_ms: result.duration_ms,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Failure and recovery
    // -----------------------------------------------------------------------

    fn fail_step(&mut self, step_id: &str, error: String, kind: FailureKind) -> Result<(), SchedulerError> {
        self.table.transition(step_id, StepStatus::Error)?;
        let record = self.table.get_mut(step_id)?;
        record.last_error = Some(error.clone());
        if kind == FailureKind::Resolution {
            record.resolved_input = None;
        }

        let context = FailureContext {
            run_id: self.run_id,
            step_id: step_id.to_string(),
            tool: record.definition.tool.clone(),
            error: error.clone(),
            kind,
            attempt: record.attempts,
            input: record.resolved_input.clone(),
            definition: record.definition.clone(),
        };

        tracing::warn!(step_id, attempt = context.attempt, error = error.as_str(), "step failed");
        self.emitter.emit(PlanEvent::StepError {
            run_id: self.run_id,
            step_id: step_id.to_string(),
            error: error.clone(),
            kind,
        });

        self.recovery.open(context)?;
        self.emitter.emit(PlanEvent::RecoveryPending {
            run_id: self.run_id,
            step_id: step_id.to_string(),
            error,
        });
        Ok(())
    }

    fn apply_decision(&mut self, step_id: &str, decision: RecoveryDecision) -> Result<(), SchedulerError> {
        let status = self.table.status(step_id)?;
        if status != StepStatus::Error {
            return Err(SchedulerError::IllegalTransition {
                step_id: step_id.to_string(),
                from: status,
                to: StepStatus::Running,
            });
        }

        match decision {
            RecoveryDecision::Reject(reason) => {
                tracing::info!(step_id, reason = reason.as_str(), "failure rejected");
                self.abort_with(reason);
                Ok(())
            }
            RecoveryDecision::Resolve(RecoveryAction::Skip) => {
                self.table.transition(step_id, StepStatus::Skipped)?;
                self.outputs.record_skipped(step_id);
                tracing::info!(step_id, "step skipped");
                self.emitter.emit(PlanEvent::StepSkipped {
                    run_id: self.run_id,
                    step_id: step_id.to_string(),
                });
                Ok(())
            }
            RecoveryDecision::Resolve(RecoveryAction::Retry) => {
                if self.attempts_exhausted(step_id)? {
                    return Ok(());
                }
                let reuse = self.table.get(step_id)?.resolved_input.clone();
                tracing::info!(step_id, reuse_input = reuse.is_some(), "retrying step");
                self.dispatch(step_id, reuse)
            }
            RecoveryDecision::Resolve(RecoveryAction::Regenerate(replacement)) => {
                if self.attempts_exhausted(step_id)? {
                    return Ok(());
                }
                // A rejected replacement leaves the previous definition in
                // place, so a later retry runs the step as it was.
                if let Err(e) = validate_output_schema(step_id, &replacement.output_schema) {
                    self.table.get_mut(step_id)?.attempts += 1;
                    return self.fail_step(step_id, e.to_string(), FailureKind::Resolution);
                }

                let record = self.table.get_mut(step_id)?;
                record.definition.tool = replacement.tool;
                record.definition.input = replacement.input;
                record.definition.output_schema = replacement.output_schema;
                record.definition.reason = replacement.reason;
                record.definition.tolerate_skipped = replacement.tolerate_skipped;
                record.resolved_input = None;
                tracing::info!(
                    step_id,
                    tool = record.definition.tool.as_str(),
                    "step regenerated"
                );
                self.dispatch(step_id, None)
            }
        }
    }

    /// Abort the run if `step_id` may not be attempted again.
    fn attempts_exhausted(&mut self, step_id: &str) -> Result<bool, SchedulerError> {
        let record = self.table.get(step_id)?;
        if record.attempts < self.max_attempts {
            return Ok(false);
        }
        let reason = format!(
            "step '{step_id}' failed after {} attempts: {}",
            record.attempts,
            record.last_error.as_deref().unwrap_or("unknown error")
        );
        self.abort_with(reason);
        Ok(true)
    }

    fn abort_with(&mut self, reason: String) {
        if self.abort.is_none() {
            self.abort = Some(reason);
        }
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    async fn finish(mut self) -> PlanOutcome {
        let duration_ms = self.started.elapsed().as_millis() as u64;

        let (status, abort_reason) = match self.abort.take() {
            None => {
                let succeeded = self.table.count(StepStatus::Success);
                let skipped = self.table.count(StepStatus::Skipped);
                tracing::info!(duration_ms, succeeded, skipped, "plan complete");
                self.emitter.emit(PlanEvent::PlanComplete {
                    run_id: self.run_id,
                    duration_ms,
                    succeeded,
                    skipped,
                });
                (RunStatus::Completed, None)
            }
            Some(reason) => {
                self.cancel.cancel();
                self.running.shutdown().await;
                self.deferred.clear();

                let message = format!("aborted: {reason}");
                for step_id in self.table.unsettled_ids() {
                    if self.table.status(&step_id).ok() == Some(StepStatus::Error) {
                        continue;
                    }
                    if self.table.transition(&step_id, StepStatus::Error).is_err() {
                        continue;
                    }
                    if let Ok(record) = self.table.get_mut(&step_id) {
                        record.last_error = Some(message.clone());
                    }
                    self.emitter.emit(PlanEvent::StepError {
                        run_id: self.run_id,
                        step_id,
                        error: message.clone(),
                        kind: FailureKind::Aborted,
                    });
                }

                tracing::warn!(duration_ms, reason = reason.as_str(), "plan aborted");
                self.emitter.emit(PlanEvent::PlanAborted {
                    run_id: self.run_id,
                    reason: reason.clone(),
                });
                (RunStatus::Aborted, Some(reason))
            }
        };

        PlanOutcome {
            run_id: self.run_id,
            status,
            abort_reason,
            duration_ms,
            steps: self
                .table
                .into_records()
                .into_iter()
                .map(StepReport::from)
                .collect(),
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
