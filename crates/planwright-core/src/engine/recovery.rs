//! Failure recovery: pending failures, decisions, and automatic policies.
//!
//! When a step enters the error state the scheduler opens the run's single
//! pending-failure slot and sends a [`PendingFailure`] to whoever drives the
//! run. Dispatch stays paused until that value is resolved (or dropped, which
//! counts as a rejection).

use std::future::Future;

use planwright_types::event::FailureKind;
use planwright_types::plan::StepDefinition;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::state::SchedulerError;

/// Reason used when a pending failure is dropped without a decision.
pub const ABANDONED_REASON: &str = "recovery decision abandoned";

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// How to continue after a step failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Re-run the step with the identical resolved input.
    Retry,
    /// Replace tool, input, output schema, and reason with those of the given
    /// step, keep the original ID and dependencies, then run it.
    Regenerate(StepDefinition),
    /// Mark the step skipped and continue.
    Skip,
}

/// The answer to a [`PendingFailure`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    Resolve(RecoveryAction),
    /// Abort the whole plan with the given reason.
    Reject(String),
}

/// Everything known about a failed step when recovery opens.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub run_id: Uuid,
    pub step_id: String,
    pub tool: String,
    pub error: String,
    pub kind: FailureKind,
    /// 1-based attempt that failed.
    pub attempt: u32,
    /// Input the tool was called with; None if resolution itself failed.
    pub input: Option<Value>,
    /// The step as it was last dispatched.
    pub definition: StepDefinition,
}

/// A failure awaiting a decision.
///
/// Resolving consumes the value, so each failure is decided at most once.
/// Dropping it undecided rejects the plan.
#[derive(Debug)]
pub struct PendingFailure {
    context: FailureContext,
    responder: oneshot::Sender<RecoveryDecision>,
}

impl PendingFailure {
    pub fn context(&self) -> &FailureContext {
        &self.context
    }

    pub fn step_id(&self) -> &str {
        &self.context.step_id
    }

    pub fn error(&self) -> &str {
        &self.context.error
    }

    pub fn decide(self, decision: RecoveryDecision) {
        if self.responder.send(decision).is_err() {
            tracing::debug!(
                step_id = self.context.step_id.as_str(),
                "recovery decision arrived after the run ended"
            );
        }
    }

    pub fn resolve(self, action: RecoveryAction) {
        self.decide(RecoveryDecision::Resolve(action));
    }

    pub fn reject(self, reason: impl Into<String>) {
        self.decide(RecoveryDecision::Reject(reason.into()));
    }

    pub fn retry(self) {
        self.resolve(RecoveryAction::Retry);
    }

    pub fn skip(self) {
        self.resolve(RecoveryAction::Skip);
    }

    pub fn regenerate(self, replacement: StepDefinition) {
        self.resolve(RecoveryAction::Regenerate(replacement));
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Automatic decision-maker for pending failures.
pub trait RecoveryPolicy: Send + Sync {
    fn decide(&self, failure: &FailureContext) -> impl Future<Output = RecoveryDecision> + Send;
}

/// Reject every failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFailure;

impl RecoveryPolicy for AbortOnFailure {
    async fn decide(&self, failure: &FailureContext) -> RecoveryDecision {
        RecoveryDecision::Reject(format!("step '{}' failed: {}", failure.step_id, failure.error))
    }
}

/// Skip every failed step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipOnFailure;

impl RecoveryPolicy for SkipOnFailure {
    async fn decide(&self, _failure: &FailureContext) -> RecoveryDecision {
        RecoveryDecision::Resolve(RecoveryAction::Skip)
    }
}

/// Retry a failed step up to `max_retries` times, then skip it.
#[derive(Debug, Clone, Copy)]
pub struct RetryThenSkip {
    pub max_retries: u32,
}

impl RecoveryPolicy for RetryThenSkip {
    async fn decide(&self, failure: &FailureContext) -> RecoveryDecision {
        if failure.attempt <= self.max_retries {
            RecoveryDecision::Resolve(RecoveryAction::Retry)
        } else {
            RecoveryDecision::Resolve(RecoveryAction::Skip)
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator (scheduler side)
// ---------------------------------------------------------------------------

struct PendingSlot {
    step_id: String,
    decision: oneshot::Receiver<RecoveryDecision>,
}

/// Holds the run's single pending-failure slot.
pub(crate) struct RecoveryCoordinator {
    slot: Option<PendingSlot>,
    outbox: mpsc::UnboundedSender<PendingFailure>,
}

impl RecoveryCoordinator {
    pub(crate) fn new(outbox: mpsc::UnboundedSender<PendingFailure>) -> Self {
        Self { slot: None, outbox }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub(crate) fn pending_step(&self) -> Option<&str> {
        self.slot.as_ref().map(|s| s.step_id.as_str())
    }

    /// Open the slot for a new failure and hand it to the decision-maker.
    ///
    /// If nobody is listening the failure is dropped on the spot, which the
    /// next [`next_decision`](Self::next_decision) reports as abandoned.
    pub(crate) fn open(&mut self, context: FailureContext) -> Result<(), SchedulerError> {
        if let Some(slot) = &self.slot {
            return Err(SchedulerError::SecondPendingFailure {
                outstanding: slot.step_id.clone(),
                attempted: context.step_id,
            });
        }

        let (responder, decision) = oneshot::channel();
        let step_id = context.step_id.clone();
        if self.outbox.send(PendingFailure { context, responder }).is_err() {
            tracing::debug!(step_id = step_id.as_str(), "no decision-maker attached");
        }
        self.slot = Some(PendingSlot { step_id, decision });
        Ok(())
    }

    /// Wait for the decision on the open slot and clear it.
    ///
    /// Never completes while no failure is pending.
    pub(crate) async fn next_decision(&mut self) -> (String, RecoveryDecision) {
        let Some(slot) = self.slot.as_mut() else {
            return std::future::pending().await;
        };
        let decision = (&mut slot.decision)
            .await
            .unwrap_or_else(|_| RecoveryDecision::Reject(ABANDONED_REASON.to_string()));
        let step_id = self
            .slot
            .take()
            .map(|s| s.step_id)
            .unwrap_or_default();
        (step_id, decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn failure(step_id: &str, attempt: u32) -> FailureContext {
        FailureContext {
            run_id: Uuid::now_v7(),
            step_id: step_id.to_string(),
            tool: "flaky".to_string(),
            error: "boom".to_string(),
            kind: FailureKind::Tool,
            attempt,
            input: Some(json!({})),
            definition: StepDefinition::new(step_id, "flaky", json!({})),
        }
    }

    #[tokio::test]
    async fn test_decision_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = RecoveryCoordinator::new(tx);
        coordinator.open(failure("a", 1)).unwrap();
        assert_eq!(coordinator.pending_step(), Some("a"));

        let pending = rx.recv().await.unwrap();
        assert_eq!(pending.step_id(), "a");
        assert_eq!(pending.error(), "boom");
        pending.retry();

        let (step_id, decision) = coordinator.next_decision().await;
        assert_eq!(step_id, "a");
        assert_eq!(decision, RecoveryDecision::Resolve(RecoveryAction::Retry));
        assert!(!coordinator.is_pending());
    }

    #[tokio::test]
    async fn test_second_pending_failure_is_invariant_violation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut coordinator = RecoveryCoordinator::new(tx);
        coordinator.open(failure("a", 1)).unwrap();

        let err = coordinator.open(failure("b", 1)).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::SecondPendingFailure {
                outstanding: "a".to_string(),
                attempted: "b".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_failure_rejects() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coordinator = RecoveryCoordinator::new(tx);
        coordinator.open(failure("a", 1)).unwrap();
        drop(rx.recv().await.unwrap());

        let (_, decision) = coordinator.next_decision().await;
        assert_eq!(decision, RecoveryDecision::Reject(ABANDONED_REASON.to_string()));
    }

    #[tokio::test]
    async fn test_no_listener_rejects() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut coordinator = RecoveryCoordinator::new(tx);
        coordinator.open(failure("a", 1)).unwrap();

        let (_, decision) = coordinator.next_decision().await;
        assert!(matches!(decision, RecoveryDecision::Reject(_)));
    }

    #[tokio::test]
    async fn test_builtin_policies() {
        let first = failure("a", 1);
        let third = failure("a", 3);

        assert!(matches!(
            AbortOnFailure.decide(&first).await,
            RecoveryDecision::Reject(reason) if reason == "step 'a' failed: boom"
        ));
        assert_eq!(
            SkipOnFailure.decide(&first).await,
            RecoveryDecision::Resolve(RecoveryAction::Skip)
        );

        let policy = RetryThenSkip { max_retries: 2 };
        assert_eq!(
            policy.decide(&first).await,
            RecoveryDecision::Resolve(RecoveryAction::Retry)
        );
        assert_eq!(
            policy.decide(&third).await,
            RecoveryDecision::Resolve(RecoveryAction::Skip)
        );
    }
}
