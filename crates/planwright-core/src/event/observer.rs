//! Synchronous execution observers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use planwright_types::event::PlanEvent;

use super::EventBus;

/// Receives every lifecycle event of a run, in emission order.
///
/// Called inline on the scheduler task, so implementations should return
/// quickly. Panics are caught and logged.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &PlanEvent);
}

impl<F> ExecutionObserver for F
where
    F: Fn(&PlanEvent) + Send + Sync,
{
    fn on_event(&self, event: &PlanEvent) {
        self(event)
    }
}

/// Fans events out to observers and the broadcast bus.
#[derive(Clone)]
pub struct EventEmitter {
    bus: EventBus,
    observers: Vec<Arc<dyn ExecutionObserver>>,
}

impl EventEmitter {
    pub fn new(bus: EventBus, observers: Vec<Arc<dyn ExecutionObserver>>) -> Self {
        Self { bus, observers }
    }

    /// Deliver `event` to every observer, then publish it on the bus.
    pub fn emit(&self, event: PlanEvent) {
        for observer in &self.observers {
            let delivered = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
            if delivered.is_err() {
                tracing::warn!(event = event.kind(), "execution observer panicked; ignoring");
            }
        }
        self.bus.publish(event);
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("bus", &self.bus)
            .field("observers", &self.observers.len())
            .finish()
    }
}
