//! Broadcast bus for plan lifecycle events.
//!
//! One bus is shared by every run started from a `PlanExecutor`. Subscribers
//! either take the raw stream of all runs or a [`RunEvents`] view scoped to a
//! single run that ends with that run's final event.

use planwright_types::event::PlanEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Multi-consumer bus for plan lifecycle events.
///
/// Cloning the bus clones the sender, so every clone publishes to the same
/// subscribers. Publishing with no subscribers drops the event.
pub struct EventBus {
    sender: broadcast::Sender<PlanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive all future events of every run.
    pub fn subscribe(&self) -> broadcast::Receiver<PlanEvent> {
        self.sender.subscribe()
    }

    /// Receive future events of `run_id` only.
    pub fn subscribe_run(&self, run_id: Uuid) -> RunEvents {
        RunEvents {
            run_id,
            receiver: self.sender.subscribe(),
            finished: false,
        }
    }

    pub fn publish(&self, event: PlanEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Events of a single run, in publication order.
///
/// A slow reader that falls behind the bus capacity loses the overwritten
/// events and keeps going; the loss is logged.
#[derive(Debug)]
pub struct RunEvents {
    run_id: Uuid,
    receiver: broadcast::Receiver<PlanEvent>,
    finished: bool,
}

impl RunEvents {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The next event of the run, or None after its final event.
    pub async fn next(&mut self) -> Option<PlanEvent> {
        while !self.finished {
            match self.receiver.recv().await {
                Ok(event) if event.run_id() == self.run_id => {
                    self.finished = event.is_final();
                    return Some(event);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(run_id = %self.run_id, missed, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => self.finished = true,
            }
        }
        None
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ready(step_id: &str) -> PlanEvent {
        PlanEvent::StepReady {
            run_id: Uuid::now_v7(),
            step_id: step_id.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ready("a"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.step_id(), Some("a"));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.publish(ready("a"));

        assert!(matches!(rx1.recv().await.unwrap(), PlanEvent::StepReady { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), PlanEvent::StepReady { .. }));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(ready("a"));
        bus.publish(ready("b"));
    }

    #[test]
    fn lagged_receiver_handles_gracefully() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        for i in 0..10 {
            bus.publish(ready(&format!("s{i}")));
        }

        match rx.try_recv() {
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert!(n > 0),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(ready("a"));

        assert!(rx.try_recv().is_ok());
    }

    fn complete(run_id: Uuid) -> PlanEvent {
        PlanEvent::PlanComplete {
            run_id,
            duration_ms: 1,
            succeeded: 1,
            skipped: 0,
        }
    }

    #[tokio::test]
    async fn run_subscription_filters_and_ends_at_final_event() {
        let bus = EventBus::new(16);
        let mine = Uuid::now_v7();
        let mut events = bus.subscribe_run(mine);

        bus.publish(ready("other"));
        bus.publish(PlanEvent::StepReady {
            run_id: mine,
            step_id: "a".to_string(),
        });
        bus.publish(complete(Uuid::now_v7()));
        bus.publish(complete(mine));
        bus.publish(PlanEvent::StepReady {
            run_id: mine,
            step_id: "late".to_string(),
        });

        assert_eq!(events.next().await.unwrap().step_id(), Some("a"));
        assert_eq!(events.next().await.unwrap().kind(), "plan-complete");
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn run_subscription_survives_lag() {
        let bus = EventBus::new(2);
        let run_id = Uuid::now_v7();
        let mut events = bus.subscribe_run(run_id);

        for i in 0..5 {
            bus.publish(PlanEvent::StepReady {
                run_id,
                step_id: format!("s{i}"),
            });
        }
        bus.publish(complete(run_id));

        let mut seen = Vec::new();
        while let Some(event) = events.next().await {
            seen.push(event.kind());
        }
        assert_eq!(seen.last(), Some(&"plan-complete"));
        assert!(seen.len() <= 2);
    }

    #[tokio::test]
    async fn run_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new(4);
        let mut events = bus.subscribe_run(Uuid::now_v7());
        drop(bus);
        assert!(events.next().await.is_none());
    }

    #[test]
    fn debug_impl() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let debug = format!("{bus:?}");
        assert!(debug.contains("EventBus"));
        assert!(debug.contains("receiver_count"));
    }
}
