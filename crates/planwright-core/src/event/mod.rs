//! Lifecycle event delivery.
//!
//! Two channels carry every `PlanEvent`:
//! - `EventBus` -- a `tokio::sync::broadcast` channel for async subscribers,
//!   optionally scoped to one run through `RunEvents`
//! - `ExecutionObserver` -- synchronous callbacks invoked in emission order
//!
//! Neither can stall or fail the scheduler: lagging receivers drop events and
//! panicking observers are logged and ignored.

pub mod bus;
pub mod observer;

pub use bus::{EventBus, RunEvents};
pub use observer::{EventEmitter, ExecutionObserver};
