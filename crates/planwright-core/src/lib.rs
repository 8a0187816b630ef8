//! Plan execution engine for Planwright.
//!
//! Takes a plan document (tool-invocation steps connected by data
//! dependencies), validates it, and drives every step to a terminal state:
//!
//! - `plan` -- parsing, validation, dependency graph analysis
//! - `template` -- `{{ step.field }}` parsing and resolution against step outputs
//! - `tool` -- tool trait, registry, and invoker
//! - `event` -- lifecycle event bus and observers
//! - `engine` -- scheduler, failure recovery, and the executor API
//!
//! The engine never decides which tools exist and never renders anything:
//! tools come from a [`tool::ToolRegistry`], decisions about failures come from
//! whoever holds the [`engine::PlanRun`].

pub mod engine;
pub mod event;
pub mod plan;
pub mod template;
pub mod tool;
