//! Shared domain types for Planwright.
//!
//! This crate contains the types exchanged between the plan execution engine
//! and its collaborators: plan documents, step definitions, execution status,
//! tool results, lifecycle events, and engine configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod plan;
pub mod status;
pub mod tool;
