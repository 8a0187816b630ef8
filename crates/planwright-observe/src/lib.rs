//! Observability setup for Planwright binaries.

pub mod tracing_setup;
