//! Engine configuration types for Planwright.
//!
//! `EngineConfig` represents the `config.toml` that controls concurrency,
//! timeouts, and recovery limits. All fields have sensible defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the plan execution engine.
///
/// Loaded from `~/.planwright/config.toml` by the CLI; library users build it
/// directly or take `EngineConfig::default()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of steps running at once in DAG mode (None = unbounded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Per-invocation tool timeout in seconds (None = no timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    /// Whole-plan timeout in seconds (None = no timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_timeout_secs: Option<u64>,

    /// Maximum attempts per step, counting the first run plus every retry or
    /// regeneration. Exceeding it aborts the plan.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Capacity of the broadcast event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            step_timeout_secs: None,
            plan_timeout_secs: None,
            max_attempts: default_max_attempts(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    /// Per-invocation timeout as a `Duration`.
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    /// Whole-plan timeout as a `Duration`.
    pub fn plan_timeout(&self) -> Option<Duration> {
        self.plan_timeout_secs.map(Duration::from_secs)
    }
}
