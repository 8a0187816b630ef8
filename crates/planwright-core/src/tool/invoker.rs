//! Tool invocation: registry lookup, timing, timeout, and cancellation.
//!
//! The invoker never fails: every outcome, including an unknown tool name,
//! is folded into a [`ToolResult`]. It performs no retries; retrying is a
//! recovery decision made above it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use planwright_types::error::ToolError;
use planwright_types::tool::ToolResult;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::ToolRegistry;

/// Invokes registered tools by name.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Bound every invocation by `timeout` (None = unbounded).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Invoke `tool_name` with an already-resolved input.
    pub async fn invoke(&self, tool_name: &str, input: Value, cancel: CancellationToken) -> ToolResult {
        let start = Instant::now();
        let outcome = self.try_invoke(tool_name, input, &cancel).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                tracing::debug!(tool = tool_name, duration_ms, "tool succeeded");
                ToolResult::succeeded(output, duration_ms)
            }
            Err(e) => {
                tracing::debug!(tool = tool_name, duration_ms, error = %e, "tool failed");
                ToolResult::failed(e.to_string(), duration_ms)
            }
        }
    }

    async fn try_invoke(
        &self,
        tool_name: &str,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        let run = tool.execute(input, cancel.clone());
        let bounded = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Err(ToolError::Timeout(limit.as_millis() as u64)),
                },
                None => run.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            result = bounded => result,
        }
    }
}
