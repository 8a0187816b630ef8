use thiserror::Error;

/// Errors raised by tool implementations and the tool invoker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool not found: '{0}'")]
    NotFound(String),

    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool timed out after {0} ms")]
    Timeout(u64),

    #[error("tool invocation cancelled")]
    Cancelled,
}

impl ToolError {
    /// Shorthand for `ToolError::ExecutionFailed`.
    pub fn failed(message: impl Into<String>) -> Self {
        ToolError::ExecutionFailed(message.into())
    }
}
