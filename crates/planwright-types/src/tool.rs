//! Normalized tool invocation result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single tool invocation.
///
/// Produced by the tool invoker whether the tool succeeded, failed, was not
/// found, or timed out. Exactly one of `output` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ToolResult {
    /// A successful result carrying the tool output.
    pub fn succeeded(output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
        }
    }

    /// A failed result carrying the error message.
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// The error message, or a placeholder for malformed failures.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown tool error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_camel_case() {
        let result = ToolResult::succeeded(json!({ "n": 1 }), 42);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["durationMs"], json!(42));
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["error"], Value::Null);
    }

    #[test]
    fn test_failed_result() {
        let result = ToolResult::failed("boom", 3);
        assert!(!result.success);
        assert!(result.output.is_none());
        assert_eq!(result.error_message(), "boom");
    }
}
