//! Tool abstraction: the trait tools implement, its object-safe wrapper, a
//! name-indexed registry, and the invoker the scheduler calls.
//!
//! `Tool` uses RPITIT, so it cannot be a trait object directly:
//! 1. `ToolDyn` is an object-safe mirror with boxed futures
//! 2. a blanket impl covers every `T: Tool`
//! 3. `BoxTool` wraps `Box<dyn ToolDyn>` and delegates

pub mod invoker;
pub mod registry;

use std::future::Future;
use std::pin::Pin;

use planwright_types::error::ToolError;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub use invoker::ToolInvoker;
pub use registry::{ToolDescriptor, ToolRegistry};

/// A named capability a plan step can invoke.
pub trait Tool: Send + Sync {
    /// Registry name, matched against `StepDefinition::tool`.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// JSON schema of the arguments. Informational.
    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// JSON schema of the output. Informational.
    fn output_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    /// Run the tool.
    ///
    /// Long-running tools should watch `cancel` and return
    /// `ToolError::Cancelled` promptly once it fires.
    fn execute(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with a boxed future.
pub trait ToolDyn: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    fn output_schema(&self) -> Value;

    fn execute_boxed<'a>(
        &'a self,
        args: Value,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

impl<T: Tool> ToolDyn for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn input_schema(&self) -> Value {
        Tool::input_schema(self)
    }

    fn output_schema(&self) -> Value {
        Tool::output_schema(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        args: Value,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(args, cancel))
    }
}

/// Type-erased tool for storage in a [`ToolRegistry`].
pub struct BoxTool {
    inner: Box<dyn ToolDyn>,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            inner: Box::new(tool),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn input_schema(&self) -> Value {
        self.inner.input_schema()
    }

    pub fn output_schema(&self) -> Value {
        self.inner.output_schema()
    }

    pub async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        self.inner.execute_boxed(args, cancel).await
    }
}

impl std::fmt::Debug for BoxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTool").field("name", &self.name()).finish()
    }
}

/// A tool backed by an async closure.
///
/// ```ignore
/// let echo = FnTool::new("echo", |args, _cancel| async move { Ok(args) })
///     .with_description("returns its arguments");
/// ```
pub struct FnTool<F> {
    name: String,
    description: String,
    func: F,
}

impl<F> FnTool<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            func,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(Value, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn execute(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Value, ToolError>> + Send {
        (self.func)(args, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "uppercases the 'text' argument"
        }

        async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidInput("missing 'text'".to_string()))?;
            Ok(json!({ "text": text.to_uppercase() }))
        }
    }

    #[tokio::test]
    async fn test_box_tool_delegates() {
        let tool = BoxTool::new(Upper);
        assert_eq!(tool.name(), "upper");
        assert!(tool.description().contains("uppercases"));
        assert_eq!(tool.input_schema(), json!({ "type": "object" }));

        let out = tool
            .execute(json!({ "text": "hi" }), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!({ "text": "HI" }));

        let err = tool.execute(json!({}), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_fn_tool() {
        let tool = BoxTool::new(
            FnTool::new("double", |args: Value, _cancel: CancellationToken| async move {
                let n = args["n"].as_i64().unwrap_or(0);
                Ok::<_, ToolError>(json!({ "n": n * 2 }))
            })
            .with_description("doubles n"),
        );
        assert_eq!(tool.name(), "double");
        assert_eq!(tool.description(), "doubles n");
        let out = tool.execute(json!({ "n": 21 }), CancellationToken::new()).await.unwrap();
        assert_eq!(out, json!({ "n": 42 }));
    }
}
