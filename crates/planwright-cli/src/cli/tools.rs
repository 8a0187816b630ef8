//! Built-in demo tools and the `tools` command.
//!
//! | tool    | input                                   | output                  |
//! |---------|-----------------------------------------|-------------------------|
//! | `echo`  | any object                              | the input, unchanged    |
//! | `sleep` | `{"ms": u64}`                           | `{"slept_ms": u64}`     |
//! | `fail`  | `{"message"?: string}`                  | always fails            |
//! | `flaky` | `{"failures"?: u32, "key"?: string}`    | fails N times per key   |
//! | `wrap`  | `{"value": any, "field"?: string}`      | `{field: value}`        |

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use planwright_core::tool::{Tool, ToolRegistry};
use planwright_types::error::ToolError;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Registry holding every built-in tool.
pub fn builtin_registry() -> Arc<ToolRegistry> {
    Arc::new(
        ToolRegistry::new()
            .with(Echo)
            .with(Sleep)
            .with(Fail)
            .with(Flaky::default())
            .with(Wrap),
    )
}

/// Handle `planwright tools`.
pub fn list_tools(json: bool) -> Result<()> {
    let registry = builtin_registry();
    let descriptors = registry.descriptors();

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Tool").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Input").fg(Color::White),
    ]);
    for tool in &descriptors {
        table.add_row(vec![
            Cell::new(&tool.name).fg(Color::Cyan),
            Cell::new(&tool.description),
            Cell::new(tool.input_schema.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("  {} Built-in tools", style("*").cyan().bold());
    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

pub struct Echo;

impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns its input unchanged"
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        Ok(args)
    }
}

// ---------------------------------------------------------------------------
// sleep
// ---------------------------------------------------------------------------

pub struct Sleep;

impl Tool for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Waits for `ms` milliseconds"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "ms": { "type": "integer" } },
            "required": ["ms"],
        })
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolError> {
        let ms = args
            .get("ms")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::InvalidInput("'ms' must be a non-negative integer".into()))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(ToolError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!({ "slept_ms": ms })),
        }
    }
}

// ---------------------------------------------------------------------------
// fail
// ---------------------------------------------------------------------------

pub struct Fail;

impl Tool for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails with `message`"
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(ToolError::failed(message))
    }
}

// ---------------------------------------------------------------------------
// flaky
// ---------------------------------------------------------------------------

/// Fails the first `failures` calls (default 1) for each `key`, then echoes.
#[derive(Default)]
pub struct Flaky {
    calls: Mutex<HashMap<String, u32>>,
}

impl Flaky {
    fn record_call(&self, key: &str) -> u32 {
        let mut calls = self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = calls.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

impl Tool for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn description(&self) -> &str {
        "Fails the first `failures` calls per `key`, then returns its input"
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let failures = args.get("failures").and_then(Value::as_u64).unwrap_or(1);
        let key = args.get("key").and_then(Value::as_str).unwrap_or("default");

        let call = self.record_call(key);
        if u64::from(call) <= failures {
            return Err(ToolError::failed(format!(
                "flaky failure {call} of {failures} for key '{key}'"
            )));
        }
        Ok(args)
    }
}

// ---------------------------------------------------------------------------
// wrap
// ---------------------------------------------------------------------------

/// Wraps an arbitrary value in a named object field.
pub struct Wrap;

impl Tool for Wrap {
    fn name(&self) -> &str {
        "wrap"
    }

    fn description(&self) -> &str {
        "Returns `value` under the property named by `field` (default \"value\")"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "value": {},
                "field": { "type": "string" },
            },
            "required": ["value"],
        })
    }

    async fn execute(&self, args: Value, _cancel: CancellationToken) -> Result<Value, ToolError> {
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| ToolError::InvalidInput("missing 'value'".into()))?;
        let field = args.get("field").and_then(Value::as_str).unwrap_or("value");

        let mut out = serde_json::Map::new();
        out.insert(field.to_string(), value);
        Ok(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry();
        assert_eq!(
            registry.list_names(),
            vec!["echo", "fail", "flaky", "sleep", "wrap"]
        );
    }

    #[tokio::test]
    async fn test_echo_and_wrap() {
        let out = Echo
            .execute(json!({"a": 1}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!({"a": 1}));

        let out = Wrap
            .execute(json!({"value": [1, 2], "field": "items"}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!({"items": [1, 2]}));

        let err = Wrap.execute(json!({}), CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_fail_uses_message() {
        let err = Fail
            .execute(json!({"message": "nope"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::failed("nope"));
    }

    #[tokio::test]
    async fn test_flaky_fails_then_succeeds_per_key() {
        let flaky = Flaky::default();
        let args = json!({"failures": 2, "key": "x"});

        assert!(flaky.execute(args.clone(), CancellationToken::new()).await.is_err());
        assert!(flaky.execute(args.clone(), CancellationToken::new()).await.is_err());
        assert_eq!(
            flaky.execute(args.clone(), CancellationToken::new()).await.unwrap(),
            args
        );

        // Other keys count separately
        assert!(flaky
            .execute(json!({"key": "y"}), CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_sleep_cancel_and_bad_input() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Sleep.execute(json!({"ms": 10_000}), cancel).await.unwrap_err();
        assert_eq!(err, ToolError::Cancelled);

        let err = Sleep
            .execute(json!({"ms": "soon"}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));

        let out = Sleep
            .execute(json!({"ms": 1}), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!({"slept_ms": 1}));
    }
}
