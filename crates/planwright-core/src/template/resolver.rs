//! Template resolution against recorded step outputs.
//!
//! Resolution is a pure function of the step input and the [`OutputStore`].
//! How a reference resolves depends on the declared output type of the step
//! it points at:
//!
//! - object output: `{{s}}` is the whole object, `{{s.field}}` walks into it
//! - direct array/scalar output: only `{{s}}` is allowed
//!
//! Outputs are referenced directly, never through a wrapper, so an `output`
//! segment followed by further segments (`{{s.output.x}}`) is rejected. A
//! trailing `{{s.output}}` selects a real field named `output`.

use std::collections::HashMap;

use planwright_types::plan::SchemaType;
use serde_json::Value;

use super::ResolutionError;
use super::parser::{FieldAccess, Segment, parse};

// ---------------------------------------------------------------------------
// OutputStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Succeeded { kind: SchemaType, value: Value },
    Skipped,
}

/// Outputs of finished steps, keyed by step ID.
///
/// Every step of the plan has a slot; steps that have not succeeded (or been
/// skipped) yet are pending.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    slots: HashMap<String, Slot>,
}

impl OutputStore {
    pub fn new<I, S>(step_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: step_ids
                .into_iter()
                .map(|id| (id.into(), Slot::Pending))
                .collect(),
        }
    }

    /// Record the output of a successful step along with its declared type.
    pub fn record_success(&mut self, step_id: &str, kind: SchemaType, value: Value) {
        self.slots
            .insert(step_id.to_string(), Slot::Succeeded { kind, value });
    }

    pub fn record_skipped(&mut self, step_id: &str) {
        self.slots.insert(step_id.to_string(), Slot::Skipped);
    }

    fn lookup(&self, access: &FieldAccess, tolerate_skipped: bool) -> Result<Value, ResolutionError> {
        let parents = access.path.split_last().map_or(&[][..], |(_, rest)| rest);
        if parents.iter().any(|segment| segment == "output") {
            return Err(ResolutionError::OutputWrapperSegment {
                expression: access.to_string(),
            });
        }

        let (kind, value) = match self.slots.get(&access.step_id) {
            None => return Err(ResolutionError::UnknownStep(access.step_id.clone())),
            Some(Slot::Pending) => {
                return Err(ResolutionError::StepNotSucceeded {
                    step_id: access.step_id.clone(),
                });
            }
            Some(Slot::Skipped) if tolerate_skipped => return Ok(Value::Null),
            Some(Slot::Skipped) => {
                return Err(ResolutionError::SkippedDependency {
                    step_id: access.step_id.clone(),
                });
            }
            Some(Slot::Succeeded { kind, value }) => (*kind, value),
        };

        if access.path.is_empty() {
            return Ok(value.clone());
        }
        if kind != SchemaType::Object {
            return Err(ResolutionError::FieldOnDirectOutput {
                step_id: access.step_id.clone(),
                path: access.path.join("."),
            });
        }

        let mut current = value;
        for (depth, segment) in access.path.iter().enumerate() {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| ResolutionError::MissingField {
                step_id: access.step_id.clone(),
                path: access.path[..=depth].join("."),
            })?;
        }
        Ok(current.clone())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve every template in a step input.
///
/// Walks nested objects and arrays; only string leaves are templated (object
/// keys are not). A string that is exactly one expression becomes the
/// referenced value with its JSON type intact. Expressions embedded in text
/// are rendered as strings.
///
/// With `tolerate_skipped`, references to skipped steps resolve to `null`
/// instead of failing.
pub fn resolve_input(
    input: &Value,
    store: &OutputStore,
    tolerate_skipped: bool,
) -> Result<Value, ResolutionError> {
    match input {
        Value::String(s) => resolve_string(s, store, tolerate_skipped),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_input(item, store, tolerate_skipped))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_input(value, store, tolerate_skipped)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve a single template string, e.g. `"{{ search.results }}"`.
pub fn resolve_expression(source: &str, store: &OutputStore) -> Result<Value, ResolutionError> {
    resolve_string(source, store, false)
}

fn resolve_string(
    source: &str,
    store: &OutputStore,
    tolerate_skipped: bool,
) -> Result<Value, ResolutionError> {
    let template = parse(source)?;
    if template.is_literal() {
        return Ok(Value::String(source.to_string()));
    }
    if let Some(access) = template.single_expression() {
        return store.lookup(access, tolerate_skipped);
    }

    let mut rendered = String::with_capacity(source.len());
    for segment in template.segments() {
        match segment {
            Segment::Literal(text) => rendered.push_str(text),
            Segment::Expr(access) => {
                rendered.push_str(&value_to_string(&store.lookup(access, tolerate_skipped)?))
            }
        }
    }
    Ok(Value::String(rendered))
}

/// Render a JSON value for interpolation into text.
///
/// Strings are inserted without quotes; everything else as compact JSON.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> OutputStore {
        let mut store = OutputStore::new(["search", "count", "list", "later", "gone"]);
        store.record_success(
            "search",
            SchemaType::Object,
            json!({ "results": [{ "title": "Rust" }, { "title": "Tokio" }], "query": "async" }),
        );
        store.record_success("count", SchemaType::Object, json!({ "n": 3 }));
        store.record_success("list", SchemaType::Array, json!(["x", "y"]));
        store.record_skipped("gone");
        store
    }

    // -----------------------------------------------------------------------
    // Object outputs
    // -----------------------------------------------------------------------

    #[test]
    fn test_object_field_resolves_to_value() {
        let value = resolve_expression("{{search.results}}", &store()).unwrap();
        assert_eq!(value, json!([{ "title": "Rust" }, { "title": "Tokio" }]));
    }

    #[test]
    fn test_whole_object_reference() {
        let value = resolve_expression("{{ count }}", &store()).unwrap();
        assert_eq!(value, json!({ "n": 3 }));
    }

    #[test]
    fn test_type_preserved_for_single_expression() {
        let value = resolve_expression("{{count.n}}", &store()).unwrap();
        assert_eq!(value, json!(3));
    }

    #[test]
    fn test_array_index_segment() {
        let value = resolve_expression("{{search.results.1.title}}", &store()).unwrap();
        assert_eq!(value, json!("Tokio"));
    }

    #[test]
    fn test_missing_field() {
        let err = resolve_expression("{{search.results.5}}", &store()).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingField {
                step_id: "search".to_string(),
                path: "results.5".to_string(),
            }
        );
    }

    #[test]
    fn test_output_wrapper_segment_rejected() {
        let err = resolve_expression("{{search.output.results}}", &store()).unwrap_err();
        assert!(matches!(err, ResolutionError::OutputWrapperSegment { .. }));
        assert!(err.to_string().contains("{{step.field}}"));
    }

    #[test]
    fn test_trailing_output_segment_is_a_field() {
        let mut store = store();
        store.record_success("render", SchemaType::Object, json!({ "output": "<p>hi</p>" }));

        let value = resolve_expression("{{render.output}}", &store).unwrap();
        assert_eq!(value, json!("<p>hi</p>"));

        let err = resolve_expression("{{render.output.html}}", &store).unwrap_err();
        assert!(matches!(err, ResolutionError::OutputWrapperSegment { .. }));
    }

    // -----------------------------------------------------------------------
    // Direct (legacy) outputs
    // -----------------------------------------------------------------------

    #[test]
    fn test_direct_array_whole_reference() {
        let value = resolve_expression("{{list}}", &store()).unwrap();
        assert_eq!(value, json!(["x", "y"]));
    }

    #[test]
    fn test_direct_array_field_rejected() {
        let err = resolve_expression("{{list.results}}", &store()).unwrap_err();
        assert!(matches!(err, ResolutionError::FieldOnDirectOutput { .. }));
    }

    // -----------------------------------------------------------------------
    // Step state
    // -----------------------------------------------------------------------

    #[test]
    fn test_unknown_step() {
        let err = resolve_expression("{{nope.x}}", &store()).unwrap_err();
        assert_eq!(err, ResolutionError::UnknownStep("nope".to_string()));
    }

    #[test]
    fn test_step_not_succeeded() {
        let err = resolve_expression("{{later.x}}", &store()).unwrap_err();
        assert!(matches!(err, ResolutionError::StepNotSucceeded { .. }));
    }

    #[test]
    fn test_skipped_reference_fails_unless_tolerated() {
        let store = store();
        let input = json!({ "value": "{{gone.x}}" });

        let err = resolve_input(&input, &store, false).unwrap_err();
        assert!(matches!(err, ResolutionError::SkippedDependency { .. }));

        let value = resolve_input(&input, &store, true).unwrap();
        assert_eq!(value, json!({ "value": null }));
    }

    // -----------------------------------------------------------------------
    // Whole inputs
    // -----------------------------------------------------------------------

    #[test]
    fn test_nested_input_resolution() {
        let input = json!({
            "query": "{{search.query}}",
            "first": ["{{search.results.0}}", 7, true],
            "meta": { "summary": "{{count.n}} results for {{search.query}}" },
            "{{not.a.template}}": "keys are left alone"
        });
        let value = resolve_input(&input, &store(), false).unwrap();
        assert_eq!(
            value,
            json!({
                "query": "async",
                "first": [{ "title": "Rust" }, 7, true],
                "meta": { "summary": "3 results for async" },
                "{{not.a.template}}": "keys are left alone"
            })
        );
    }

    #[test]
    fn test_embedded_object_renders_as_json() {
        let value = resolve_expression("got {{count}}", &store()).unwrap();
        assert_eq!(value, json!("got {\"n\":3}"));
    }

    #[test]
    fn test_literal_input_unchanged() {
        let input = json!({ "text": "no templates here", "n": 1 });
        assert_eq!(resolve_input(&input, &OutputStore::default(), false).unwrap(), input);
    }

    #[test]
    fn test_syntax_error_propagates() {
        let err = resolve_input(&json!({ "x": "{{ broken" }), &store(), false).unwrap_err();
        assert!(matches!(err, ResolutionError::Syntax(_)));
    }
}
