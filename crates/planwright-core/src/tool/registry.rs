//! Tool registry for runtime tool lookup.
//!
//! A simple name-indexed registry of boxed tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::{BoxTool, Tool};

/// Registry of available tools, indexed by name.
///
/// Tools are stored behind `Arc` so invocations can run on spawned tasks
/// without borrowing the registry.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<BoxTool>>,
}

/// Listing entry for a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool under its own name.
    ///
    /// If a tool with this name already exists, it is replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(BoxTool::new(tool));
    }

    pub fn register_boxed(&mut self, tool: BoxTool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::debug!(tool = %name, "replaced registered tool");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<BoxTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors for all registered tools, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.list_names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
                output_schema: tool.output_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
