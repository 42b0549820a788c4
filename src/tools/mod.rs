//! Tool trait and registry
//!
//! Tools are thin data-access wrappers over domain services. They return a
//! JSON string and signal domain errors with `{"error": true, ...}` payloads
//! instead of failing.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod http;
pub mod payload;

pub use http::create_default_registry;
pub use payload::ToolPayload;

/// Schema of a tool as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait for a single callable tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn invoke(&self, args: &Value) -> Result<String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, so specs are advertised deterministically.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.spec())
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

/// Best-effort parse of a tool result. Anything that is not a JSON object or
/// array is wrapped as `{"raw": text}`.
pub fn parse_tool_output(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() || value.is_array() => value,
        _ => json!({ "raw": text }),
    }
}

/// Synthetic payload fed back to the model for an unregistered tool name.
pub fn unknown_tool_payload(name: &str) -> String {
    json!({
        "error": true,
        "message": format!("Unknown tool: {}", name),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the arguments"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(&self, args: &Value) -> Result<String> {
            Ok(args.to_string())
        }
    }

    #[test]
    fn test_parse_tool_output() {
        assert_eq!(parse_tool_output(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_tool_output("not json"), json!({"raw": "not json"}));
        assert_eq!(parse_tool_output("42"), json!({"raw": "42"}));
    }

    #[test]
    fn test_unknown_tool_payload() {
        let payload: Value = serde_json::from_str(&unknown_tool_payload("crystal_ball")).unwrap();
        assert_eq!(payload["error"], true);
        assert_eq!(payload["message"], "Unknown tool: crystal_ball");
    }

    #[tokio::test]
    async fn test_registry_lookup_and_specs() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert_eq!(registry.list(), vec!["echo"]);
        assert!(registry.get("missing").is_none());

        let tool = registry.get("echo").unwrap();
        let output = tool.invoke(&json!({"x": 1})).await.unwrap();
        assert_eq!(output, r#"{"x":1}"#);

        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].description, "Echo the arguments");
    }

    #[test]
    fn test_duplicate_registration_replaces_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list().len(), 1);
    }
}
