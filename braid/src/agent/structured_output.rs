//! Structured output: a schema elevated into a synthetic tool.
//!
//! The loop registers the tool before the first model call and deregisters it
//! on every terminal path. When the model never opts into tool use, the
//! context forces the next call (`tool_choice`) at most once.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::model::ToolChoice;
use crate::tools::{tool, SchemaTool, ToolDef, ToolRegistry};

pub const DEFAULT_STRUCTURED_OUTPUT_PROMPT: &str =
    "You must format the previous response as structured output.";

/// Consumer-facing configuration attached to an invocation.
#[derive(Clone, Debug)]
pub struct StructuredOutputConfig {
    /// JSON Schema of the expected value. The root `title` names the
    /// synthetic tool unless `expected_tool_name` overrides it.
    pub schema: Value,
    pub expected_tool_name: Option<String>,
    /// Coercion prompt appended when forcing; defaults to
    /// [`DEFAULT_STRUCTURED_OUTPUT_PROMPT`].
    pub prompt: Option<String>,
    /// Tool choice used when forcing; defaults to `Any`.
    pub forced_choice: Option<ToolChoice>,
}

impl StructuredOutputConfig {
    pub fn from_schema(schema: Value) -> Self {
        Self {
            schema,
            expected_tool_name: None,
            prompt: None,
            forced_choice: None,
        }
    }
}

/// Loop-internal state for one structured-output invocation.
pub struct StructuredOutputContext {
    tool_name: String,
    tool: Arc<SchemaTool>,
    prompt: String,
    forced_choice: ToolChoice,
    force_attempted: bool,
    captured: HashMap<String, Value>,
}

impl StructuredOutputContext {
    pub fn new(config: StructuredOutputConfig) -> Result<Self, Error> {
        let tool_name = match config.expected_tool_name {
            Some(name) => name,
            None => config
                .schema
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::StructuredOutput(
                        "schema has no root title and no tool name was given".into(),
                    )
                })?,
        };
        let tool = tool(
            ToolDef {
                name: tool_name.clone(),
                description: Some("Produce the final answer as structured output.".into()),
                input_schema: config.schema,
            },
            |input, _ctx| async move { Ok(Some(input)) },
        )?;
        Ok(Self {
            tool_name,
            tool: Arc::new(tool),
            prompt: config
                .prompt
                .unwrap_or_else(|| DEFAULT_STRUCTURED_OUTPUT_PROMPT.to_string()),
            forced_choice: config.forced_choice.unwrap_or(ToolChoice::Any),
            force_attempted: false,
            captured: HashMap::new(),
        })
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn forced_choice(&self) -> ToolChoice {
        self.forced_choice.clone()
    }

    /// Registers the synthetic tool. Duplicate registration (a retried model
    /// phase) is fine; the first registration wins.
    pub fn register(&self, registry: &ToolRegistry) {
        let _ = registry.add(Arc::clone(&self.tool) as Arc<dyn crate::tools::Tool>);
    }

    pub fn deregister(&self, registry: &ToolRegistry) {
        registry.remove_by_name(&self.tool_name);
    }

    /// True when the no-tool-use fallback should run. Flips the attempt flag
    /// so forcing happens at most once per invocation.
    pub fn take_force_attempt(&mut self) -> bool {
        if self.force_attempted {
            return false;
        }
        self.force_attempted = true;
        true
    }

    pub fn capture(&mut self, tool_use_id: impl Into<String>, value: Value) {
        self.captured.insert(tool_use_id.into(), value);
    }

    /// The captured value, if the model produced one.
    pub fn take_value(&mut self) -> Option<Value> {
        let key = self.captured.keys().next().cloned()?;
        self.captured.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "title": "SampleModel",
            "type": "object",
            "properties": {"answer": {"type": "string"}},
            "required": ["answer"]
        })
    }

    /// **Scenario**: The tool name comes from the schema root title.
    #[test]
    fn tool_name_from_schema_title() {
        let ctx = StructuredOutputContext::new(StructuredOutputConfig::from_schema(schema()))
            .unwrap();
        assert_eq!(ctx.tool_name(), "SampleModel");
        assert_eq!(ctx.prompt(), DEFAULT_STRUCTURED_OUTPUT_PROMPT);
    }

    /// **Scenario**: A schema without a title requires an explicit name.
    #[test]
    fn missing_title_requires_explicit_name() {
        let err = StructuredOutputContext::new(StructuredOutputConfig::from_schema(
            json!({"type": "object"}),
        ))
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err.kind(), "structured_output_error");

        let mut config = StructuredOutputConfig::from_schema(json!({"type": "object"}));
        config.expected_tool_name = Some("Report".into());
        let ctx = StructuredOutputContext::new(config).unwrap();
        assert_eq!(ctx.tool_name(), "Report");
    }

    /// **Scenario**: Forcing happens at most once.
    #[test]
    fn force_attempt_flips_once() {
        let mut ctx = StructuredOutputContext::new(StructuredOutputConfig::from_schema(schema()))
            .unwrap();
        assert!(ctx.take_force_attempt());
        assert!(!ctx.take_force_attempt());
    }

    /// **Scenario**: Register and deregister round-trip through a registry.
    #[test]
    fn register_deregister() {
        let ctx = StructuredOutputContext::new(StructuredOutputConfig::from_schema(schema()))
            .unwrap();
        let registry = ToolRegistry::new();
        ctx.register(&registry);
        assert!(registry.get_by_name("SampleModel").is_some());
        ctx.register(&registry); // idempotent
        assert_eq!(registry.len(), 1);
        ctx.deregister(&registry);
        assert!(registry.get_by_name("SampleModel").is_none());
    }

    /// **Scenario**: Captured values are keyed by tool_use_id and taken once.
    #[test]
    fn capture_take_round_trip() {
        let mut ctx = StructuredOutputContext::new(StructuredOutputConfig::from_schema(schema()))
            .unwrap();
        ctx.capture("t1", json!({"answer": "42"}));
        assert_eq!(ctx.take_value(), Some(json!({"answer": "42"})));
        assert_eq!(ctx.take_value(), None);
    }
}
