//! Schema-validated tool factory.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use jsonschema::JSONSchema;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::types::{validate_tool_name, ToolSpec};

use super::function_tool::FunctionTool;
use super::{Tool, ToolContext, ToolResult, ToolStreamEvent};

/// Declarative tool definition for [`tool`].
#[derive(Clone, Debug)]
pub struct ToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

type Callback =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Option<Value>, Error>> + Send + Sync>;

/// A tool whose input is validated against a compiled JSON Schema before the
/// callback runs. Invalid input becomes an error tool result naming the
/// violating instance path; the callback never sees it.
pub struct SchemaTool {
    name: String,
    description: Option<String>,
    published_schema: Value,
    compiled: JSONSchema,
    callback: Callback,
}

/// Builds a schema-validated tool from a definition and callback.
///
/// The schema is compiled once here; compile failure is a validation error.
/// The `$schema` meta key is stripped from the spec published to the model.
pub fn tool<F, Fut>(def: ToolDef, callback: F) -> Result<SchemaTool, Error>
where
    F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, Error>> + Send + 'static,
{
    validate_tool_name(&def.name)?;
    let compiled = JSONSchema::compile(&def.input_schema).map_err(|e| {
        Error::validation(format!("tool {}: invalid input schema: {e}", def.name))
    })?;
    let mut published_schema = def.input_schema;
    if let Some(obj) = published_schema.as_object_mut() {
        obj.remove("$schema");
    }
    Ok(SchemaTool {
        name: def.name,
        description: def.description,
        published_schema,
        compiled,
        callback: Arc::new(move |input, ctx| Box::pin(callback(input, ctx))),
    })
}

impl SchemaTool {
    /// Validates a candidate input, returning the first violation as
    /// `path: message`.
    pub fn check_input(&self, input: &Value) -> Result<(), String> {
        match self.compiled.validate(input) {
            Ok(()) => Ok(()),
            Err(mut errors) => {
                let message = match errors.next() {
                    Some(e) => {
                        let path = e.instance_path.to_string();
                        let path = if path.is_empty() { "/".to_string() } else { path };
                        format!("{path}: {e}")
                    }
                    None => "schema validation failed".to_string(),
                };
                Err(message)
            }
        }
    }
}

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.published_schema.clone(),
        }
    }

    async fn stream(
        &self,
        ctx: ToolContext,
        _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
    ) -> Result<ToolResult, Error> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        if let Err(violation) = self.check_input(&ctx.tool_use.input) {
            return Ok(ToolResult::error(
                tool_use_id,
                format!("input validation failed at {violation}"),
            ));
        }
        let input = ctx.tool_use.input.clone();
        let outcome = (self.callback)(input, ctx).await;
        Ok(FunctionTool::wrap_outcome(&tool_use_id, outcome))
    }
}

impl fmt::Debug for SchemaTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaTool").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::AgentHandle;
    use crate::tools::ToolUse;
    use crate::types::{ToolResultContent, ToolResultStatus};
    use serde_json::json;

    fn value_tool() -> SchemaTool {
        tool(
            ToolDef {
                name: "store".into(),
                description: Some("stores a non-negative value".into()),
                input_schema: json!({
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "properties": {
                        "value": {"type": "integer", "minimum": 0}
                    },
                    "required": ["value"]
                }),
            },
            |input, _ctx| async move { Ok(Some(json!({"stored": input["value"]}))) },
        )
        .unwrap()
    }

    fn ctx(input: Value) -> ToolContext {
        ToolContext {
            tool_use: ToolUse {
                name: "store".into(),
                tool_use_id: "t1".into(),
                input,
            },
            invocation_state: json!({}),
            agent: AgentHandle {
                agent_id: "a-1".into(),
                agent_name: "test".into(),
            },
        }
    }

    /// **Scenario**: Valid input reaches the callback; result carries its value.
    #[tokio::test]
    async fn valid_input_runs_callback() {
        let tool = value_tool();
        let result = tool.stream(ctx(json!({"value": 7})), None).await.unwrap();
        assert_eq!(result.status, ToolResultStatus::Success);
        assert_eq!(
            result.content,
            vec![ToolResultContent::json(json!({"stored": 7}))]
        );
    }

    /// **Scenario**: `{value: -1}` is rejected with an error result whose text
    /// names the violating field path; the callback does not run.
    #[tokio::test]
    async fn invalid_input_names_field_path() {
        let tool = value_tool();
        let result = tool.stream(ctx(json!({"value": -1})), None).await.unwrap();
        assert_eq!(result.status, ToolResultStatus::Error);
        match &result.content[0] {
            ToolResultContent::Text { text } => {
                assert!(text.contains("value"), "path missing from {text:?}")
            }
            other => panic!("expected text content, got {other:?}"),
        }
    }

    /// **Scenario**: The `$schema` meta key is stripped from the published spec.
    #[test]
    fn published_spec_strips_meta_schema() {
        let tool = value_tool();
        let spec = tool.spec();
        assert!(spec.input_schema.get("$schema").is_none());
        assert!(spec.input_schema.get("properties").is_some());
    }

    /// **Scenario**: Bad tool names are rejected by the factory.
    #[test]
    fn factory_rejects_bad_name() {
        let err = tool(
            ToolDef {
                name: "bad name".into(),
                description: None,
                input_schema: json!({"type": "object"}),
            },
            |_, _| async { Ok(None) },
        )
        .map(|_| ())
        .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
