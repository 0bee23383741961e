//! Tool built from a plain async callback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::types::{ToolResultContent, ToolSpec};

use super::{Tool, ToolContext, ToolResult, ToolStreamEvent};

type Callback =
    Arc<dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Option<Value>, Error>> + Send + Sync>;

/// Wraps an async callback as a [`Tool`].
///
/// The callback's outcome is mapped onto tool-result content:
/// `Ok(None)` → text `<undefined>`; `Ok(Some(Null))` → text `<null>`;
/// strings, numbers, and booleans → their text form; arrays → JSON content
/// wrapped as `{"$value": [...]}` (array payloads are not accepted bare by
/// all providers); objects → JSON content as-is; `Err` → error status with
/// text `"Error: <message>"`.
pub struct FunctionTool {
    name: String,
    description: Option<String>,
    input_schema: Value,
    callback: Callback,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: Option<String>,
        input_schema: Value,
        callback: F,
    ) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description,
            input_schema,
            callback: Arc::new(move |input, ctx| Box::pin(callback(input, ctx))),
        }
    }

    /// Maps a callback outcome to the terminal tool result.
    pub(crate) fn wrap_outcome(
        tool_use_id: &str,
        outcome: Result<Option<Value>, Error>,
    ) -> ToolResult {
        match outcome {
            Err(e) => ToolResult::error(tool_use_id, format!("Error: {e}")),
            Ok(None) => ToolResult::success(
                tool_use_id,
                vec![ToolResultContent::text("<undefined>")],
            ),
            Ok(Some(value)) => {
                let content = match value {
                    Value::Null => ToolResultContent::text("<null>"),
                    Value::String(s) => ToolResultContent::text(s),
                    Value::Bool(b) => ToolResultContent::text(b.to_string()),
                    Value::Number(n) => ToolResultContent::text(n.to_string()),
                    Value::Array(items) => ToolResultContent::json(json!({ "$value": items })),
                    obj @ Value::Object(_) => ToolResultContent::json(obj),
                };
                ToolResult::success(tool_use_id, vec![content])
            }
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
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
            input_schema: self.input_schema.clone(),
        }
    }

    async fn stream(
        &self,
        ctx: ToolContext,
        _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
    ) -> Result<ToolResult, Error> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        let input = ctx.tool_use.input.clone();
        let outcome = (self.callback)(input, ctx).await;
        Ok(Self::wrap_outcome(&tool_use_id, outcome))
    }
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::AgentHandle;
    use crate::tools::ToolUse;
    use crate::types::ToolResultStatus;

    fn ctx(input: Value) -> ToolContext {
        ToolContext {
            tool_use: ToolUse {
                name: "echo".into(),
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

    async fn run(tool: &FunctionTool, input: Value) -> ToolResult {
        tool.stream(ctx(input), None).await.unwrap()
    }

    /// **Scenario**: invoke(x) == f(x); the wrapped callback sees the tool
    /// input verbatim and its value round-trips to content.
    #[tokio::test]
    async fn callback_sees_input_verbatim() {
        let tool = FunctionTool::new("echo", None, json!({"type": "object"}), |input, _ctx| async move {
            Ok(Some(input))
        });
        let result = run(&tool, json!({"a": 2, "b": 3})).await;
        assert_eq!(result.status, ToolResultStatus::Success);
        assert_eq!(
            result.content,
            vec![ToolResultContent::json(json!({"a": 2, "b": 3}))]
        );
    }

    /// **Scenario**: Outcome mapping covers null, undefined, primitives,
    /// arrays, and objects.
    #[test]
    fn outcome_mapping() {
        let cases: Vec<(Result<Option<Value>, Error>, ToolResultContent)> = vec![
            (Ok(None), ToolResultContent::text("<undefined>")),
            (Ok(Some(Value::Null)), ToolResultContent::text("<null>")),
            (Ok(Some(json!("hi"))), ToolResultContent::text("hi")),
            (Ok(Some(json!(5))), ToolResultContent::text("5")),
            (Ok(Some(json!(true))), ToolResultContent::text("true")),
            (
                Ok(Some(json!([1, 2]))),
                ToolResultContent::json(json!({"$value": [1, 2]})),
            ),
            (
                Ok(Some(json!({"k": "v"}))),
                ToolResultContent::json(json!({"k": "v"})),
            ),
        ];
        for (outcome, expected) in cases {
            let result = FunctionTool::wrap_outcome("t1", outcome);
            assert_eq!(result.status, ToolResultStatus::Success);
            assert_eq!(result.content, vec![expected]);
        }
    }

    /// **Scenario**: A callback error becomes an error-status result with the
    /// normalized message, not a loop error.
    #[tokio::test]
    async fn callback_error_is_data() {
        let tool = FunctionTool::new("boom", None, json!({"type": "object"}), |_, _| async {
            Err(Error::Tool("disk on fire".into()))
        });
        let result = run(&tool, json!({})).await;
        assert_eq!(result.status, ToolResultStatus::Error);
        assert_eq!(
            result.content,
            vec![ToolResultContent::text("Error: tool error: disk on fire")]
        );
        assert!(result.error.is_some());
    }
}
