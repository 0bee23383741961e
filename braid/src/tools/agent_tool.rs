//! An agent exposed as a tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::agent::{Agent, InvokeOptions};
use crate::error::Error;
use crate::types::{ToolResultContent, ToolSpec};

use super::{Tool, ToolContext, ToolResult, ToolStreamEvent};

const DEFAULT_MAX_DEPTH: usize = 3;

/// Adapter that lets one agent call another as a tool.
///
/// The wrapped agent receives the `prompt` field of the tool input and its
/// final text becomes the tool result. Recursion is bounded by a depth
/// counter threaded through the invocation options; exceeding it is an error
/// result, not a crash.
pub struct AgentTool {
    name: String,
    description: Option<String>,
    agent: Arc<Agent>,
    max_depth: usize,
}

impl AgentTool {
    pub fn new(name: impl Into<String>, agent: Arc<Agent>) -> Self {
        Self {
            name: name.into(),
            description: None,
            agent,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
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
            input_schema: json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Task for the sub-agent."
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    async fn stream(
        &self,
        ctx: ToolContext,
        _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
    ) -> Result<ToolResult, Error> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        let depth = ctx
            .invocation_state
            .get("agent_tool_depth")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        if depth >= self.max_depth {
            return Ok(ToolResult::error(
                tool_use_id,
                format!("agent tool depth limit ({}) reached", self.max_depth),
            ));
        }
        let prompt = match ctx.tool_use.input.get("prompt").and_then(Value::as_str) {
            Some(p) => p.to_string(),
            None => {
                return Ok(ToolResult::error(
                    tool_use_id,
                    "input validation failed at /prompt: missing prompt",
                ))
            }
        };

        let mut invocation_state = ctx.invocation_state.clone();
        if let Some(obj) = invocation_state.as_object_mut() {
            obj.insert("agent_tool_depth".into(), json!(depth + 1));
        } else {
            invocation_state = json!({ "agent_tool_depth": depth + 1 });
        }
        let options = InvokeOptions {
            invocation_state,
            agent_tool_depth: depth + 1,
            ..InvokeOptions::default()
        };

        match self.agent.invoke(prompt, options).await {
            Ok(result) => Ok(ToolResult::success(
                tool_use_id,
                vec![ToolResultContent::text(result.text())],
            )),
            Err(e) => Ok(ToolResult::error(tool_use_id, format!("Error: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::AgentHandle;
    use crate::model::{MockModel, StopReason};
    use crate::tools::ToolUse;
    use crate::types::ToolResultStatus;

    fn sub_agent(reply: &str) -> Arc<Agent> {
        let model = Arc::new(MockModel::new("mock-sub"));
        model.enqueue_text(reply, StopReason::EndTurn);
        Arc::new(
            Agent::builder()
                .name("researcher")
                .model(model)
                .build()
                .unwrap(),
        )
    }

    fn ctx(input: Value, state: Value) -> ToolContext {
        ToolContext {
            tool_use: ToolUse {
                name: "researcher".into(),
                tool_use_id: "t1".into(),
                input,
            },
            invocation_state: state,
            agent: AgentHandle {
                agent_id: "a-1".into(),
                agent_name: "parent".into(),
            },
        }
    }

    /// **Scenario**: The sub-agent's final text becomes the tool result.
    #[tokio::test]
    async fn sub_agent_text_is_result() {
        let tool = AgentTool::new("researcher", sub_agent("found it"));
        let result = tool
            .stream(ctx(json!({"prompt": "look"}), json!({})), None)
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Success);
        assert_eq!(result.content, vec![ToolResultContent::text("found it")]);
    }

    /// **Scenario**: The depth counter stops runaway agent-as-tool recursion.
    #[tokio::test]
    async fn depth_cap_is_an_error_result() {
        let tool = AgentTool::new("researcher", sub_agent("unused")).with_max_depth(2);
        let result = tool
            .stream(
                ctx(json!({"prompt": "look"}), json!({"agent_tool_depth": 2})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.status, ToolResultStatus::Error);
        assert!(result.error.unwrap().contains("depth limit"));
    }

    /// **Scenario**: Missing prompt is an input validation error result.
    #[tokio::test]
    async fn missing_prompt_is_error_result() {
        let tool = AgentTool::new("researcher", sub_agent("unused"));
        let result = tool.stream(ctx(json!({}), json!({})), None).await.unwrap();
        assert_eq!(result.status, ToolResultStatus::Error);
    }
}
