//! Tool layer: the tool contract, the registry, and the wrappers that turn
//! plain callbacks and schemas into tools.
//!
//! A tool streams progress events through an optional channel and returns its
//! terminal [`ToolResult`]; the loop forwards progress to hooks and the
//! consumer, and appends the result to the conversation. Tool runtime
//! failures are data (an error-status result), never loop errors.

mod agent_tool;
mod function_tool;
mod registry;
mod schema;

pub use agent_tool::AgentTool;
pub use function_tool::FunctionTool;
pub use registry::ToolRegistry;
pub use schema::{tool, SchemaTool, ToolDef};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::hooks::AgentHandle;
use crate::types::{ContentBlock, ToolResultContent, ToolResultStatus, ToolSpec};

/// The tool-use request a tool is being invoked for.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolUse {
    pub name: String,
    pub tool_use_id: String,
    pub input: Value,
}

/// Per-invocation context handed to a tool.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub tool_use: ToolUse,
    /// Consumer-supplied state for this invocation, shared by all tools.
    pub invocation_state: Value,
    pub agent: AgentHandle,
}

/// One progress event emitted by a running tool.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolStreamEvent {
    pub tool_use_id: String,
    pub data: Value,
}

/// Terminal outcome of one tool invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub status: ToolResultStatus,
    pub content: Vec<ToolResultContent>,
    /// Normalized error message when `status` is `Error`.
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(tool_use_id: impl Into<String>, content: Vec<ToolResultContent>) -> Self {
        ToolResult {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Success,
            content,
            error: None,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ToolResult {
            tool_use_id: tool_use_id.into(),
            status: ToolResultStatus::Error,
            content: vec![ToolResultContent::text(message.clone())],
            error: Some(message),
        }
    }

    /// The conversation representation of this result.
    pub fn into_block(self) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: self.tool_use_id,
            status: self.status,
            content: self.content,
        }
    }
}

/// A tool callable by the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// Spec published to the model.
    fn spec(&self) -> ToolSpec;

    /// Runs the tool. Progress events go through `progress_tx` while the
    /// terminal result is the return value. `Err` means the tool
    /// infrastructure itself failed; a tool's own runtime failure is an
    /// error-status [`ToolResult`].
    async fn stream(
        &self,
        ctx: ToolContext,
        progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
    ) -> Result<ToolResult, Error>;
}
