//! Invocation input and options.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::{ContentBlock, Message};

use super::structured_output::StructuredOutputConfig;

/// What an invocation starts from: plain text, content blocks, or a full
/// user message (media blocks ride through unchanged).
#[derive(Clone, Debug)]
pub enum AgentInput {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Message(Message),
}

impl AgentInput {
    pub fn into_message(self) -> Message {
        match self {
            AgentInput::Text(text) => Message::user_text(text),
            AgentInput::Blocks(blocks) => Message::user(blocks),
            AgentInput::Message(message) => message,
        }
    }
}

impl From<&str> for AgentInput {
    fn from(s: &str) -> Self {
        AgentInput::Text(s.to_string())
    }
}

impl From<String> for AgentInput {
    fn from(s: String) -> Self {
        AgentInput::Text(s)
    }
}

impl From<Vec<ContentBlock>> for AgentInput {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        AgentInput::Blocks(blocks)
    }
}

impl From<Message> for AgentInput {
    fn from(message: Message) -> Self {
        AgentInput::Message(message)
    }
}

/// Per-invocation options.
#[derive(Clone, Default)]
pub struct InvokeOptions {
    /// Polled at every suspension point; firing it aborts the run with a
    /// terminal `canceled`.
    pub cancellation: CancellationToken,
    /// Consumer-supplied deadline for the whole invocation, checked at the
    /// same points.
    pub timeout: Option<Duration>,
    /// Opaque state visible to every tool in this invocation.
    pub invocation_state: Value,
    /// When set, the loop coerces the model into emitting a schema-validated
    /// value through a synthetic tool.
    pub structured_output: Option<StructuredOutputConfig>,
    /// Nesting depth when this invocation runs inside an `AgentTool`.
    pub agent_tool_depth: usize,
}

impl std::fmt::Debug for InvokeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokeOptions")
            .field("canceled", &self.cancellation.is_cancelled())
            .field("timeout", &self.timeout)
            .field("structured_output", &self.structured_output.is_some())
            .field("agent_tool_depth", &self.agent_tool_depth)
            .finish()
    }
}
