//! Model provider contract: the streaming interface the loop drives.
//!
//! Concrete providers live outside this crate; the runtime only depends on
//! the event stream shape defined here. [`MockModel`] replays scripted event
//! sequences and is what the test suites run against.

mod aggregator;
mod mock;

pub use aggregator::MessageAggregator;
pub use mock::MockModel;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{Message, Role, ToolSpec, Usage};

/// Why a single model call stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    ContentFiltered,
    GuardrailIntervened,
    ContextWindowExceeded,
}

/// How the model may pick tools on the next call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolChoice {
    /// Model decides between text and tool calls.
    Auto,
    /// Model must call some tool.
    Any,
    /// Model must call this tool.
    Tool { name: String },
}

/// One model call: history, system prompt, published tools.
#[derive(Clone, Debug, Default)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub tool_specs: Vec<ToolSpec>,
    pub tool_choice: Option<ToolChoice>,
}

/// Start payload for a tool-use content block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseStart {
    pub name: String,
    pub tool_use_id: String,
}

/// Start payload for a content block, when the provider sends one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlockStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<ToolUseStart>,
}

/// Incremental content within one block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentBlockDelta {
    Text {
        text: String,
    },
    /// Fragment of the JSON input string for a tool use.
    ToolUseInput {
        input: String,
    },
    #[serde(rename_all = "camelCase")]
    Reasoning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redacted_content: Option<String>,
    },
}

/// One event from a streaming model call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ModelStreamEvent {
    MessageStart {
        role: Role,
    },
    #[serde(rename_all = "camelCase")]
    ContentBlockStart {
        content_block_index: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<ContentBlockStart>,
    },
    #[serde(rename_all = "camelCase")]
    ContentBlockDelta {
        content_block_index: usize,
        delta: ContentBlockDelta,
    },
    #[serde(rename_all = "camelCase")]
    ContentBlockStop {
        content_block_index: usize,
    },
    #[serde(rename_all = "camelCase")]
    MessageStop {
        stop_reason: StopReason,
    },
    Metadata {
        usage: Usage,
    },
}

/// Boxed event stream returned by a provider.
pub type ModelEventStream = BoxStream<'static, Result<ModelStreamEvent, Error>>;

/// A streaming model provider.
///
/// Implementations translate `ModelRequest` into their wire format and yield
/// [`ModelStreamEvent`]s as deltas arrive. The loop never buffers the whole
/// response; it feeds each event to the [`MessageAggregator`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider-reported model id, recorded in invocation metrics.
    fn model_id(&self) -> &str;

    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Stream events serialize with camelCase discriminators.
    #[test]
    fn event_wire_shapes() {
        let v = serde_json::to_value(ModelStreamEvent::MessageStart { role: Role::Assistant })
            .unwrap();
        assert_eq!(v["type"], "messageStart");

        let v = serde_json::to_value(ModelStreamEvent::ContentBlockDelta {
            content_block_index: 0,
            delta: ContentBlockDelta::ToolUseInput {
                input: "{\"a\":".into(),
            },
        })
        .unwrap();
        assert_eq!(v["type"], "contentBlockDelta");
        assert_eq!(v["delta"]["toolUseInput"]["input"], "{\"a\":");

        let v = serde_json::to_value(ModelStreamEvent::MessageStop {
            stop_reason: StopReason::ToolUse,
        })
        .unwrap();
        assert_eq!(v["stopReason"], "toolUse");
    }

    /// **Scenario**: ToolChoice serializes the three shapes the providers expect.
    #[test]
    fn tool_choice_shapes() {
        assert_eq!(serde_json::to_value(ToolChoice::Auto).unwrap(), "auto");
        assert_eq!(serde_json::to_value(ToolChoice::Any).unwrap(), "any");
        let v = serde_json::to_value(ToolChoice::Tool {
            name: "Report".into(),
        })
        .unwrap();
        assert_eq!(v["tool"]["name"], "Report");
    }
}
