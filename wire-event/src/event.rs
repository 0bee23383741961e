//! Wire-level event types (type + payload).
//!
//! Payloads that carry runtime values use `serde_json::Value`; the bridge in
//! braid serializes its own types into those slots. Field names are camelCase
//! on the wire.

use serde::Serialize;
use serde_json::Value;

/// One stream event as delivered to a consumer.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WireEvent {
    /// Transient model stream delta.
    ModelStream { event: Value },
    /// Fully assembled content block.
    #[serde(rename_all = "camelCase")]
    ContentBlock { block: Value },
    /// Progress event from a running tool.
    #[serde(rename_all = "camelCase")]
    ToolStream { tool_use_id: String, data: Value },
    #[serde(rename_all = "camelCase")]
    MultiAgentNodeStart { node_id: String },
    /// Inner event from one node of a multi-agent run. `event` is the inner
    /// payload; nested executor events carry a `childType` tag inside it.
    #[serde(rename_all = "camelCase")]
    MultiAgentNodeStream { node_id: String, event: Value },
    #[serde(rename_all = "camelCase")]
    MultiAgentNodeStop { node_id: String, node_result: Value },
    #[serde(rename_all = "camelCase")]
    MultiAgentHandoff {
        from_node_ids: Vec<String>,
        to_node_ids: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MultiAgentNodeInterrupt { node_id: String, interrupt_id: String },
    #[serde(rename_all = "camelCase")]
    MultiAgentNodeCancel { node_id: String },
}

impl WireEvent {
    /// SSE `event:` name for this payload.
    pub fn event_name(&self) -> &'static str {
        match self {
            WireEvent::ModelStream { .. } => "modelStream",
            WireEvent::ContentBlock { .. } => "contentBlock",
            WireEvent::ToolStream { .. } => "toolStream",
            WireEvent::MultiAgentNodeStart { .. } => "multiAgentNodeStart",
            WireEvent::MultiAgentNodeStream { .. } => "multiAgentNodeStream",
            WireEvent::MultiAgentNodeStop { .. } => "multiAgentNodeStop",
            WireEvent::MultiAgentHandoff { .. } => "multiAgentHandoff",
            WireEvent::MultiAgentNodeInterrupt { .. } => "multiAgentNodeInterrupt",
            WireEvent::MultiAgentNodeCancel { .. } => "multiAgentNodeCancel",
        }
    }

    /// Serializes to the JSON object put on the `data:` line.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Payload of the terminal `done` frame.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
    pub usage: Value,
    pub execution_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_node: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

/// Payload of the terminal `error` frame.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub message: String,
    /// Stable error kind for programmatic dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
