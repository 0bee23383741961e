//! Bridge from runtime events to the wire protocol.
//!
//! Converts [`AgentEvent`] and [`MultiAgentEvent`] into `wire-event` shapes
//! and builds the terminal `done` frames. The serve crate frames the output
//! with `wire_event::sse_frame`.

use serde_json::{json, Value};
use wire_event::{DoneFrame, WireEvent};

use crate::agent::{AgentEvent, AgentResult};
use crate::multiagent::{
    MultiAgentEvent, MultiAgentResult, MultiAgentStatus, NodeResult, NodeStatus, NodeStreamEvent,
};

/// Converts one agent event into its wire shape.
pub fn agent_event_to_wire(event: &AgentEvent) -> Result<WireEvent, serde_json::Error> {
    Ok(match event {
        AgentEvent::ModelDelta(delta) => WireEvent::ModelStream {
            event: serde_json::to_value(delta)?,
        },
        AgentEvent::BlockComplete(block) => WireEvent::ContentBlock {
            block: serde_json::to_value(block)?,
        },
        AgentEvent::ToolProgress { tool_use_id, data } => WireEvent::ToolStream {
            tool_use_id: tool_use_id.clone(),
            data: data.clone(),
        },
    })
}

/// Converts one multi-agent event into its wire shape. The terminal `Result`
/// event maps to `None`; it is delivered as the `done` frame instead.
pub fn multiagent_event_to_wire(
    event: &MultiAgentEvent,
) -> Result<Option<WireEvent>, serde_json::Error> {
    Ok(Some(match event {
        MultiAgentEvent::NodeStart { node_id } => WireEvent::MultiAgentNodeStart {
            node_id: node_id.clone(),
        },
        MultiAgentEvent::NodeStream { node_id, event } => WireEvent::MultiAgentNodeStream {
            node_id: node_id.clone(),
            event: node_stream_event_to_value(event)?,
        },
        MultiAgentEvent::NodeStop { node_id, result } => WireEvent::MultiAgentNodeStop {
            node_id: node_id.clone(),
            node_result: node_result_to_value(result),
        },
        MultiAgentEvent::Handoff {
            from_node_ids,
            to_node_ids,
            message,
        } => WireEvent::MultiAgentHandoff {
            from_node_ids: from_node_ids.clone(),
            to_node_ids: to_node_ids.clone(),
            message: message.clone(),
        },
        MultiAgentEvent::NodeInterrupt {
            node_id,
            interrupt_id,
        } => WireEvent::MultiAgentNodeInterrupt {
            node_id: node_id.clone(),
            interrupt_id: interrupt_id.clone(),
        },
        MultiAgentEvent::NodeCancel { node_id } => WireEvent::MultiAgentNodeCancel {
            node_id: node_id.clone(),
        },
        MultiAgentEvent::Result { .. } => return Ok(None),
    }))
}

fn node_stream_event_to_value(event: &NodeStreamEvent) -> Result<Value, serde_json::Error> {
    Ok(match event {
        NodeStreamEvent::Agent(agent_event) => {
            agent_event_to_wire(agent_event)?.to_value()?
        }
        NodeStreamEvent::Nested { child_type, event } => {
            let inner = multiagent_event_to_value(event)?;
            json!({ "childType": child_type, "event": inner })
        }
    })
}

fn multiagent_event_to_value(event: &MultiAgentEvent) -> Result<Value, serde_json::Error> {
    match multiagent_event_to_wire(event)? {
        Some(wire) => wire.to_value(),
        // A nested terminal result: carried through verbatim.
        None => match event {
            MultiAgentEvent::Result { result } => Ok(json!({
                "type": "multiAgentResult",
                "result": multiagent_result_to_value(result),
            })),
            _ => Ok(Value::Null),
        },
    }
}

pub fn node_status_str(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Completed => "completed",
        NodeStatus::Failed => "failed",
        NodeStatus::Interrupted => "interrupted",
        NodeStatus::Canceled => "canceled",
    }
}

pub fn multiagent_status_str(status: MultiAgentStatus) -> &'static str {
    match status {
        MultiAgentStatus::Completed => "completed",
        MultiAgentStatus::Failed => "failed",
        MultiAgentStatus::Interrupted => "interrupted",
        MultiAgentStatus::Canceled => "canceled",
    }
}

pub fn node_result_to_value(result: &NodeResult) -> Value {
    let mut v = json!({
        "nodeId": result.node_id,
        "status": node_status_str(result.status),
        "durationMs": result.duration_ms,
        "content": result.content,
    });
    if let Some(error) = &result.error {
        v["error"] = json!(error);
    }
    v
}

pub fn multiagent_result_to_value(result: &MultiAgentResult) -> Value {
    let per_node: Value = result
        .node_results
        .iter()
        .map(|(id, r)| (id.clone(), node_result_to_value(r)))
        .collect::<serde_json::Map<String, Value>>()
        .into();
    json!({
        "status": multiagent_status_str(result.status),
        "nodeResults": per_node,
        "executionOrder": result.execution_order,
        "executionTimeMs": result.execution_time_ms,
        "aggregatedUsage": result.aggregated_usage,
    })
}

/// Terminal `done` frame for a single-agent run.
pub fn agent_done_frame(run_id: &str, result: &AgentResult) -> DoneFrame {
    DoneFrame {
        run_id: Some(run_id.to_string()),
        text: Some(result.text()),
        structured_output: result.structured_output.clone(),
        usage: serde_json::to_value(result.metrics.usage).unwrap_or(Value::Null),
        execution_time: result.metrics.execution_time_ms,
        per_node: None,
        execution_order: None,
        model_id: Some(result.metrics.model_id.clone()),
        estimated_cost_usd: result.metrics.estimated_cost,
    }
}

/// Terminal `done` frame for a swarm or graph run.
pub fn multiagent_done_frame(run_id: &str, result: &MultiAgentResult) -> DoneFrame {
    let per_node: Value = result
        .node_results
        .iter()
        .map(|(id, r)| (id.clone(), node_result_to_value(r)))
        .collect::<serde_json::Map<String, Value>>()
        .into();
    DoneFrame {
        run_id: Some(run_id.to_string()),
        text: Some(result.text()),
        structured_output: None,
        usage: serde_json::to_value(result.aggregated_usage).unwrap_or(Value::Null),
        execution_time: result.execution_time_ms,
        per_node: Some(per_node),
        execution_order: Some(result.execution_order.clone()),
        model_id: None,
        estimated_cost_usd: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentBlockDelta, ModelStreamEvent};
    use crate::types::ContentBlock;

    /// **Scenario**: A model delta bridges to a `modelStream` wire event with
    /// the camelCase inner payload.
    #[test]
    fn model_delta_bridges() {
        let event = AgentEvent::ModelDelta(ModelStreamEvent::ContentBlockDelta {
            content_block_index: 0,
            delta: ContentBlockDelta::Text { text: "hi".into() },
        });
        let wire = agent_event_to_wire(&event).unwrap();
        let v = wire.to_value().unwrap();
        assert_eq!(v["type"], "modelStream");
        assert_eq!(v["event"]["type"], "contentBlockDelta");
    }

    /// **Scenario**: A nested swarm event keeps the innermost node id and
    /// gains the child type tag.
    #[test]
    fn nested_event_bridges_with_child_type() {
        let inner = MultiAgentEvent::NodeStart {
            node_id: "writer".into(),
        };
        let event = MultiAgentEvent::NodeStream {
            node_id: "writer".into(),
            event: NodeStreamEvent::Nested {
                child_type: "swarm",
                event: Box::new(inner),
            },
        };
        let wire = multiagent_event_to_wire(&event).unwrap().unwrap();
        let v = wire.to_value().unwrap();
        assert_eq!(v["type"], "multiAgentNodeStream");
        assert_eq!(v["nodeId"], "writer");
        assert_eq!(v["event"]["childType"], "swarm");
        assert_eq!(v["event"]["event"]["type"], "multiAgentNodeStart");
    }

    /// **Scenario**: The terminal Result event does not map to a stream frame.
    #[test]
    fn result_event_is_terminal() {
        let result = MultiAgentResult {
            status: MultiAgentStatus::Completed,
            node_results: Default::default(),
            execution_order: vec![],
            execution_time_ms: 0,
            aggregated_usage: Default::default(),
        };
        let mapped = multiagent_event_to_wire(&MultiAgentEvent::Result { result })
            .unwrap();
        assert!(mapped.is_none());
    }

    /// **Scenario**: Node results serialize with camelCase fields and a
    /// lowercase status.
    #[test]
    fn node_result_shape() {
        let v = node_result_to_value(&NodeResult {
            node_id: "a".into(),
            status: NodeStatus::Failed,
            duration_ms: 12,
            content: vec![ContentBlock::text("partial")],
            error: Some("boom".into()),
        });
        assert_eq!(v["nodeId"], "a");
        assert_eq!(v["status"], "failed");
        assert_eq!(v["durationMs"], 12);
        assert_eq!(v["error"], "boom");
        assert_eq!(v["content"][0]["type"], "text");
    }
}
