//! Swarm execution: handoffs, caps, timeouts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid::{
    Agent, ContentBlock, Error, InvokeOptions, MockModel, ModelEventStream, ModelProvider,
    ModelRequest, MultiAgentEvent, MultiAgentStatus, NodeStatus, StopReason, Swarm,
    ToolResultStatus, HANDOFF_TOOL_NAME,
};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;

/// Agent whose model always hands off to `target`, then answers when the
/// handoff is refused or on follow-up calls.
fn handoff_agent(target: &str, rounds: usize) -> Arc<Agent> {
    let model = Arc::new(MockModel::new("mock"));
    for round in 0..rounds {
        model.enqueue_tool_use(
            HANDOFF_TOOL_NAME,
            format!("t{round}"),
            json!({"agent_name": target, "message": format!("round {round}")}),
        );
        model.enqueue_text(format!("after round {round}"), StopReason::EndTurn);
    }
    Arc::new(Agent::builder().model(model).build().unwrap())
}

/// Scenario: two agents that always hand off, capped at two handoffs, run
/// A, B, A, B; the final node's handoff is refused and the swarm completes.
#[tokio::test]
async fn handoff_cap_sequence() {
    let swarm = Swarm::builder()
        .agent("a", handoff_agent("b", 2))
        .agent("b", handoff_agent("a", 2))
        .entry_point("a")
        .max_handoffs(2)
        .build()
        .unwrap();

    let (tx, mut rx) = mpsc::channel(256);
    let collect = async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    };
    let (result, events) = tokio::join!(swarm.stream("go", InvokeOptions::default(), tx), collect);
    let result = result.unwrap();

    assert_eq!(result.status, MultiAgentStatus::Completed);
    assert_eq!(
        result.execution_order,
        vec!["a".to_string(), "b".into(), "a".into(), "b".into()]
    );

    // Exactly two honored handoffs on the stream.
    let handoffs: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, MultiAgentEvent::Handoff { .. }))
        .collect();
    assert_eq!(handoffs.len(), 2);
}

/// Only the first handoff per message is honored; the second becomes an
/// error result.
#[tokio::test]
async fn second_handoff_in_one_message_is_refused() {
    let model = Arc::new(MockModel::new("mock"));
    model.enqueue_events({
        let mut events = vec![braid::ModelStreamEvent::MessageStart {
            role: braid::Role::Assistant,
        }];
        for (index, id) in ["t1", "t2"].iter().enumerate() {
            events.push(braid::ModelStreamEvent::ContentBlockStart {
                content_block_index: index,
                start: Some(braid::ContentBlockStart {
                    tool_use: Some(braid::ToolUseStart {
                        name: HANDOFF_TOOL_NAME.into(),
                        tool_use_id: (*id).into(),
                    }),
                }),
            });
            events.push(braid::ModelStreamEvent::ContentBlockDelta {
                content_block_index: index,
                delta: braid::ContentBlockDelta::ToolUseInput {
                    input: json!({"agent_name": "b"}).to_string(),
                },
            });
            events.push(braid::ModelStreamEvent::ContentBlockStop {
                content_block_index: index,
            });
        }
        events.push(braid::ModelStreamEvent::MessageStop {
            stop_reason: StopReason::ToolUse,
        });
        events
    });
    model.enqueue_text("handed off", StopReason::EndTurn);
    let double = Arc::new(Agent::builder().model(model).build().unwrap());

    let quiet = {
        let model = Arc::new(MockModel::new("mock"));
        model.enqueue_text("b done", StopReason::EndTurn);
        Arc::new(Agent::builder().model(model).build().unwrap())
    };

    let swarm = Swarm::builder()
        .agent("a", Arc::clone(&double))
        .agent("b", quiet)
        .entry_point("a")
        .build()
        .unwrap();
    let result = swarm.invoke("go", InvokeOptions::default()).await.unwrap();
    assert_eq!(result.status, MultiAgentStatus::Completed);
    assert_eq!(result.execution_order, vec!["a".to_string(), "b".into()]);

    let results: Vec<(String, ToolResultStatus, String)> = double
        .messages()
        .await
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|b| match b {
            ContentBlock::ToolResult {
                tool_use_id,
                status,
                content,
            } => {
                let text = match &content[0] {
                    braid::ToolResultContent::Text { text } => text.clone(),
                    _ => String::new(),
                };
                Some((tool_use_id.clone(), *status, text))
            }
            _ => None,
        })
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].1, ToolResultStatus::Success);
    assert_eq!(results[0].2, "handing off to b");
    assert_eq!(results[1].1, ToolResultStatus::Error);
    assert_eq!(results[1].2, "handoff already in flight");
}

struct StallingModel;

#[async_trait]
impl ModelProvider for StallingModel {
    fn model_id(&self) -> &str {
        "stall"
    }

    async fn stream(&self, _request: ModelRequest) -> Result<ModelEventStream, Error> {
        Ok(futures::stream::pending().boxed())
    }
}

/// A node that exceeds the node timeout is canceled and recorded as
/// interrupted with a timeout error; the swarm still exits `Completed`.
#[tokio::test]
async fn node_timeout_marks_interrupted() {
    let stuck = Arc::new(Agent::builder().model(Arc::new(StallingModel)).build().unwrap());
    let swarm = Swarm::builder()
        .agent("stuck", stuck)
        .entry_point("stuck")
        .node_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let result = swarm.invoke("go", InvokeOptions::default()).await.unwrap();
    assert_eq!(result.status, MultiAgentStatus::Completed);
    let node = &result.node_results["stuck"];
    assert_eq!(node.status, NodeStatus::Interrupted);
    assert_eq!(node.error.as_deref(), Some("NodeTimeout"));
}

/// Builder validation: the handoff cap must stay in its allowed range and
/// the entry point must exist.
#[tokio::test]
async fn builder_validation() {
    let agent = || {
        let model = Arc::new(MockModel::new("mock"));
        Arc::new(Agent::builder().model(model).build().unwrap())
    };

    let err = Swarm::builder()
        .agent("a", agent())
        .entry_point("a")
        .max_handoffs(0)
        .build()
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let err = Swarm::builder()
        .agent("a", agent())
        .entry_point("ghost")
        .build()
        .map(|_| ())
        .unwrap_err();
    assert!(err.to_string().contains("ghost"));

    let err = Swarm::builder()
        .agent("a", agent())
        .agent("a", agent())
        .entry_point("a")
        .build()
        .map(|_| ())
        .unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

/// The handoff target sees the handoff history rendered into its prompt.
#[tokio::test]
async fn target_reads_handoff_from_shared_context() {
    let model_b = Arc::new(MockModel::new("mock-b"));
    model_b.enqueue_text("b done", StopReason::EndTurn);
    let b = Arc::new(Agent::builder().model(model_b.clone()).build().unwrap());

    let swarm = Swarm::builder()
        .agent("a", handoff_agent("b", 1))
        .agent("b", b)
        .entry_point("a")
        .build()
        .unwrap();
    swarm.invoke("solve it", InvokeOptions::default()).await.unwrap();

    let request = model_b.requests().pop().expect("b ran");
    let prompt = request.messages.first().unwrap().text();
    assert!(prompt.contains("Task: solve it"));
    assert!(prompt.contains("a -> b"));
    assert!(prompt.contains("round 0"));
}
