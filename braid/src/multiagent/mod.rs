//! Multi-agent executors: shared result types, the node abstraction, and the
//! stream merger that fans child events into one ordered output.
//!
//! Two executors build on this module: [`Swarm`] (free-form handoffs) and
//! [`Graph`] (static DAG with parallel branches). Both stream
//! [`MultiAgentEvent`]s through a channel and return a [`MultiAgentResult`].

mod graph;
mod swarm;

pub use graph::{Graph, GraphBuilder};
pub use swarm::{Swarm, SwarmBuilder, HANDOFF_TOOL_NAME};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::agent::{Agent, AgentEvent, AgentInput, InvocationStatus, InvokeOptions};
use crate::error::Error;
use crate::types::{ContentBlock, Message, Usage};

/// Reserved node id used when a nested executor event arrives without one.
/// Preserved as a literal in the stream; consumers decide how to render it.
pub const NESTED_NODE_ID: &str = "__swarm_nested__";

/// How one node ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    Completed,
    Failed,
    Interrupted,
    Canceled,
}

/// Per-node outcome recorded in the executor result.
#[derive(Clone, Debug)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    pub duration_ms: u64,
    pub content: Vec<ContentBlock>,
    pub error: Option<String>,
}

/// Overall status of a multi-agent run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiAgentStatus {
    Completed,
    Failed,
    Interrupted,
    Canceled,
}

/// Terminal result of a swarm or graph run.
#[derive(Clone, Debug)]
pub struct MultiAgentResult {
    pub status: MultiAgentStatus,
    pub node_results: HashMap<String, NodeResult>,
    /// Node ids in the order their stop events were emitted, one
    /// linearization of the partial order across branches.
    pub execution_order: Vec<String>,
    pub execution_time_ms: u64,
    pub aggregated_usage: Usage,
}

impl MultiAgentResult {
    /// Content of the last node to finish, the common consumer ask.
    pub fn final_content(&self) -> Vec<ContentBlock> {
        self.execution_order
            .last()
            .and_then(|id| self.node_results.get(id))
            .map(|r| r.content.clone())
            .unwrap_or_default()
    }

    /// Concatenated text of the final node's content.
    pub fn text(&self) -> String {
        self.final_content()
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Inner payload of a node stream event: either a plain agent event, or an
/// event bubbled up from a nested swarm/graph node.
#[derive(Clone, Debug)]
pub enum NodeStreamEvent {
    Agent(AgentEvent),
    Nested {
        /// `"swarm"` or `"graph"`, the child executor's type tag.
        child_type: &'static str,
        event: Box<MultiAgentEvent>,
    },
}

/// One event in a multi-agent run stream.
#[derive(Clone, Debug)]
pub enum MultiAgentEvent {
    NodeStart {
        node_id: String,
    },
    NodeStream {
        node_id: String,
        event: NodeStreamEvent,
    },
    NodeStop {
        node_id: String,
        result: NodeResult,
    },
    Handoff {
        from_node_ids: Vec<String>,
        to_node_ids: Vec<String>,
        message: Option<String>,
    },
    NodeInterrupt {
        node_id: String,
        interrupt_id: String,
    },
    NodeCancel {
        node_id: String,
    },
    /// Terminal event; always the last one emitted.
    Result {
        result: MultiAgentResult,
    },
}

impl MultiAgentEvent {
    /// The innermost node id carried by this event, when it has one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            MultiAgentEvent::NodeStart { node_id }
            | MultiAgentEvent::NodeStream { node_id, .. }
            | MultiAgentEvent::NodeStop { node_id, .. }
            | MultiAgentEvent::NodeInterrupt { node_id, .. }
            | MultiAgentEvent::NodeCancel { node_id } => Some(node_id),
            MultiAgentEvent::Handoff { .. } | MultiAgentEvent::Result { .. } => None,
        }
    }
}

/// A nested executor: implemented by [`Swarm`] and [`Graph`] so either can be
/// a node of the other.
#[async_trait]
pub trait MultiAgentExecutor: Send + Sync {
    /// Type tag used when this executor's events bubble through a parent.
    fn executor_type(&self) -> &'static str;

    /// Runs to completion, forwarding events through `event_tx`.
    async fn invoke_stream(
        &self,
        prompt: String,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error>;
}

/// What a node of an executor actually is.
#[derive(Clone)]
pub enum NodeExecutor {
    Agent(Arc<Agent>),
    Nested(Arc<dyn MultiAgentExecutor>),
}

impl From<Arc<Agent>> for NodeExecutor {
    fn from(agent: Arc<Agent>) -> Self {
        NodeExecutor::Agent(agent)
    }
}

impl From<Arc<Swarm>> for NodeExecutor {
    fn from(swarm: Arc<Swarm>) -> Self {
        NodeExecutor::Nested(swarm)
    }
}

impl From<Arc<Graph>> for NodeExecutor {
    fn from(graph: Arc<Graph>) -> Self {
        NodeExecutor::Nested(graph)
    }
}

/// Drops blocks that cannot ride in a user message (tool uses without their
/// results) when node content feeds a successor.
pub(crate) fn sanitize_node_content(content: &[ContentBlock]) -> Vec<ContentBlock> {
    content
        .iter()
        .filter(|b| {
            !matches!(
                b,
                ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. }
            )
        })
        .cloned()
        .collect()
}

/// Runs one node to completion, emitting `NodeStart` and forwarding every
/// child event through `out_tx`. The caller emits `NodeStop` so it can
/// sequence stops against dependent starts. Returns the node result plus the
/// usage it consumed.
pub(crate) async fn run_node(
    node_id: &str,
    executor: &NodeExecutor,
    input: AgentInput,
    options: InvokeOptions,
    node_timeout: Option<Duration>,
    out_tx: &mpsc::Sender<MultiAgentEvent>,
) -> (NodeResult, Usage) {
    let started = Instant::now();
    let _ = out_tx
        .send(MultiAgentEvent::NodeStart {
            node_id: node_id.to_string(),
        })
        .await;

    let (result, usage) = match executor {
        NodeExecutor::Agent(agent) => {
            run_agent_node(node_id, agent, input, options, node_timeout, out_tx).await
        }
        NodeExecutor::Nested(child) => {
            run_nested_node(node_id, child.as_ref(), input, options, node_timeout, out_tx).await
        }
    };

    let result = NodeResult {
        node_id: node_id.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
        ..result
    };
    if result.status == NodeStatus::Canceled {
        let _ = out_tx
            .send(MultiAgentEvent::NodeCancel {
                node_id: node_id.to_string(),
            })
            .await;
    }
    (result, usage)
}

async fn run_agent_node(
    node_id: &str,
    agent: &Arc<Agent>,
    input: AgentInput,
    options: InvokeOptions,
    node_timeout: Option<Duration>,
    out_tx: &mpsc::Sender<MultiAgentEvent>,
) -> (NodeResult, Usage) {
    let (agent_tx, mut agent_rx) = mpsc::channel::<AgentEvent>(64);
    let forward = async {
        while let Some(event) = agent_rx.recv().await {
            let _ = out_tx
                .send(MultiAgentEvent::NodeStream {
                    node_id: node_id.to_string(),
                    event: NodeStreamEvent::Agent(event),
                })
                .await;
        }
    };
    let cancellation = options.cancellation.clone();
    let run = async {
        let fut = agent.stream(input, options, agent_tx);
        tokio::pin!(fut);
        match node_timeout {
            Some(limit) => {
                tokio::select! {
                    outcome = &mut fut => outcome,
                    _ = tokio::time::sleep(limit) => {
                        // Cancel and let the loop unwind, so AfterInvocation
                        // still fires inside the node.
                        cancellation.cancel();
                        match fut.await {
                            Ok(result) => Ok(result),
                            Err(Error::Canceled) => Err(Error::Timeout(limit)),
                            Err(e) => Err(e),
                        }
                    }
                }
            }
            None => fut.await,
        }
    };
    let (outcome, ()) = tokio::join!(run, forward);

    let blank = |status: NodeStatus, error: Option<String>| NodeResult {
        node_id: node_id.to_string(),
        status,
        duration_ms: 0,
        content: Vec::new(),
        error,
    };
    match outcome {
        Ok(result) => {
            let usage = result.metrics.usage;
            let content = result
                .last_message
                .as_ref()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            match result.status {
                InvocationStatus::Completed => (
                    NodeResult {
                        content,
                        ..blank(NodeStatus::Completed, None)
                    },
                    usage,
                ),
                InvocationStatus::Interrupted => {
                    for interrupt in &result.interrupts {
                        let _ = out_tx
                            .send(MultiAgentEvent::NodeInterrupt {
                                node_id: node_id.to_string(),
                                interrupt_id: interrupt.id.clone(),
                            })
                            .await;
                    }
                    (
                        NodeResult {
                            content,
                            ..blank(NodeStatus::Interrupted, None)
                        },
                        usage,
                    )
                }
            }
        }
        Err(Error::Canceled) => (blank(NodeStatus::Canceled, Some("canceled".into())), Usage::default()),
        Err(Error::Timeout(limit)) => {
            debug!(node = node_id, ?limit, "node timed out");
            (
                blank(NodeStatus::Interrupted, Some("NodeTimeout".into())),
                Usage::default(),
            )
        }
        Err(e) => (blank(NodeStatus::Failed, Some(e.to_string())), Usage::default()),
    }
}

async fn run_nested_node(
    node_id: &str,
    child: &dyn MultiAgentExecutor,
    input: AgentInput,
    options: InvokeOptions,
    node_timeout: Option<Duration>,
    out_tx: &mpsc::Sender<MultiAgentEvent>,
) -> (NodeResult, Usage) {
    let child_type = child.executor_type();
    let (child_tx, mut child_rx) = mpsc::channel::<MultiAgentEvent>(64);
    let forward = async {
        while let Some(event) = child_rx.recv().await {
            if matches!(event, MultiAgentEvent::Result { .. }) {
                // The child's terminal event folds into this node's stop.
                continue;
            }
            // Preserve the innermost node id; fall back to the reserved
            // nested sentinel when the child event has none.
            let inner_id = event
                .node_id()
                .unwrap_or(NESTED_NODE_ID)
                .to_string();
            let _ = out_tx
                .send(MultiAgentEvent::NodeStream {
                    node_id: inner_id,
                    event: NodeStreamEvent::Nested {
                        child_type,
                        event: Box::new(event),
                    },
                })
                .await;
        }
    };

    let prompt = match input {
        AgentInput::Text(text) => text,
        AgentInput::Blocks(blocks) => blocks
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n"),
        AgentInput::Message(message) => message.text(),
    };
    let cancellation = options.cancellation.clone();
    let run = async {
        let fut = child.invoke_stream(prompt, options, child_tx);
        tokio::pin!(fut);
        match node_timeout {
            Some(limit) => {
                tokio::select! {
                    outcome = &mut fut => outcome,
                    _ = tokio::time::sleep(limit) => {
                        cancellation.cancel();
                        match fut.await {
                            Ok(result) => Ok(result),
                            Err(Error::Canceled) => Err(Error::Timeout(limit)),
                            Err(e) => Err(e),
                        }
                    }
                }
            }
            None => fut.await,
        }
    };
    let (outcome, ()) = tokio::join!(run, forward);

    let blank = |status: NodeStatus, error: Option<String>| NodeResult {
        node_id: node_id.to_string(),
        status,
        duration_ms: 0,
        content: Vec::new(),
        error,
    };
    match outcome {
        Ok(result) => {
            let usage = result.aggregated_usage;
            let status = match result.status {
                MultiAgentStatus::Completed => NodeStatus::Completed,
                MultiAgentStatus::Failed => NodeStatus::Failed,
                MultiAgentStatus::Interrupted => NodeStatus::Interrupted,
                MultiAgentStatus::Canceled => NodeStatus::Canceled,
            };
            (
                NodeResult {
                    content: result.final_content(),
                    ..blank(status, None)
                },
                usage,
            )
        }
        Err(Error::Canceled) => (blank(NodeStatus::Canceled, Some("canceled".into())), Usage::default()),
        Err(Error::Timeout(_)) => (
            blank(NodeStatus::Interrupted, Some("NodeTimeout".into())),
            Usage::default(),
        ),
        Err(e) => (blank(NodeStatus::Failed, Some(e.to_string())), Usage::default()),
    }
}

/// Builds the user-facing input for a dependent node from its predecessors'
/// results, ordered by predecessor id.
pub(crate) fn dependent_input(predecessors: &[(String, Vec<ContentBlock>)]) -> AgentInput {
    let mut blocks: Vec<ContentBlock> = Vec::new();
    for (pred_id, content) in predecessors {
        blocks.push(ContentBlock::text(format!("[{pred_id}]")));
        blocks.extend(sanitize_node_content(content));
    }
    if blocks.is_empty() {
        AgentInput::Message(Message::user(vec![ContentBlock::text(String::new())]))
    } else {
        AgentInput::Blocks(blocks)
    }
}
