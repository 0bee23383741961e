//! Swarm executor: free-form agent-to-agent handoffs through an in-band tool.
//!
//! Every node gets a synthetic `handoff_to_agent` tool. Using it records a
//! pending handoff in the shared context; the swarm pops it between node runs
//! and transfers control. Handoffs, iterations, and wall-clock are all
//! capped; exhausting any cap ends the run with status `Completed`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentInput, InvokeOptions};
use crate::error::Error;
use crate::tools::{Tool, ToolContext, ToolResult, ToolStreamEvent};
use crate::types::{ToolResultContent, ToolSpec, Usage};

use super::{
    run_node, MultiAgentEvent, MultiAgentExecutor, MultiAgentResult, MultiAgentStatus,
    NodeExecutor, NodeResult, NodeStatus,
};

pub const HANDOFF_TOOL_NAME: &str = "handoff_to_agent";

const MAX_HANDOFFS_RANGE: std::ops::RangeInclusive<usize> = 1..=5;

#[derive(Clone, Debug)]
struct PendingHandoff {
    from: String,
    to: String,
    message: Option<String>,
}

#[derive(Clone, Debug)]
struct HandoffRecord {
    from: String,
    to: String,
    message: Option<String>,
}

/// Mutable state shared across the swarm run. Single writer per node: only
/// the currently executing node's handoff tool writes, and node runs are
/// sequential.
#[derive(Debug, Default)]
struct SharedContext {
    contributions: HashMap<String, Value>,
    current_node: String,
    handoff_history: Vec<HandoffRecord>,
    /// Bounded to one entry: only the first handoff per message is honored.
    pending: VecDeque<PendingHandoff>,
    /// When set, further handoffs are refused (final leg after the cap).
    handoffs_disabled: bool,
}

/// The synthetic handoff tool injected into every node's registry.
struct HandoffTool {
    shared: Arc<Mutex<SharedContext>>,
    from: String,
    known_agents: Vec<String>,
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    fn description(&self) -> Option<&str> {
        Some("Hand the conversation off to another agent.")
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: HANDOFF_TOOL_NAME.into(),
            description: Some(format!(
                "Hand the conversation off to another agent. Available agents: {}",
                self.known_agents.join(", ")
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string"},
                    "message": {"type": "string"}
                },
                "required": ["agent_name"]
            }),
        }
    }

    async fn stream(
        &self,
        ctx: ToolContext,
        _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
    ) -> Result<ToolResult, Error> {
        let tool_use_id = ctx.tool_use.tool_use_id.clone();
        let target = match ctx.tool_use.input.get("agent_name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Ok(ToolResult::error(
                    tool_use_id,
                    "input validation failed at /agent_name: missing agent_name",
                ))
            }
        };
        if !self.known_agents.iter().any(|a| a == &target) {
            return Ok(ToolResult::error(
                tool_use_id,
                format!("unknown agent: {target}"),
            ));
        }
        let message = ctx
            .tool_use
            .input
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.handoffs_disabled {
            return Ok(ToolResult::error(tool_use_id, "max handoffs reached"));
        }
        if !shared.pending.is_empty() {
            return Ok(ToolResult::error(tool_use_id, "handoff already in flight"));
        }
        shared.pending.push_back(PendingHandoff {
            from: self.from.clone(),
            to: target.clone(),
            message,
        });
        Ok(ToolResult::success(
            tool_use_id,
            vec![ToolResultContent::text(format!("handing off to {target}"))],
        ))
    }
}

pub struct SwarmBuilder {
    agents: Vec<(String, NodeExecutor)>,
    entry_point: Option<String>,
    max_handoffs: usize,
    max_iterations: usize,
    execution_timeout: Option<Duration>,
    node_timeout: Option<Duration>,
}

impl SwarmBuilder {
    /// Adds a named agent. The name is both the node id and the target of
    /// `handoff_to_agent`.
    pub fn agent(mut self, name: impl Into<String>, agent: Arc<Agent>) -> Self {
        self.agents.push((name.into(), NodeExecutor::Agent(agent)));
        self
    }

    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    pub fn max_handoffs(mut self, max_handoffs: usize) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = Some(timeout);
        self
    }

    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Swarm, Error> {
        if self.agents.is_empty() {
            return Err(Error::validation("swarm requires at least one agent"));
        }
        let mut names = Vec::new();
        for (name, _) in &self.agents {
            if names.contains(name) {
                return Err(Error::validation(format!("duplicate agent name {name:?}")));
            }
            names.push(name.clone());
        }
        let entry_point = self
            .entry_point
            .ok_or_else(|| Error::validation("swarm requires an entry point"))?;
        if !names.contains(&entry_point) {
            return Err(Error::validation(format!(
                "entry point {entry_point:?} is not a registered agent"
            )));
        }
        if !MAX_HANDOFFS_RANGE.contains(&self.max_handoffs) {
            return Err(Error::validation(format!(
                "max_handoffs must be in {}..={}, got {}",
                MAX_HANDOFFS_RANGE.start(),
                MAX_HANDOFFS_RANGE.end(),
                self.max_handoffs
            )));
        }
        Ok(Swarm {
            agents: self.agents.into_iter().collect(),
            agent_names: names,
            entry_point,
            max_handoffs: self.max_handoffs,
            max_iterations: self.max_iterations,
            execution_timeout: self.execution_timeout,
            node_timeout: self.node_timeout,
        })
    }
}

/// Multi-agent executor where transitions are driven by the handoff tool.
pub struct Swarm {
    agents: HashMap<String, NodeExecutor>,
    agent_names: Vec<String>,
    entry_point: String,
    max_handoffs: usize,
    max_iterations: usize,
    execution_timeout: Option<Duration>,
    node_timeout: Option<Duration>,
}

impl Swarm {
    pub fn builder() -> SwarmBuilder {
        SwarmBuilder {
            agents: Vec::new(),
            entry_point: None,
            max_handoffs: 3,
            max_iterations: 20,
            execution_timeout: None,
            node_timeout: None,
        }
    }

    /// Runs the swarm without streaming events.
    pub async fn invoke(
        &self,
        task: impl Into<String>,
        options: InvokeOptions,
    ) -> Result<MultiAgentResult, Error> {
        let (tx, mut rx) = mpsc::channel(64);
        let drain = async {
            while rx.recv().await.is_some() {}
        };
        let (result, ()) = tokio::join!(self.run(task.into(), options, tx), drain);
        result
    }

    /// Runs the swarm, forwarding events through `event_tx`.
    pub async fn stream(
        &self,
        task: impl Into<String>,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error> {
        self.run(task.into(), options, event_tx).await
    }

    async fn run(
        &self,
        task: String,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error> {
        let started = Instant::now();
        let shared = Arc::new(Mutex::new(SharedContext {
            current_node: self.entry_point.clone(),
            ..SharedContext::default()
        }));

        let mut node_results: HashMap<String, NodeResult> = HashMap::new();
        let mut execution_order: Vec<String> = Vec::new();
        let mut aggregated_usage = Usage::default();
        let mut handoff_count = 0usize;
        let mut iteration_count = 0usize;
        let mut status = MultiAgentStatus::Completed;

        loop {
            let current = {
                let shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.current_node.clone()
            };
            let executor = self
                .agents
                .get(&current)
                .ok_or_else(|| Error::validation(format!("unknown swarm node {current:?}")))?;

            let input = self.node_input(&task, &shared);
            let node_token = options.cancellation.child_token();
            let node_options = InvokeOptions {
                cancellation: node_token,
                invocation_state: options.invocation_state.clone(),
                ..InvokeOptions::default()
            };

            let injected = self.inject_handoff_tool(executor, &current, &shared);
            let node_timeout = self.remaining_timeout(started);
            let (result, usage) = run_node(
                &current,
                executor,
                input,
                node_options,
                node_timeout,
                &event_tx,
            )
            .await;
            if injected {
                self.remove_handoff_tool(executor);
            }

            aggregated_usage.add(&usage);
            iteration_count += 1;
            {
                let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                let text: String = result
                    .content
                    .iter()
                    .filter_map(crate::types::ContentBlock::as_text)
                    .collect::<Vec<_>>()
                    .join("");
                shared.contributions.insert(current.clone(), json!(text));
            }
            let node_status = result.status;
            let _ = event_tx
                .send(MultiAgentEvent::NodeStop {
                    node_id: current.clone(),
                    result: result.clone(),
                })
                .await;
            execution_order.push(current.clone());
            node_results.insert(current.clone(), result);

            match node_status {
                NodeStatus::Completed => {}
                NodeStatus::Failed => {
                    status = MultiAgentStatus::Failed;
                    break;
                }
                NodeStatus::Interrupted => {
                    // Covers both a hook interrupt and a node timeout; either
                    // way the swarm stops scheduling. A timeout exits
                    // `Completed` with the node marked interrupted.
                    let timed_out = node_results
                        .get(&current)
                        .and_then(|r| r.error.as_deref())
                        == Some("NodeTimeout");
                    if !timed_out {
                        status = MultiAgentStatus::Interrupted;
                    }
                    break;
                }
                NodeStatus::Canceled => {
                    status = MultiAgentStatus::Canceled;
                    break;
                }
            }

            if iteration_count >= self.max_iterations {
                warn!(iterations = iteration_count, "swarm iteration cap reached");
                break;
            }
            if let Some(limit) = self.execution_timeout {
                if started.elapsed() >= limit {
                    warn!(?limit, "swarm execution timeout reached");
                    break;
                }
            }

            let pending = {
                let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.pending.pop_front()
            };
            let Some(handoff) = pending else {
                break;
            };

            let counted = handoff_count < self.max_handoffs;
            if counted {
                handoff_count += 1;
                let _ = event_tx
                    .send(MultiAgentEvent::Handoff {
                        from_node_ids: vec![handoff.from.clone()],
                        to_node_ids: vec![handoff.to.clone()],
                        message: handoff.message.clone(),
                    })
                    .await;
            }
            {
                let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.handoff_history.push(HandoffRecord {
                    from: handoff.from.clone(),
                    to: handoff.to.clone(),
                    message: handoff.message.clone(),
                });
                shared.current_node = handoff.to.clone();
                if !counted {
                    // The cap is spent: the target still gets one final,
                    // uncounted run with further handoffs refused, so it can
                    // produce a user-facing answer.
                    shared.handoffs_disabled = true;
                }
            }
            debug!(from = %handoff.from, to = %handoff.to, handoff_count, "swarm handoff");
        }

        let result = MultiAgentResult {
            status,
            node_results,
            execution_order,
            execution_time_ms: started.elapsed().as_millis() as u64,
            aggregated_usage,
        };
        let _ = event_tx
            .send(MultiAgentEvent::Result {
                result: result.clone(),
            })
            .await;
        Ok(result)
    }

    /// First run gets the task; handed-off runs get the task plus a rendered
    /// view of the shared context (contributions and handoff history).
    fn node_input(&self, task: &str, shared: &Arc<Mutex<SharedContext>>) -> AgentInput {
        let shared = shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.handoff_history.is_empty() {
            return AgentInput::Text(task.to_string());
        }
        let mut rendered = format!("Task: {task}\n\nHandoff history:");
        for record in &shared.handoff_history {
            match &record.message {
                Some(message) => {
                    rendered.push_str(&format!(
                        "\n- {} -> {}: {}",
                        record.from, record.to, message
                    ));
                }
                None => rendered.push_str(&format!("\n- {} -> {}", record.from, record.to)),
            }
        }
        if !shared.contributions.is_empty() {
            rendered.push_str("\n\nContributions so far:");
            let mut ids: Vec<_> = shared.contributions.keys().collect();
            ids.sort();
            for id in ids {
                if let Some(Value::String(text)) = shared.contributions.get(id) {
                    if !text.is_empty() {
                        rendered.push_str(&format!("\n[{id}] {text}"));
                    }
                }
            }
        }
        AgentInput::Text(rendered)
    }

    fn inject_handoff_tool(
        &self,
        executor: &NodeExecutor,
        current: &str,
        shared: &Arc<Mutex<SharedContext>>,
    ) -> bool {
        let NodeExecutor::Agent(agent) = executor else {
            return false;
        };
        let peers: Vec<String> = self
            .agent_names
            .iter()
            .filter(|n| n.as_str() != current)
            .cloned()
            .collect();
        agent
            .tools()
            .add(Arc::new(HandoffTool {
                shared: Arc::clone(shared),
                from: current.to_string(),
                known_agents: peers,
            }))
            .is_ok()
    }

    fn remove_handoff_tool(&self, executor: &NodeExecutor) {
        if let NodeExecutor::Agent(agent) = executor {
            agent.tools().remove_by_name(HANDOFF_TOOL_NAME);
        }
    }

    fn remaining_timeout(&self, started: Instant) -> Option<Duration> {
        let remaining_exec = self
            .execution_timeout
            .map(|limit| limit.saturating_sub(started.elapsed()));
        match (self.node_timeout, remaining_exec) {
            (Some(node), Some(exec)) => Some(node.min(exec)),
            (Some(node), None) => Some(node),
            (None, Some(exec)) => Some(exec),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl MultiAgentExecutor for Swarm {
    fn executor_type(&self) -> &'static str {
        "swarm"
    }

    async fn invoke_stream(
        &self,
        prompt: String,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error> {
        self.run(prompt, options, event_tx).await
    }
}
