//! Graph executor: a static DAG of agent nodes with parallel branches.
//!
//! Validation happens at build time (unique ids, known endpoints, acyclic via
//! Kahn's sort, entry points non-empty and reachable coverage). Execution
//! starts every ready node concurrently; a node waits for all predecessors
//! and receives their results, ordered by predecessor id. A failed node
//! prunes its descendants without running them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::agent::{AgentInput, InvokeOptions};
use crate::error::Error;
use crate::types::{ContentBlock, Usage};

use super::{
    dependent_input, run_node, MultiAgentEvent, MultiAgentExecutor, MultiAgentResult,
    MultiAgentStatus, NodeExecutor, NodeResult, NodeStatus,
};

pub struct GraphBuilder {
    nodes: Vec<(String, NodeExecutor)>,
    edges: Vec<(String, String)>,
    entry_points: Vec<String>,
}

impl GraphBuilder {
    pub fn add_node(mut self, id: impl Into<String>, node: impl Into<NodeExecutor>) -> Self {
        self.nodes.push((id.into(), node.into()));
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    pub fn entry_point(mut self, id: impl Into<String>) -> Self {
        self.entry_points.push(id.into());
        self
    }

    pub fn build(self) -> Result<Graph, Error> {
        let mut nodes: HashMap<String, NodeExecutor> = HashMap::new();
        for (id, node) in self.nodes {
            if nodes.insert(id.clone(), node).is_some() {
                return Err(Error::validation(format!("duplicate node id {id:?}")));
            }
        }
        if nodes.is_empty() {
            return Err(Error::validation("graph requires at least one node"));
        }

        let mut edges: Vec<(String, String)> = Vec::new();
        for (from, to) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(Error::validation(format!("edge from unknown node {from:?}")));
            }
            if !nodes.contains_key(&to) {
                return Err(Error::validation(format!("edge to unknown node {to:?}")));
            }
            if from == to {
                return Err(Error::validation(format!("self edge on node {from:?}")));
            }
            if !edges.contains(&(from.clone(), to.clone())) {
                edges.push((from, to));
            }
        }

        if self.entry_points.is_empty() {
            return Err(Error::validation("graph requires at least one entry point"));
        }
        for entry in &self.entry_points {
            if !nodes.contains_key(entry) {
                return Err(Error::validation(format!(
                    "entry point {entry:?} is not a node"
                )));
            }
        }

        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &edges {
            successors.entry(from.clone()).or_default().push(to.clone());
            predecessors.entry(to.clone()).or_default().push(from.clone());
        }
        for preds in predecessors.values_mut() {
            preds.sort();
        }

        for entry in &self.entry_points {
            if predecessors.contains_key(entry) {
                return Err(Error::validation(format!(
                    "entry point {entry:?} has predecessors"
                )));
            }
        }

        // Kahn's sort must cover every node, otherwise there is a cycle.
        let mut indegree: HashMap<&str, usize> = nodes
            .keys()
            .map(|id| (id.as_str(), predecessors.get(id).map(Vec::len).unwrap_or(0)))
            .collect();
        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut covered = 0usize;
        while let Some(id) = queue.pop_front() {
            covered += 1;
            for succ in successors.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                let d = indegree
                    .get_mut(succ.as_str())
                    .expect("validated edge endpoint");
                *d -= 1;
                if *d == 0 {
                    queue.push_back(succ.as_str());
                }
            }
        }
        if covered != nodes.len() {
            return Err(Error::validation("graph contains a cycle"));
        }

        // Every node must be reachable from the entry set, or it would never
        // run.
        let mut reachable: HashSet<&str> = HashSet::new();
        let mut frontier: VecDeque<&str> =
            self.entry_points.iter().map(String::as_str).collect();
        while let Some(id) = frontier.pop_front() {
            if !reachable.insert(id) {
                continue;
            }
            for succ in successors.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                frontier.push_back(succ.as_str());
            }
        }
        if reachable.len() != nodes.len() {
            let mut orphans: Vec<&str> = nodes
                .keys()
                .map(String::as_str)
                .filter(|id| !reachable.contains(id))
                .collect();
            orphans.sort();
            return Err(Error::validation(format!(
                "nodes not reachable from entry points: {}",
                orphans.join(", ")
            )));
        }

        Ok(Graph {
            nodes,
            successors,
            predecessors,
            entry_points: self.entry_points,
        })
    }
}

/// Multi-agent executor over a validated DAG.
pub struct Graph {
    nodes: HashMap<String, NodeExecutor>,
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
    entry_points: Vec<String>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder {
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_points: Vec::new(),
        }
    }

    /// Runs the graph without streaming events.
    pub async fn invoke(
        &self,
        prompt: impl Into<String>,
        options: InvokeOptions,
    ) -> Result<MultiAgentResult, Error> {
        let (tx, mut rx) = mpsc::channel(64);
        let drain = async {
            while rx.recv().await.is_some() {}
        };
        let (result, ()) = tokio::join!(self.run(prompt.into(), options, tx), drain);
        result
    }

    /// Runs the graph, forwarding events through `event_tx`.
    pub async fn stream(
        &self,
        prompt: impl Into<String>,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error> {
        self.run(prompt.into(), options, event_tx).await
    }

    async fn run(
        &self,
        prompt: String,
        options: InvokeOptions,
        event_tx: mpsc::Sender<MultiAgentEvent>,
    ) -> Result<MultiAgentResult, Error> {
        let started = Instant::now();
        let mut join_set: JoinSet<(String, NodeResult, Usage)> = JoinSet::new();
        let mut pending_inputs: HashMap<String, Vec<(String, Vec<ContentBlock>)>> = HashMap::new();
        let mut node_results: HashMap<String, NodeResult> = HashMap::new();
        let mut execution_order: Vec<String> = Vec::new();
        let mut aggregated_usage = Usage::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut stop_scheduling = false;
        let mut any_failed = false;
        let mut any_interrupted = false;
        let mut any_canceled = false;

        for entry in &self.entry_points {
            self.spawn_node(
                &mut join_set,
                entry.clone(),
                AgentInput::Text(prompt.clone()),
                &options,
                &event_tx,
            );
        }

        while let Some(joined) = join_set.join_next().await {
            let (node_id, result, usage) = match joined {
                Ok(tuple) => tuple,
                Err(e) => {
                    warn!(error = %e, "graph node task panicked or was aborted");
                    any_failed = true;
                    stop_scheduling = true;
                    continue;
                }
            };
            aggregated_usage.add(&usage);
            let _ = event_tx
                .send(MultiAgentEvent::NodeStop {
                    node_id: node_id.clone(),
                    result: result.clone(),
                })
                .await;
            execution_order.push(node_id.clone());
            let status = result.status;
            let content = result.content.clone();
            node_results.insert(node_id.clone(), result);

            match status {
                NodeStatus::Completed => {
                    if !stop_scheduling {
                        self.unblock_successors(
                            &node_id,
                            content,
                            &mut pending_inputs,
                            &blocked,
                            &mut join_set,
                            &options,
                            &event_tx,
                        );
                    }
                }
                NodeStatus::Failed => {
                    any_failed = true;
                    self.fail_descendants(&node_id, &mut blocked, &mut node_results);
                }
                NodeStatus::Interrupted => {
                    any_interrupted = true;
                    stop_scheduling = true;
                }
                NodeStatus::Canceled => {
                    any_canceled = true;
                    stop_scheduling = true;
                }
            }
        }

        let status = if any_canceled {
            MultiAgentStatus::Canceled
        } else if any_failed {
            MultiAgentStatus::Failed
        } else if any_interrupted {
            MultiAgentStatus::Interrupted
        } else {
            MultiAgentStatus::Completed
        };
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

    fn spawn_node(
        &self,
        join_set: &mut JoinSet<(String, NodeResult, Usage)>,
        node_id: String,
        input: AgentInput,
        options: &InvokeOptions,
        event_tx: &mpsc::Sender<MultiAgentEvent>,
    ) {
        let executor = self
            .nodes
            .get(&node_id)
            .expect("validated node id")
            .clone();
        let node_options = InvokeOptions {
            cancellation: options.cancellation.clone(),
            invocation_state: options.invocation_state.clone(),
            ..InvokeOptions::default()
        };
        let event_tx = event_tx.clone();
        debug!(node = %node_id, "graph node ready");
        join_set.spawn(async move {
            let (result, usage) =
                run_node(&node_id, &executor, input, node_options, None, &event_tx).await;
            (node_id, result, usage)
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn unblock_successors(
        &self,
        node_id: &str,
        content: Vec<ContentBlock>,
        pending_inputs: &mut HashMap<String, Vec<(String, Vec<ContentBlock>)>>,
        blocked: &HashSet<String>,
        join_set: &mut JoinSet<(String, NodeResult, Usage)>,
        options: &InvokeOptions,
        event_tx: &mpsc::Sender<MultiAgentEvent>,
    ) {
        let successors = match self.successors.get(node_id) {
            Some(s) => s.clone(),
            None => return,
        };
        for succ in successors {
            if blocked.contains(&succ) {
                continue;
            }
            let inputs = pending_inputs.entry(succ.clone()).or_default();
            inputs.push((node_id.to_string(), content.clone()));
            let expected = self
                .predecessors
                .get(&succ)
                .map(Vec::len)
                .unwrap_or(0);
            if inputs.len() == expected {
                let mut inputs = pending_inputs.remove(&succ).unwrap_or_default();
                // Deterministic input order regardless of finish order.
                inputs.sort_by(|a, b| a.0.cmp(&b.0));
                let input = dependent_input(&inputs);
                self.spawn_node(join_set, succ, input, options, event_tx);
            }
        }
    }

    /// Marks every descendant of a failed node as failed without running it.
    fn fail_descendants(
        &self,
        from: &str,
        blocked: &mut HashSet<String>,
        node_results: &mut HashMap<String, NodeResult>,
    ) {
        let mut frontier: VecDeque<&str> = VecDeque::new();
        frontier.push_back(from);
        while let Some(id) = frontier.pop_front() {
            for succ in self.successors.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                if blocked.insert(succ.clone()) {
                    node_results.insert(
                        succ.clone(),
                        NodeResult {
                            node_id: succ.clone(),
                            status: NodeStatus::Failed,
                            duration_ms: 0,
                            content: Vec::new(),
                            error: Some(format!("ancestor {from} failed")),
                        },
                    );
                    frontier.push_back(succ.as_str());
                }
            }
        }
    }
}

#[async_trait]
impl MultiAgentExecutor for Graph {
    fn executor_type(&self) -> &'static str {
        "graph"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::model::{MockModel, StopReason};
    use std::sync::Arc;

    fn trivial_agent(reply: &str) -> Arc<Agent> {
        let model = Arc::new(MockModel::new("mock"));
        model.enqueue_text(reply, StopReason::EndTurn);
        Arc::new(Agent::builder().model(model).build().unwrap())
    }

    /// **Scenario**: A cycle is rejected at build time.
    #[test]
    fn build_rejects_cycle() {
        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .add_node("b", trivial_agent("b"))
            .add_node("c", trivial_agent("c"))
            .add_edge("a", "b")
            .add_edge("b", "c")
            .add_edge("c", "b")
            .entry_point("a")
            .build()
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("cycle"));
    }

    /// **Scenario**: Edges referencing unknown nodes are rejected.
    #[test]
    fn build_rejects_unknown_edge_endpoint() {
        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .add_edge("a", "ghost")
            .entry_point("a")
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    /// **Scenario**: Duplicate node ids are rejected.
    #[test]
    fn build_rejects_duplicate_node() {
        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .add_node("a", trivial_agent("a2"))
            .entry_point("a")
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    /// **Scenario**: Missing entry points and unreachable nodes are rejected.
    #[test]
    fn build_rejects_missing_entry_and_unreachable() {
        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("entry point"));

        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .add_node("island", trivial_agent("x"))
            .entry_point("a")
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("island"));
    }

    /// **Scenario**: A self-edge (a node as its own ancestor) is rejected.
    #[test]
    fn build_rejects_self_edge() {
        let err = Graph::builder()
            .add_node("a", trivial_agent("a"))
            .add_edge("a", "a")
            .entry_point("a")
            .build()
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("self edge"));
    }
}
