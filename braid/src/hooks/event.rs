//! Lifecycle events and their kinds.

use serde_json::Value;

use crate::agent::AgentResult;
use crate::model::{ModelStreamEvent, StopReason};
use crate::types::{ContentBlock, Message, ToolSpec};

/// By-id reference to the agent that produced an event. Payloads carry this
/// handle instead of the agent itself, so events never form structural cycles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentHandle {
    pub agent_id: String,
    pub agent_name: String,
}

/// One lifecycle event, dispatched at a fixed phase of the loop.
#[derive(Clone, Debug)]
pub enum HookEvent {
    /// First invocation on this agent instance, dispatched once.
    Initialized { agent: AgentHandle },
    BeforeInvocation { agent: AgentHandle },
    /// Fires exactly once per invocation, on every exit path.
    AfterInvocation { agent: AgentHandle },
    MessageAdded {
        agent: AgentHandle,
        message: Message,
    },
    BeforeModelCall { agent: AgentHandle },
    AfterModelCall {
        agent: AgentHandle,
        stop_reason: Option<StopReason>,
        error: Option<String>,
    },
    BeforeTools {
        agent: AgentHandle,
        message: Message,
    },
    AfterTools {
        agent: AgentHandle,
        message: Message,
    },
    BeforeToolCall {
        agent: AgentHandle,
        tool_use: ContentBlock,
        tool_spec: Option<ToolSpec>,
    },
    AfterToolCall {
        agent: AgentHandle,
        tool_use: ContentBlock,
        tool_spec: Option<ToolSpec>,
        result: Option<ContentBlock>,
        error: Option<String>,
    },
    /// One transient model stream delta.
    ModelStreamObserver {
        agent: AgentHandle,
        event: ModelStreamEvent,
    },
    /// One fully-assembled content block.
    ContentBlockComplete {
        agent: AgentHandle,
        block: ContentBlock,
    },
    /// The assembled assistant message for one model call.
    ModelMessage {
        agent: AgentHandle,
        message: Message,
        stop_reason: StopReason,
    },
    /// One progress event from a running tool.
    ToolStreamObserver {
        agent: AgentHandle,
        tool_use_id: String,
        data: Value,
    },
    /// A terminal tool result, after retries settled.
    ToolResultReported {
        agent: AgentHandle,
        result: ContentBlock,
    },
    /// The invocation's final result.
    AgentResultProduced {
        agent: AgentHandle,
        result: AgentResult,
    },
}

/// Discriminant for subscription and dispatch routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookEventKind {
    Initialized,
    BeforeInvocation,
    AfterInvocation,
    MessageAdded,
    BeforeModelCall,
    AfterModelCall,
    BeforeTools,
    AfterTools,
    BeforeToolCall,
    AfterToolCall,
    ModelStreamObserver,
    ContentBlockComplete,
    ModelMessage,
    ToolStreamObserver,
    ToolResultReported,
    AgentResultProduced,
}

impl HookEventKind {
    /// `After*` kinds dispatch callbacks in reverse subscription order.
    pub fn is_after(self) -> bool {
        matches!(
            self,
            HookEventKind::AfterInvocation
                | HookEventKind::AfterModelCall
                | HookEventKind::AfterToolCall
                | HookEventKind::AfterTools
        )
    }

    /// Phase component of deterministic interrupt ids.
    pub fn phase_str(self) -> &'static str {
        match self {
            HookEventKind::Initialized => "initialized",
            HookEventKind::BeforeInvocation => "before_invocation",
            HookEventKind::AfterInvocation => "after_invocation",
            HookEventKind::MessageAdded => "message_added",
            HookEventKind::BeforeModelCall => "before_model_call",
            HookEventKind::AfterModelCall => "after_model_call",
            HookEventKind::BeforeTools => "before_tools",
            HookEventKind::AfterTools => "after_tools",
            HookEventKind::BeforeToolCall => "before_tool_call",
            HookEventKind::AfterToolCall => "after_tool_call",
            HookEventKind::ModelStreamObserver => "model_stream_observer",
            HookEventKind::ContentBlockComplete => "content_block_complete",
            HookEventKind::ModelMessage => "model_message",
            HookEventKind::ToolStreamObserver => "tool_stream_observer",
            HookEventKind::ToolResultReported => "tool_result",
            HookEventKind::AgentResultProduced => "agent_result",
        }
    }
}

impl HookEvent {
    pub fn kind(&self) -> HookEventKind {
        match self {
            HookEvent::Initialized { .. } => HookEventKind::Initialized,
            HookEvent::BeforeInvocation { .. } => HookEventKind::BeforeInvocation,
            HookEvent::AfterInvocation { .. } => HookEventKind::AfterInvocation,
            HookEvent::MessageAdded { .. } => HookEventKind::MessageAdded,
            HookEvent::BeforeModelCall { .. } => HookEventKind::BeforeModelCall,
            HookEvent::AfterModelCall { .. } => HookEventKind::AfterModelCall,
            HookEvent::BeforeTools { .. } => HookEventKind::BeforeTools,
            HookEvent::AfterTools { .. } => HookEventKind::AfterTools,
            HookEvent::BeforeToolCall { .. } => HookEventKind::BeforeToolCall,
            HookEvent::AfterToolCall { .. } => HookEventKind::AfterToolCall,
            HookEvent::ModelStreamObserver { .. } => HookEventKind::ModelStreamObserver,
            HookEvent::ContentBlockComplete { .. } => HookEventKind::ContentBlockComplete,
            HookEvent::ModelMessage { .. } => HookEventKind::ModelMessage,
            HookEvent::ToolStreamObserver { .. } => HookEventKind::ToolStreamObserver,
            HookEvent::ToolResultReported { .. } => HookEventKind::ToolResultReported,
            HookEvent::AgentResultProduced { .. } => HookEventKind::AgentResultProduced,
        }
    }

    /// The agent handle carried by every variant.
    pub fn agent(&self) -> &AgentHandle {
        match self {
            HookEvent::Initialized { agent }
            | HookEvent::BeforeInvocation { agent }
            | HookEvent::AfterInvocation { agent }
            | HookEvent::MessageAdded { agent, .. }
            | HookEvent::BeforeModelCall { agent }
            | HookEvent::AfterModelCall { agent, .. }
            | HookEvent::BeforeTools { agent, .. }
            | HookEvent::AfterTools { agent, .. }
            | HookEvent::BeforeToolCall { agent, .. }
            | HookEvent::AfterToolCall { agent, .. }
            | HookEvent::ModelStreamObserver { agent, .. }
            | HookEvent::ContentBlockComplete { agent, .. }
            | HookEvent::ModelMessage { agent, .. }
            | HookEvent::ToolStreamObserver { agent, .. }
            | HookEvent::ToolResultReported { agent, .. }
            | HookEvent::AgentResultProduced { agent, .. } => agent,
        }
    }
}
