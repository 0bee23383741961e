//! # Braid
//!
//! A multi-agent orchestration runtime: compose LLM-driven agents into
//! coordinated executions (a single agent, a free-form **swarm** with
//! handoffs, or a static **graph** with parallel branches) while streaming
//! fine-grained lifecycle and content events to the consumer in real time.
//!
//! ## Design principles
//!
//! - **One sequential loop per agent**: the event loop alternates model and
//!   tool phases; concurrency only enters at the graph node boundary.
//! - **Hooks at every phase**: typed subscribe/dispatch with `After*` phases
//!   in reverse order; every `Before*` pairs with its `After*` on all exit
//!   paths.
//! - **Failures are data where possible**: tool and model errors become
//!   error-status tool results; only infrastructure failures abort a run.
//! - **Deterministic pauses**: interrupts have ids that are pure functions of
//!   their call site, so resuming is idempotent.
//!
//! ## Main modules
//!
//! - [`types`]: [`Message`], [`ContentBlock`], [`ToolSpec`], [`Usage`]: the
//!   value model everything else speaks.
//! - [`hooks`]: [`HookRegistry`], [`HookEvent`], [`HookOutcome`]: lifecycle
//!   subscription and dispatch.
//! - [`tools`]: [`Tool`], [`ToolRegistry`], [`FunctionTool`], the
//!   schema-validating [`tool`] factory, [`AgentTool`].
//! - [`model`]: [`ModelProvider`], [`ModelStreamEvent`], the
//!   [`MessageAggregator`], and the scripted [`MockModel`].
//! - [`interrupt`]: [`Interrupt`], [`InterruptState`]: deterministic
//!   human-in-the-loop pause tokens.
//! - [`agent`]: [`Agent`], [`AgentResult`], [`InvokeOptions`],
//!   [`StructuredOutputConfig`]: the single-agent event loop.
//! - [`conversation`]: [`ConversationManager`] policies consulted on context
//!   overflow.
//! - [`multiagent`]: [`Swarm`], [`Graph`], [`MultiAgentEvent`],
//!   [`MultiAgentResult`]: the executors and the stream merger.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use braid::{Agent, InvokeOptions, MockModel, StopReason};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), braid::Error> {
//! let model = Arc::new(MockModel::new("mock-1"));
//! model.enqueue_text("hello back", StopReason::EndTurn);
//!
//! let agent = Agent::builder()
//!     .name("greeter")
//!     .model(model)
//!     .build()?;
//! let result = agent.invoke("hello", InvokeOptions::default()).await?;
//! println!("{}", result.text());
//! # Ok(())
//! # }
//! ```
//!
//! Events stream over plain `tokio::sync::mpsc` channels: pass a sender to
//! [`Agent::stream`], [`Swarm::stream`], or [`Graph::stream`] and read typed
//! events while the run progresses. The `wire-event` crate defines the JSON
//! and SSE shapes of those events; the `serve` crate puts them on the wire.

pub mod agent;
pub mod conversation;
pub mod error;
pub mod hooks;
pub mod interrupt;
pub mod model;
pub mod multiagent;
pub mod tools;
pub mod types;
pub mod wire;

pub use agent::{
    Agent, AgentBuilder, AgentEvent, AgentInput, AgentResult, EventLoopMetrics,
    InvocationStatus, InvokeOptions, StructuredOutputConfig,
};
pub use conversation::{
    ConversationManager, NullConversationManager, SlidingWindowConversationManager,
};
pub use error::Error;
pub use hooks::{
    AgentHandle, DispatchOutcome, HookCallback, HookContext, HookEvent, HookEventKind,
    HookOutcome, HookRegistry,
};
pub use interrupt::{interrupt_id, Interrupt, InterruptState};
pub use model::{
    ContentBlockDelta, ContentBlockStart, MessageAggregator, MockModel, ModelEventStream,
    ModelProvider, ModelRequest, ModelStreamEvent, StopReason, ToolChoice, ToolUseStart,
};
pub use multiagent::{
    Graph, GraphBuilder, MultiAgentEvent, MultiAgentExecutor, MultiAgentResult,
    MultiAgentStatus, NodeExecutor, NodeResult, NodeStatus, NodeStreamEvent, Swarm,
    SwarmBuilder, HANDOFF_TOOL_NAME, NESTED_NODE_ID,
};
pub use tools::{
    tool, AgentTool, FunctionTool, SchemaTool, Tool, ToolContext, ToolDef, ToolRegistry,
    ToolResult, ToolStreamEvent, ToolUse,
};
pub use types::{
    ContentBlock, MediaSource, Message, Role, ToolResultContent, ToolResultStatus, ToolSpec,
    Usage,
};

/// When running `cargo test -p braid`, initializes tracing from `RUST_LOG` so
/// unit tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
