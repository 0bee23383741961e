//! One agent: a model, its tools, hooks, and message history, driven by the
//! event loop.
//!
//! An [`Agent`] lives across many invocations; its history grows
//! monotonically. Each invocation is strictly sequential; concurrency in a
//! run only ever comes from the graph executor scheduling independent agents.

mod event_loop;
mod options;
mod result;
mod structured_output;

pub use options::{AgentInput, InvokeOptions};
pub use result::{AgentResult, EventLoopMetrics, InvocationStatus};
pub use structured_output::{StructuredOutputConfig, StructuredOutputContext};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::conversation::{ConversationManager, NullConversationManager};
use crate::error::Error;
use crate::hooks::{AgentHandle, DispatchOutcome, HookContext, HookEvent, HookRegistry};
use crate::interrupt::InterruptState;
use crate::model::{ModelProvider, ModelStreamEvent};
use crate::tools::ToolRegistry;
use crate::types::{ContentBlock, Message};

/// Consumer-facing event emitted while an invocation runs.
#[derive(Clone, Debug)]
pub enum AgentEvent {
    /// Transient model stream delta.
    ModelDelta(ModelStreamEvent),
    /// Fully assembled content block.
    BlockComplete(ContentBlock),
    /// Progress event from a running tool.
    ToolProgress { tool_use_id: String, data: Value },
}

pub struct Agent {
    id: String,
    name: String,
    system_prompt: Option<String>,
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    hooks: Arc<HookRegistry>,
    conversation_manager: Arc<dyn ConversationManager>,
    messages: tokio::sync::Mutex<Vec<Message>>,
    interrupts: Arc<Mutex<InterruptState>>,
    initialized: AtomicBool,
    in_flight: AtomicBool,
    max_tool_retries: usize,
    max_model_retries: usize,
}

pub struct AgentBuilder {
    id: Option<String>,
    name: String,
    system_prompt: Option<String>,
    model: Option<Arc<dyn ModelProvider>>,
    tools: Arc<ToolRegistry>,
    hooks: Arc<HookRegistry>,
    conversation_manager: Arc<dyn ConversationManager>,
    max_tool_retries: usize,
    max_model_retries: usize,
}

impl AgentBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn conversation_manager(mut self, manager: Arc<dyn ConversationManager>) -> Self {
        self.conversation_manager = manager;
        self
    }

    pub fn max_tool_retries(mut self, retries: usize) -> Self {
        self.max_tool_retries = retries;
        self
    }

    pub fn max_model_retries(mut self, retries: usize) -> Self {
        self.max_model_retries = retries;
        self
    }

    pub fn build(self) -> Result<Agent, Error> {
        let model = self
            .model
            .ok_or_else(|| Error::validation("agent requires a model provider"))?;
        Ok(Agent {
            id: self
                .id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name,
            system_prompt: self.system_prompt,
            model,
            tools: self.tools,
            hooks: self.hooks,
            conversation_manager: self.conversation_manager,
            messages: tokio::sync::Mutex::new(Vec::new()),
            interrupts: Arc::new(Mutex::new(InterruptState::default())),
            initialized: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            max_tool_retries: self.max_tool_retries,
            max_model_retries: self.max_model_retries,
        })
    }
}

/// Releases the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder {
            id: None,
            name: "agent".into(),
            system_prompt: None,
            model: None,
            tools: Arc::new(ToolRegistry::new()),
            hooks: Arc::new(HookRegistry::new()),
            conversation_manager: Arc::new(NullConversationManager),
            max_tool_retries: 3,
            max_model_retries: 3,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
        }
    }

    /// Snapshot of the message history.
    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    /// Pending interrupts from the last invocation.
    pub fn pending_interrupts(&self) -> Vec<crate::interrupt::Interrupt> {
        let state = self.interrupts.lock().unwrap_or_else(|e| e.into_inner());
        state.pending().into_iter().cloned().collect()
    }

    /// Runs one invocation to completion without streaming events.
    pub async fn invoke(
        &self,
        input: impl Into<AgentInput>,
        options: InvokeOptions,
    ) -> Result<AgentResult, Error> {
        self.run(Some(input.into()), options, None).await
    }

    /// Runs one invocation, forwarding events through `event_tx` as they occur.
    pub async fn stream(
        &self,
        input: impl Into<AgentInput>,
        options: InvokeOptions,
        event_tx: mpsc::Sender<AgentEvent>,
    ) -> Result<AgentResult, Error> {
        self.run(Some(input.into()), options, Some(event_tx)).await
    }

    /// Stores interrupt responses and re-enters the loop at the phase that
    /// paused. No new prompt is appended; the hook that raised each interrupt
    /// re-runs and now receives its response.
    pub async fn resume(
        &self,
        responses: HashMap<String, Value>,
        options: InvokeOptions,
        event_tx: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentResult, Error> {
        {
            let mut state = self.interrupts.lock().unwrap_or_else(|e| e.into_inner());
            state.resume(responses);
        }
        self.run(None, options, event_tx).await
    }

    async fn run(
        &self,
        input: Option<AgentInput>,
        options: InvokeOptions,
        event_tx: Option<mpsc::Sender<AgentEvent>>,
    ) -> Result<AgentResult, Error> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ConcurrentInvocation);
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.dispatch(HookEvent::BeforeInvocation {
            agent: self.handle(),
        })
        .await?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.dispatch(HookEvent::Initialized {
                agent: self.handle(),
            })
            .await?;
        }

        let outcome = event_loop::run(self, input, &options, event_tx.as_ref()).await;

        // AgentResultProduced fires on the completed path, before the
        // invocation unwinds.
        let outcome = match outcome {
            Ok(result) if result.status == InvocationStatus::Completed => {
                match self
                    .dispatch(HookEvent::AgentResultProduced {
                        agent: self.handle(),
                        result: result.clone(),
                    })
                    .await
                {
                    Ok(_) => Ok(result),
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        // AfterInvocation fires exactly once per invocation, on every exit
        // path. A failure here must not mask the loop's own error.
        let after = self
            .dispatch(HookEvent::AfterInvocation {
                agent: self.handle(),
            })
            .await;
        let result = match (outcome, after) {
            (Ok(result), Ok(_)) => result,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), _) => {
                debug!(agent = %self.name, error = %e, "invocation failed");
                return Err(e);
            }
        };

        if result.status == InvocationStatus::Completed {
            let mut state = self.interrupts.lock().unwrap_or_else(|e| e.into_inner());
            state.clear_answered();
        }
        Ok(result)
    }

    pub(crate) async fn dispatch(&self, event: HookEvent) -> Result<DispatchOutcome, Error> {
        let tool_use_id = match &event {
            HookEvent::BeforeToolCall { tool_use, .. }
            | HookEvent::AfterToolCall { tool_use, .. } => match tool_use {
                ContentBlock::ToolUse { tool_use_id, .. } => Some(tool_use_id.clone()),
                _ => None,
            },
            HookEvent::ToolStreamObserver { tool_use_id, .. } => Some(tool_use_id.clone()),
            _ => None,
        };
        let ctx = HookContext::new(event.kind(), tool_use_id, Arc::clone(&self.interrupts));
        self.hooks.dispatch(&event, &ctx).await
    }

    pub(crate) fn model(&self) -> &Arc<dyn ModelProvider> {
        &self.model
    }

    pub(crate) fn conversation_manager(&self) -> &Arc<dyn ConversationManager> {
        &self.conversation_manager
    }

    pub(crate) fn messages_mutex(&self) -> &tokio::sync::Mutex<Vec<Message>> {
        &self.messages
    }

    pub(crate) fn interrupt_state(&self) -> &Arc<Mutex<InterruptState>> {
        &self.interrupts
    }

    pub(crate) fn max_tool_retries(&self) -> usize {
        self.max_tool_retries
    }

    pub(crate) fn max_model_retries(&self) -> usize {
        self.max_model_retries
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .finish()
    }
}
