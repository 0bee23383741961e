//! The agent event loop: model call, tool batch, retries, interrupts,
//! cancellation.
//!
//! One invocation alternates between the model phase and the tool phase until
//! a terminal stop reason. Every phase boundary dispatches its hook event,
//! and every `Before*` is paired with its `After*` on all exit paths. The
//! cancellation token and deadline are checked at every suspension point:
//! before each dispatch, between model stream items, and between tool calls.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::hooks::HookEvent;
use crate::model::{MessageAggregator, ModelRequest, StopReason, ToolChoice};
use crate::tools::{ToolContext, ToolResult, ToolUse};
use crate::types::{ContentBlock, Message};

use super::options::{AgentInput, InvokeOptions};
use super::result::{AgentResult, EventLoopMetrics, InvocationStatus};
use super::structured_output::StructuredOutputContext;
use super::{Agent, AgentEvent};

/// Cancellation and deadline, checked at every suspension point.
struct LoopCtl {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl LoopCtl {
    fn new(options: &InvokeOptions, started: Instant) -> Self {
        Self {
            cancellation: options.cancellation.clone(),
            deadline: options.timeout.map(|t| started + t),
            timeout: options.timeout,
        }
    }

    fn check(&self) -> Result<(), Error> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(self.timeout.unwrap_or_default()));
            }
        }
        Ok(())
    }
}

enum Phase {
    Model,
    Tools(Message),
}

struct LoopState<'a> {
    agent: &'a Agent,
    options: &'a InvokeOptions,
    event_tx: Option<&'a mpsc::Sender<AgentEvent>>,
    ctl: LoopCtl,
    structured: Option<StructuredOutputContext>,
    metrics: EventLoopMetrics,
    /// Tool choice for the next model call only (structured-output forcing).
    next_tool_choice: Option<ToolChoice>,
    /// Tool uses whose input failed JSON parsing, with the message to report.
    invalid_inputs: Vec<(String, String)>,
}

/// Entry point called by `Agent::run` between `BeforeInvocation` and
/// `AfterInvocation`.
pub(super) async fn run(
    agent: &Agent,
    input: Option<AgentInput>,
    options: &InvokeOptions,
    event_tx: Option<&mpsc::Sender<AgentEvent>>,
) -> Result<AgentResult, Error> {
    let started = Instant::now();
    let structured = match options.structured_output.clone() {
        Some(config) => {
            let ctx = StructuredOutputContext::new(config)?;
            ctx.register(agent.tools());
            Some(ctx)
        }
        None => None,
    };

    let mut state = LoopState {
        agent,
        options,
        event_tx,
        ctl: LoopCtl::new(options, started),
        structured,
        metrics: EventLoopMetrics {
            model_id: agent.model().model_id().to_string(),
            ..Default::default()
        },
        next_tool_choice: None,
        invalid_inputs: Vec::new(),
    };

    let outcome = drive(&mut state, input).await;
    if let Some(s) = &state.structured {
        s.deregister(agent.tools());
    }

    let mut metrics = state.metrics;
    metrics.execution_time_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(stop_reason) => {
            let structured_output = state.structured.as_mut().and_then(|s| s.take_value());
            if state.structured.is_some() && structured_output.is_none() {
                return Err(Error::StructuredOutput(
                    "model did not produce a structured output value".into(),
                ));
            }
            let last_message = agent.messages_mutex().lock().await.last().cloned();
            Ok(AgentResult {
                status: InvocationStatus::Completed,
                stop_reason: Some(stop_reason),
                last_message,
                metrics,
                structured_output,
                interrupts: Vec::new(),
            })
        }
        Err(Error::Interrupt(_)) => {
            let interrupts = agent.pending_interrupts();
            let last_message = agent.messages_mutex().lock().await.last().cloned();
            debug!(agent = %agent.name(), pending = interrupts.len(), "invocation paused");
            Ok(AgentResult {
                status: InvocationStatus::Interrupted,
                stop_reason: None,
                last_message,
                metrics,
                structured_output: None,
                interrupts,
            })
        }
        Err(e) => Err(e),
    }
}

async fn drive(state: &mut LoopState<'_>, input: Option<AgentInput>) -> Result<StopReason, Error> {
    if let Some(input) = input {
        push_message(state, input.into_message()).await?;
    }

    let mut phase = initial_phase(state.agent).await;
    loop {
        state.ctl.check()?;
        match phase {
            Phase::Model => {
                let (message, stop_reason) = model_phase(state).await?;
                match stop_reason {
                    StopReason::ToolUse => phase = Phase::Tools(message),
                    StopReason::ContextWindowExceeded => {
                        reduce_context(state, Error::ContextWindowOverflow).await?;
                        phase = Phase::Model;
                    }
                    StopReason::MaxTokens => {
                        state.metrics.error_kind = Some(Error::MaxTokens.kind().to_string());
                        return Ok(StopReason::MaxTokens);
                    }
                    terminal => {
                        // Structured output with no tool use: force once, then
                        // give up.
                        let force = match state.structured.as_mut() {
                            Some(s) => {
                                if s.take_force_attempt() {
                                    Some((s.prompt().to_string(), s.forced_choice()))
                                } else {
                                    None
                                }
                            }
                            None => None,
                        };
                        if let Some((prompt, choice)) = force {
                            state.next_tool_choice = Some(choice);
                            push_message(state, Message::user_text(prompt)).await?;
                            phase = Phase::Model;
                            continue;
                        }
                        return Ok(terminal);
                    }
                }
            }
            Phase::Tools(message) => {
                let stop_loop = tool_phase(state, &message).await?;
                if stop_loop {
                    return Ok(StopReason::ToolUse);
                }
                phase = Phase::Model;
            }
        }
    }
}

/// On resume, the last assistant message may carry a tool batch that never
/// got its results; re-enter the tool phase directly in that case.
async fn initial_phase(agent: &Agent) -> Phase {
    let messages = agent.messages_mutex().lock().await;
    match messages.last() {
        Some(message) if message.role == crate::types::Role::Assistant => {
            if message.content.iter().any(ContentBlock::is_tool_use) {
                return Phase::Tools(message.clone());
            }
            Phase::Model
        }
        _ => Phase::Model,
    }
}

async fn push_message(state: &mut LoopState<'_>, message: Message) -> Result<(), Error> {
    {
        let mut messages = state.agent.messages_mutex().lock().await;
        messages.push(message.clone());
    }
    state
        .agent
        .dispatch(HookEvent::MessageAdded {
            agent: state.agent.handle(),
            message,
        })
        .await?;
    Ok(())
}

async fn reduce_context(state: &mut LoopState<'_>, cause: Error) -> Result<(), Error> {
    let manager = state.agent.conversation_manager().clone();
    let mut messages = state.agent.messages_mutex().lock().await;
    let reduced = manager.reduce_context(&mut messages, &cause).await?;
    if !reduced {
        return Err(cause);
    }
    debug!(agent = %state.agent.name(), "conversation manager reduced context");
    Ok(())
}

async fn emit(state: &LoopState<'_>, event: AgentEvent) {
    if let Some(tx) = state.event_tx {
        let _ = tx.send(event).await;
    }
}

/// One model phase: `BeforeModelCall`, the streamed call, message assembly and
/// append, `AfterModelCall`, bounded retry.
async fn model_phase(state: &mut LoopState<'_>) -> Result<(Message, StopReason), Error> {
    let mut attempts = 0usize;
    loop {
        state.ctl.check()?;
        let before = state
            .agent
            .dispatch(HookEvent::BeforeModelCall {
                agent: state.agent.handle(),
            })
            .await?;

        match stream_model_call(state).await {
            Ok((message, stop_reason)) => {
                // ModelMessage and MessageAdded may themselves interrupt;
                // AfterModelCall still pairs with BeforeModelCall below.
                let appended: Result<(), Error> = {
                    match state
                        .agent
                        .dispatch(HookEvent::ModelMessage {
                            agent: state.agent.handle(),
                            message: message.clone(),
                            stop_reason,
                        })
                        .await
                    {
                        Ok(_) => push_message(state, message.clone()).await,
                        Err(e) => Err(e),
                    }
                };
                if let Err(e) = appended {
                    state
                        .agent
                        .dispatch(HookEvent::AfterModelCall {
                            agent: state.agent.handle(),
                            stop_reason: Some(stop_reason),
                            error: Some(e.to_string()),
                        })
                        .await?;
                    return Err(e);
                }
                let after = state
                    .agent
                    .dispatch(HookEvent::AfterModelCall {
                        agent: state.agent.handle(),
                        stop_reason: Some(stop_reason),
                        error: None,
                    })
                    .await?;
                if (before.retry || after.retry) && attempts < state.agent.max_model_retries() {
                    attempts += 1;
                    debug!(agent = %state.agent.name(), attempts, "model call retry requested");
                    continue;
                }
                return Ok((message, stop_reason));
            }
            Err(e) => {
                // Pairing: BeforeModelCall was dispatched, so AfterModelCall
                // must fire even on the error path.
                let after = state
                    .agent
                    .dispatch(HookEvent::AfterModelCall {
                        agent: state.agent.handle(),
                        stop_reason: None,
                        error: Some(e.to_string()),
                    })
                    .await?;
                let retryable = !matches!(
                    e,
                    Error::Canceled | Error::Timeout(_) | Error::Interrupt(_)
                );
                if retryable && after.retry && attempts < state.agent.max_model_retries() {
                    attempts += 1;
                    warn!(agent = %state.agent.name(), error = %e, attempts, "retrying model call");
                    continue;
                }
                return Err(e);
            }
        }
    }
}

/// Drives one streamed model call through the aggregator, forwarding deltas
/// and completed blocks to hooks and the consumer.
async fn stream_model_call(state: &mut LoopState<'_>) -> Result<(Message, StopReason), Error> {
    let request = build_request(state).await;
    let mut stream = state.agent.model().stream(request).await?;
    let mut aggregator = MessageAggregator::new();

    loop {
        state.ctl.check()?;
        tokio::select! {
            biased;
            _ = state.ctl.cancellation.cancelled() => {
                return Err(Error::Canceled);
            }
            item = stream.next() => {
                let Some(item) = item else { break };
                let event = item?;
                state
                    .agent
                    .dispatch(HookEvent::ModelStreamObserver {
                        agent: state.agent.handle(),
                        event: event.clone(),
                    })
                    .await?;
                emit(state, AgentEvent::ModelDelta(event.clone())).await;
                if let Some(block) = aggregator.feed(&event)? {
                    state
                        .agent
                        .dispatch(HookEvent::ContentBlockComplete {
                            agent: state.agent.handle(),
                            block: block.clone(),
                        })
                        .await?;
                    emit(state, AgentEvent::BlockComplete(block)).await;
                }
            }
        }
    }

    state.invalid_inputs = aggregator
        .invalid_tool_inputs()
        .iter()
        .map(|(id, e)| (id.clone(), e.to_string()))
        .collect();
    let (message, stop_reason, usage) = aggregator.finish();
    state.metrics.usage.add(&usage);
    match stop_reason {
        Some(stop) => Ok((message, stop)),
        None => Err(Error::Model("stream ended without a stop reason".into())),
    }
}

async fn build_request(state: &LoopState<'_>) -> ModelRequest {
    let messages = state.agent.messages_mutex().lock().await.clone();
    ModelRequest {
        system_prompt: state.agent.system_prompt().map(str::to_string),
        messages,
        tool_specs: state.agent.tools().specs(),
        tool_choice: state.next_tool_choice.clone(),
    }
}

/// One tool phase: `BeforeTools`, each tool use in document order with its
/// `BeforeToolCall`/`AfterToolCall` pair, the batched result message,
/// `AfterTools`. Returns true when structured output stopped the loop.
async fn tool_phase(state: &mut LoopState<'_>, message: &Message) -> Result<bool, Error> {
    // The one-shot tool choice applied to the call that produced this batch.
    state.next_tool_choice = None;

    state
        .agent
        .dispatch(HookEvent::BeforeTools {
            agent: state.agent.handle(),
            message: message.clone(),
        })
        .await?;

    let tool_uses: Vec<ToolUse> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse {
                name,
                tool_use_id,
                input,
            } => Some(ToolUse {
                name: name.clone(),
                tool_use_id: tool_use_id.clone(),
                input: input.clone(),
            }),
            _ => None,
        })
        .collect();

    let mut results: Vec<ToolResult> = Vec::with_capacity(tool_uses.len());
    let mut stop_loop = false;
    let mut phase_err: Option<Error> = None;

    for tool_use in &tool_uses {
        if state.ctl.check().is_err() {
            // Remaining tools never start; their synthetic results keep the
            // conversation protocol-valid for a later resume.
            results.push(ToolResult::error(&tool_use.tool_use_id, "Tool canceled"));
            continue;
        }
        match run_one_tool(state, tool_use).await {
            Ok(result) => {
                if let Some(structured) = state.structured.as_mut() {
                    if tool_use.name == structured.tool_name()
                        && result.status == crate::types::ToolResultStatus::Success
                    {
                        structured.capture(&tool_use.tool_use_id, tool_use.input.clone());
                        stop_loop = true;
                    }
                }
                results.push(result);
            }
            Err(e) => {
                phase_err = Some(e);
                break;
            }
        }
    }

    if let Some(e) = phase_err {
        // Pairing on the unwind path. Partial results are dropped; the whole
        // batch re-runs on resume, where deterministic interrupt ids make the
        // repeated hooks idempotent.
        state
            .agent
            .dispatch(HookEvent::AfterTools {
                agent: state.agent.handle(),
                message: Message::user(Vec::new()),
            })
            .await?;
        return Err(e);
    }

    let result_message = Message::user(
        results
            .into_iter()
            .map(ToolResult::into_block)
            .collect::<Vec<_>>(),
    );
    push_message(state, result_message.clone()).await?;
    state
        .agent
        .dispatch(HookEvent::AfterTools {
            agent: state.agent.handle(),
            message: result_message,
        })
        .await?;

    state.ctl.check()?;
    Ok(stop_loop)
}

/// One tool use: lookup, `BeforeToolCall`, execution (or a synthetic result),
/// `AfterToolCall` with bounded retry, `ToolResultReported`.
async fn run_one_tool(state: &mut LoopState<'_>, tool_use: &ToolUse) -> Result<ToolResult, Error> {
    let agent = state.agent;
    let tool = agent.tools().get_by_name(&tool_use.name);
    let tool_spec = tool.as_ref().map(|t| t.spec());
    let tool_use_block = ContentBlock::tool_use(
        tool_use.name.clone(),
        tool_use.tool_use_id.clone(),
        tool_use.input.clone(),
    );

    let before = agent
        .dispatch(HookEvent::BeforeToolCall {
            agent: agent.handle(),
            tool_use: tool_use_block.clone(),
            tool_spec: tool_spec.clone(),
        })
        .await;
    let before = match before {
        Ok(outcome) => outcome,
        Err(e) => {
            // Pairing holds on the interrupt (and error) path too.
            agent
                .dispatch(HookEvent::AfterToolCall {
                    agent: agent.handle(),
                    tool_use: tool_use_block.clone(),
                    tool_spec: tool_spec.clone(),
                    result: None,
                    error: Some(e.to_string()),
                })
                .await?;
            return Err(e);
        }
    };

    let invalid_input = state
        .invalid_inputs
        .iter()
        .find(|(id, _)| id == &tool_use.tool_use_id)
        .map(|(_, msg)| msg.clone());

    let mut attempts = 0usize;
    let result = loop {
        let executed = if let Some(reason) = &before.cancel_tool {
            ToolResult::error(&tool_use.tool_use_id, reason.clone())
        } else if let Some(message) = &invalid_input {
            ToolResult::error(&tool_use.tool_use_id, message.clone())
        } else {
            match &tool {
                None => ToolResult::error(
                    &tool_use.tool_use_id,
                    format!("Unknown tool: {}", tool_use.name),
                ),
                Some(tool) => execute_tool(state, tool.as_ref(), tool_use).await?,
            }
        };

        let after = agent
            .dispatch(HookEvent::AfterToolCall {
                agent: agent.handle(),
                tool_use: tool_use_block.clone(),
                tool_spec: tool_spec.clone(),
                result: Some(executed.clone().into_block()),
                error: executed.error.clone(),
            })
            .await?;
        let executable = tool.is_some() && before.cancel_tool.is_none() && invalid_input.is_none();
        if after.retry && executable && attempts < agent.max_tool_retries() {
            attempts += 1;
            debug!(tool = %tool_use.name, attempts, "tool retry requested");
            continue;
        }
        break executed;
    };

    agent
        .dispatch(HookEvent::ToolResultReported {
            agent: agent.handle(),
            result: result.clone().into_block(),
        })
        .await?;
    Ok(result)
}

/// Drives one tool's stream, forwarding progress to hooks and the consumer.
/// Cancellation drops the stream and injects the synthetic canceled result.
async fn execute_tool(
    state: &LoopState<'_>,
    tool: &dyn crate::tools::Tool,
    tool_use: &ToolUse,
) -> Result<ToolResult, Error> {
    let agent = state.agent;
    let (progress_tx, mut progress_rx) = mpsc::channel(64);
    let ctx = ToolContext {
        tool_use: tool_use.clone(),
        invocation_state: state.options.invocation_state.clone(),
        agent: agent.handle(),
    };
    let fut = tool.stream(ctx, Some(progress_tx));
    tokio::pin!(fut);

    loop {
        tokio::select! {
            biased;
            _ = state.ctl.cancellation.cancelled() => {
                // Drop the in-flight stream; the synthetic result keeps the
                // protocol valid.
                return Ok(ToolResult::error(&tool_use.tool_use_id, "Tool canceled"));
            }
            Some(event) = progress_rx.recv() => {
                agent
                    .dispatch(HookEvent::ToolStreamObserver {
                        agent: agent.handle(),
                        tool_use_id: event.tool_use_id.clone(),
                        data: event.data.clone(),
                    })
                    .await?;
                emit(state, AgentEvent::ToolProgress {
                    tool_use_id: event.tool_use_id,
                    data: event.data,
                }).await;
            }
            outcome = &mut fut => {
                // Forward progress that raced with completion.
                while let Ok(event) = progress_rx.try_recv() {
                    agent
                        .dispatch(HookEvent::ToolStreamObserver {
                            agent: agent.handle(),
                            tool_use_id: event.tool_use_id.clone(),
                            data: event.data.clone(),
                        })
                        .await?;
                    emit(state, AgentEvent::ToolProgress {
                        tool_use_id: event.tool_use_id,
                        data: event.data,
                    }).await;
                }
                return Ok(match outcome {
                    Ok(result) => result,
                    // A tool's failure is data, not a loop error.
                    Err(e) => ToolResult::error(&tool_use.tool_use_id, format!("Error: {e}")),
                });
            }
        }
    }
}
