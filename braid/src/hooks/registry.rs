//! Subscription and dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::interrupt::{interrupt_id, Interrupt, InterruptState};

use super::event::{HookEvent, HookEventKind};

/// What a callback decides. The engine reads the aggregated outcome after
/// dispatch completes; this replaces mutable flags on the event payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum HookOutcome {
    /// Proceed normally.
    Continue,
    /// Re-run the unit this phase wraps (model call, tool call). Bounded by
    /// the loop's retry caps.
    Retry,
    /// Skip the tool call; a synthetic error result with this message is
    /// recorded instead. Only meaningful at `BeforeToolCall`.
    CancelTool(String),
}

/// Aggregate of all callback outcomes for one dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchOutcome {
    pub retry: bool,
    pub cancel_tool: Option<String>,
}

/// Per-dispatch context handed to callbacks: the phase, the tool use in
/// scope (when any), and the owning agent's interrupt state.
#[derive(Clone)]
pub struct HookContext {
    kind: HookEventKind,
    tool_use_id: Option<String>,
    interrupts: Arc<Mutex<InterruptState>>,
}

impl HookContext {
    pub fn new(
        kind: HookEventKind,
        tool_use_id: Option<String>,
        interrupts: Arc<Mutex<InterruptState>>,
    ) -> Self {
        Self {
            kind,
            tool_use_id,
            interrupts,
        }
    }

    pub fn kind(&self) -> HookEventKind {
        self.kind
    }

    pub fn tool_use_id(&self) -> Option<&str> {
        self.tool_use_id.as_deref()
    }

    /// Pauses the run for human input, or returns the answer on resume.
    ///
    /// The id is deterministic in `(phase, tool_use_id, name)`: the first call
    /// records a pending interrupt and returns `Error::Interrupt`; after
    /// [`InterruptState::resume`] stored a response, the same call site gets
    /// the response back and execution continues.
    pub fn interrupt(
        &self,
        name: impl Into<String>,
        reason: Option<Value>,
    ) -> Result<Value, Error> {
        let name = name.into();
        let id = interrupt_id(
            self.kind.phase_str(),
            self.tool_use_id.as_deref().unwrap_or(""),
            &name,
        );
        let mut state = self
            .interrupts
            .lock()
            .map_err(|_| Error::Session("interrupt state poisoned".into()))?;
        if let Some(existing) = state.get(&id) {
            if let Some(response) = &existing.response {
                return Ok(response.clone());
            }
            return Err(Error::Interrupt(existing.clone()));
        }
        let interrupt = Interrupt {
            id: id.clone(),
            name,
            reason,
            response: None,
        };
        state.record(interrupt.clone());
        Err(Error::Interrupt(interrupt))
    }
}

/// A subscribed lifecycle callback.
#[async_trait]
pub trait HookCallback: Send + Sync {
    async fn on_event(&self, event: &HookEvent, ctx: &HookContext) -> Result<HookOutcome, Error>;
}

struct FnCallback<F>(F);

#[async_trait]
impl<F> HookCallback for FnCallback<F>
where
    F: Fn(&HookEvent, &HookContext) -> Result<HookOutcome, Error> + Send + Sync,
{
    async fn on_event(&self, event: &HookEvent, ctx: &HookContext) -> Result<HookOutcome, Error> {
        (self.0)(event, ctx)
    }
}

/// Typed publish/subscribe over [`HookEvent`] variants.
///
/// Callbacks are stored in insertion order. Dispatch iterates a snapshot of
/// the subscriber list, so subscribing during a dispatch never affects that
/// dispatch. `After*` kinds iterate in reverse for resource-unwinding order.
#[derive(Default)]
pub struct HookRegistry {
    subscribers: Mutex<HashMap<HookEventKind, Vec<Arc<dyn HookCallback>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: HookEventKind, callback: Arc<dyn HookCallback>) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.entry(kind).or_default().push(callback);
    }

    /// Subscribes a plain closure. Most hooks are synchronous decisions; async
    /// work implements [`HookCallback`] directly.
    pub fn subscribe_with<F>(&self, kind: HookEventKind, f: F)
    where
        F: Fn(&HookEvent, &HookContext) -> Result<HookOutcome, Error> + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnCallback(f)));
    }

    /// Invokes callbacks for the event's kind and aggregates their outcomes.
    ///
    /// `Error::Interrupt` (and any other callback error) propagates
    /// immediately and aborts the remaining callbacks for this dispatch.
    pub async fn dispatch(
        &self,
        event: &HookEvent,
        ctx: &HookContext,
    ) -> Result<DispatchOutcome, Error> {
        let kind = event.kind();
        let snapshot: Vec<Arc<dyn HookCallback>> = {
            let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subs.get(&kind).cloned().unwrap_or_default()
        };

        let ordered: Vec<Arc<dyn HookCallback>> = if kind.is_after() {
            snapshot.into_iter().rev().collect()
        } else {
            snapshot
        };
        let mut outcome = DispatchOutcome::default();
        for cb in ordered {
            match cb.on_event(event, ctx).await? {
                HookOutcome::Continue => {}
                HookOutcome::Retry => outcome.retry = true,
                HookOutcome::CancelTool(reason) => outcome.cancel_tool = Some(reason),
            }
        }
        Ok(outcome)
    }

    /// Number of callbacks subscribed for a kind (test and introspection aid).
    pub fn subscriber_count(&self, kind: HookEventKind) -> usize {
        let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let counts: HashMap<_, _> = subs.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookRegistry").field("subscribers", &counts).finish()
    }
}
