//! Invocation results and metrics.

use serde_json::Value;

use crate::interrupt::Interrupt;
use crate::model::StopReason;
use crate::types::{Message, Usage};

/// How an invocation ended. Failures are `Err` from `invoke`; cancellation
/// surfaces as `Error::Canceled` after cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationStatus {
    Completed,
    /// Paused on pending interrupts; resumable.
    Interrupted,
}

/// Metrics accumulated over one invocation.
#[derive(Clone, Debug, Default)]
pub struct EventLoopMetrics {
    pub usage: Usage,
    pub execution_time_ms: u64,
    pub model_id: String,
    pub estimated_cost: Option<f64>,
    /// Kind string of a non-fatal error surfaced in the result
    /// (e.g. `max_tokens_error`).
    pub error_kind: Option<String>,
}

/// Terminal result of one invocation.
#[derive(Clone, Debug)]
pub struct AgentResult {
    pub status: InvocationStatus,
    pub stop_reason: Option<StopReason>,
    pub last_message: Option<Message>,
    pub metrics: EventLoopMetrics,
    /// Validated value when structured output was requested and produced.
    pub structured_output: Option<Value>,
    /// Pending interrupts when `status` is `Interrupted`.
    pub interrupts: Vec<Interrupt>,
}

impl AgentResult {
    /// Concatenated text of the last message, the common consumer ask.
    pub fn text(&self) -> String {
        self.last_message
            .as_ref()
            .map(|m| m.text())
            .unwrap_or_default()
    }
}
