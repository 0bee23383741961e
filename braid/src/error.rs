//! Error taxonomy for the runtime.
//!
//! Tool and model failures are data: they become tool results with
//! `status = error` and the conversation continues. Everything in this enum is
//! the other category: errors the loop itself has to act on. Each variant has
//! a stable [`Error::kind`] string for programmatic dispatch on the consumer
//! side (the wire protocol's `error` frame carries it).

use std::time::Duration;

use crate::interrupt::Interrupt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input rejected before execution (tool names, registry inserts, executor configs).
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// JSON that should have parsed or matched a schema did not.
    /// `context` names what was being parsed (e.g. a tool_use_id).
    #[error("invalid JSON for {context}: {message}")]
    JsonValidation { context: String, message: String },

    /// The model reported its context window was exceeded. Recoverable when a
    /// conversation manager is installed; terminal otherwise.
    #[error("model context window exceeded")]
    ContextWindowOverflow,

    /// The model stopped at its output token limit. Surfaced in metrics; the
    /// invocation still produces a normal result.
    #[error("model stopped at max tokens")]
    MaxTokens,

    /// A second invocation was started while one was in flight on the same agent.
    #[error("agent already has an invocation in flight")]
    ConcurrentInvocation,

    /// Structured output could not be produced (schema mismatch, missing root
    /// name, or the model never called the output tool).
    #[error("structured output failed: {0}")]
    StructuredOutput(String),

    /// A hook paused execution. Unwinds to the loop, which records the pending
    /// interrupt and emits a resumable terminal event.
    #[error("interrupted: {}", .0.name)]
    Interrupt(Interrupt),

    /// Session-level failure (invalid resume state, reuse after terminal error).
    #[error("session error: {0}")]
    Session(String),

    /// Model transport or provider failure.
    #[error("model provider error: {0}")]
    Model(String),

    /// Tool infrastructure failure (not a tool's own runtime error, which is data).
    #[error("tool error: {0}")]
    Tool(String),

    /// The cancellation token fired.
    #[error("canceled")]
    Canceled,

    /// A deadline or per-node timeout expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A hook callback failed with its own error.
    #[error("hook callback failed: {0}")]
    Hook(String),
}

impl Error {
    /// Stable kind string, suitable for matching on the consumer side.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::JsonValidation { .. } => "json_validation_error",
            Error::ContextWindowOverflow => "context_window_overflow_error",
            Error::MaxTokens => "max_tokens_error",
            Error::ConcurrentInvocation => "concurrent_invocation_error",
            Error::StructuredOutput(_) => "structured_output_error",
            Error::Interrupt(_) => "interrupt_exception",
            Error::Session(_) => "session_exception",
            Error::Model(_) => "model_error",
            Error::Tool(_) => "tool_error",
            Error::Canceled => "canceled",
            Error::Timeout(_) => "timeout",
            Error::Hook(_) => "hook_error",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn json_validation(context: impl Into<String>, message: impl Into<String>) -> Self {
        Error::JsonValidation {
            context: context.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Every variant maps to a distinct, stable kind string.
    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(Error::validation("x").kind(), "validation_error");
        assert_eq!(
            Error::json_validation("t1", "bad").kind(),
            "json_validation_error"
        );
        assert_eq!(
            Error::ContextWindowOverflow.kind(),
            "context_window_overflow_error"
        );
        assert_eq!(Error::MaxTokens.kind(), "max_tokens_error");
        assert_eq!(
            Error::ConcurrentInvocation.kind(),
            "concurrent_invocation_error"
        );
        assert_eq!(
            Error::StructuredOutput("no tool use".into()).kind(),
            "structured_output_error"
        );
        assert_eq!(Error::Session("stale".into()).kind(), "session_exception");
        assert_eq!(Error::Canceled.kind(), "canceled");
    }

    /// **Scenario**: Display output names the failing context.
    #[test]
    fn json_validation_display_names_context() {
        let e = Error::json_validation("tool_use t1", "expected value at line 1");
        let msg = e.to_string();
        assert!(msg.contains("tool_use t1"));
        assert!(msg.contains("expected value"));
    }
}
