//! Hook system: observation and intervention at fixed phases of the loop.
//!
//! Hooks are registered on an agent and the loop dispatches a [`HookEvent`] at
//! each phase boundary. Callbacks return a [`HookOutcome`] (continue, retry,
//! cancel the tool) rather than mutating the event; the engine reads the
//! aggregated outcome after dispatch. A callback can also pause the run by
//! raising an interrupt through [`HookContext::interrupt`].
//!
//! `After*` phases dispatch in reverse subscription order so paired callbacks
//! unwind like resources.

mod event;
mod registry;

pub use event::{AgentHandle, HookEvent, HookEventKind};
pub use registry::{DispatchOutcome, HookCallback, HookContext, HookOutcome, HookRegistry};
