//! Conversation management: policies that trim history when the model's
//! context window runs out.
//!
//! The loop consults the installed manager when a call stops with
//! `contextWindowExceeded`. A successful reduction re-runs the model phase;
//! anything else makes the overflow terminal.

use async_trait::async_trait;

use crate::error::Error;
use crate::types::{ContentBlock, Message, Role};

#[async_trait]
pub trait ConversationManager: Send + Sync {
    /// Attempts to shrink `messages` in place after `cause`. Returns true
    /// when something was removed and the model call should be retried.
    async fn reduce_context(
        &self,
        messages: &mut Vec<Message>,
        cause: &Error,
    ) -> Result<bool, Error>;
}

/// No management: overflow is terminal.
pub struct NullConversationManager;

#[async_trait]
impl ConversationManager for NullConversationManager {
    async fn reduce_context(
        &self,
        _messages: &mut Vec<Message>,
        _cause: &Error,
    ) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Keeps the most recent `window_size` messages, dropping from the front.
///
/// Never orphans a tool batch: if the cut lands on a user message carrying
/// tool results, the cut moves forward past it, so every tool use the model
/// sees still has its results.
pub struct SlidingWindowConversationManager {
    window_size: usize,
}

impl SlidingWindowConversationManager {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }
}

impl Default for SlidingWindowConversationManager {
    fn default() -> Self {
        Self::new(40)
    }
}

fn starts_with_orphaned_results(messages: &[Message]) -> bool {
    match messages.first() {
        Some(first) if first.role == Role::User => first
            .content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
        _ => false,
    }
}

#[async_trait]
impl ConversationManager for SlidingWindowConversationManager {
    async fn reduce_context(
        &self,
        messages: &mut Vec<Message>,
        _cause: &Error,
    ) -> Result<bool, Error> {
        if messages.len() <= 1 {
            return Ok(false);
        }
        let mut cut = messages.len().saturating_sub(self.window_size);
        if cut == 0 {
            // Window alone did not help; drop the oldest message anyway so
            // repeated overflows keep making progress.
            cut = 1;
        }
        // Move the cut past any user message whose tool results would lose
        // their tool uses.
        while cut < messages.len() && starts_with_orphaned_results(&messages[cut..]) {
            cut += 1;
        }
        if cut >= messages.len() {
            return Ok(false);
        }
        messages.drain(..cut);
        Ok(true)
    }
}
