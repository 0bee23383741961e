//! Reassembles complete content blocks and messages from stream deltas.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::Error;
use crate::types::{ContentBlock, Message, Role, Usage};

use super::{ContentBlockDelta, ModelStreamEvent, StopReason};

enum BlockInProgress {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        tool_use_id: String,
        input_json: String,
    },
    Reasoning {
        text: String,
        signature: Option<String>,
        redacted_content: Option<String>,
    },
}

/// Consumes one model call's event stream and yields completed blocks.
///
/// Feed every event through [`MessageAggregator::feed`]; a completed
/// [`ContentBlock`] comes back at each block stop. After the stream ends,
/// [`MessageAggregator::finish`] produces the assembled assistant message,
/// the stop reason, and usage.
///
/// Tool-use input fragments are concatenated and parsed as JSON at block
/// stop. A parse failure still completes the block (with empty input) and is
/// recorded in [`MessageAggregator::invalid_tool_inputs`]; the loop turns
/// those into error tool results instead of invoking the tool.
#[derive(Default)]
pub struct MessageAggregator {
    role: Option<Role>,
    in_progress: BTreeMap<usize, BlockInProgress>,
    completed: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
    invalid_tool_inputs: Vec<(String, Error)>,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one event; returns a block when this event completed one.
    pub fn feed(&mut self, event: &ModelStreamEvent) -> Result<Option<ContentBlock>, Error> {
        match event {
            ModelStreamEvent::MessageStart { role } => {
                self.role = Some(*role);
                Ok(None)
            }
            ModelStreamEvent::ContentBlockStart {
                content_block_index,
                start,
            } => {
                let block = match start.as_ref().and_then(|s| s.tool_use.as_ref()) {
                    Some(tool_use) => BlockInProgress::ToolUse {
                        name: tool_use.name.clone(),
                        tool_use_id: tool_use.tool_use_id.clone(),
                        input_json: String::new(),
                    },
                    None => BlockInProgress::Text {
                        text: String::new(),
                    },
                };
                self.in_progress.insert(*content_block_index, block);
                Ok(None)
            }
            ModelStreamEvent::ContentBlockDelta {
                content_block_index,
                delta,
            } => {
                self.apply_delta(*content_block_index, delta);
                Ok(None)
            }
            ModelStreamEvent::ContentBlockStop {
                content_block_index,
            } => Ok(self.complete_block(*content_block_index)),
            ModelStreamEvent::MessageStop { stop_reason } => {
                self.stop_reason = Some(*stop_reason);
                Ok(None)
            }
            ModelStreamEvent::Metadata { usage } => {
                self.usage.add(usage);
                Ok(None)
            }
        }
    }

    fn apply_delta(&mut self, index: usize, delta: &ContentBlockDelta) {
        // A delta for an index we never saw a start for opens a text or
        // reasoning block implicitly; some providers skip the start event.
        let entry = self.in_progress.entry(index).or_insert_with(|| match delta {
            ContentBlockDelta::Reasoning { .. } => BlockInProgress::Reasoning {
                text: String::new(),
                signature: None,
                redacted_content: None,
            },
            _ => BlockInProgress::Text {
                text: String::new(),
            },
        });
        match (entry, delta) {
            (BlockInProgress::Text { text }, ContentBlockDelta::Text { text: t }) => {
                text.push_str(t);
            }
            (
                BlockInProgress::ToolUse { input_json, .. },
                ContentBlockDelta::ToolUseInput { input },
            ) => {
                input_json.push_str(input);
            }
            (
                BlockInProgress::Reasoning {
                    text,
                    signature,
                    redacted_content,
                },
                ContentBlockDelta::Reasoning {
                    text: t,
                    signature: s,
                    redacted_content: r,
                },
            ) => {
                if let Some(t) = t {
                    text.push_str(t);
                }
                // Signature and redacted bytes pass through unchanged; the
                // last value wins, no concatenation.
                if s.is_some() {
                    *signature = s.clone();
                }
                if r.is_some() {
                    *redacted_content = r.clone();
                }
            }
            (_, delta) => {
                // A text block that starts receiving reasoning deltas (or vice
                // versa) indicates a provider bug; drop the mismatched delta.
                debug!(index, ?delta, "dropping mismatched content block delta");
            }
        }
    }

    fn complete_block(&mut self, index: usize) -> Option<ContentBlock> {
        let block = match self.in_progress.remove(&index)? {
            BlockInProgress::Text { text } => ContentBlock::Text { text },
            BlockInProgress::Reasoning {
                text,
                signature,
                redacted_content,
            } => ContentBlock::Reasoning {
                text: if text.is_empty() { None } else { Some(text) },
                signature,
                redacted_content,
            },
            BlockInProgress::ToolUse {
                name,
                tool_use_id,
                input_json,
            } => {
                let input = if input_json.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    match serde_json::from_str(&input_json) {
                        Ok(v) => v,
                        Err(e) => {
                            self.invalid_tool_inputs.push((
                                tool_use_id.clone(),
                                Error::json_validation(
                                    format!("tool_use {tool_use_id}"),
                                    e.to_string(),
                                ),
                            ));
                            Value::Object(Default::default())
                        }
                    }
                };
                ContentBlock::ToolUse {
                    name,
                    tool_use_id,
                    input,
                }
            }
        };
        self.completed.push(block.clone());
        Some(block)
    }

    /// Tool uses whose input failed to parse as JSON, with the error the loop
    /// reports in their synthetic error results.
    pub fn invalid_tool_inputs(&self) -> &[(String, Error)] {
        &self.invalid_tool_inputs
    }

    /// Final assembled message. Blocks still in progress when the stream ends
    /// (provider never sent their stop) are discarded.
    pub fn finish(self) -> (Message, Option<StopReason>, Usage) {
        let role = self.role.unwrap_or(Role::Assistant);
        let message = Message {
            role,
            content: self.completed,
        };
        (message, self.stop_reason, self.usage)
    }
}
