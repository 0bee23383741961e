//! Scripted model provider for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::error::Error;
use crate::types::{Role, Usage};

use super::{
    ContentBlockDelta, ContentBlockStart, ModelEventStream, ModelProvider, ModelRequest,
    ModelStreamEvent, StopReason, ToolUseStart,
};

enum Script {
    Events(Vec<ModelStreamEvent>),
    /// Repeats the same text delta forever. Used to exercise cancellation.
    InfiniteText(String),
}

/// Model provider that replays queued event scripts, one per call.
///
/// Calls beyond the queued scripts return an empty end-turn message, so a
/// stub never hangs a test.
pub struct MockModel {
    model_id: String,
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl MockModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            scripts: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a raw event sequence for one call.
    pub fn enqueue_events(&self, events: Vec<ModelStreamEvent>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Script::Events(events));
    }

    /// Queues one call that answers with a single text block.
    pub fn enqueue_text(&self, text: impl Into<String>, stop_reason: StopReason) {
        self.enqueue_events(Self::text_events(text, stop_reason));
    }

    /// Queues one call that requests a single tool use.
    pub fn enqueue_tool_use(
        &self,
        name: impl Into<String>,
        tool_use_id: impl Into<String>,
        input: Value,
    ) {
        self.enqueue_events(Self::tool_use_events(name, tool_use_id, input));
    }

    /// Queues a call whose stream never ends: the same text delta repeats
    /// until the consumer cancels.
    pub fn enqueue_infinite_text(&self, chunk: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Script::InfiniteText(chunk.into()));
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Well-formed event sequence for a single text block.
    pub fn text_events(text: impl Into<String>, stop_reason: StopReason) -> Vec<ModelStreamEvent> {
        vec![
            ModelStreamEvent::MessageStart {
                role: Role::Assistant,
            },
            ModelStreamEvent::ContentBlockStart {
                content_block_index: 0,
                start: None,
            },
            ModelStreamEvent::ContentBlockDelta {
                content_block_index: 0,
                delta: ContentBlockDelta::Text { text: text.into() },
            },
            ModelStreamEvent::ContentBlockStop {
                content_block_index: 0,
            },
            ModelStreamEvent::MessageStop { stop_reason },
            ModelStreamEvent::Metadata {
                usage: Usage::new(10, 5),
            },
        ]
    }

    /// Well-formed event sequence for a single tool-use block.
    pub fn tool_use_events(
        name: impl Into<String>,
        tool_use_id: impl Into<String>,
        input: Value,
    ) -> Vec<ModelStreamEvent> {
        let input_json = input.to_string();
        vec![
            ModelStreamEvent::MessageStart {
                role: Role::Assistant,
            },
            ModelStreamEvent::ContentBlockStart {
                content_block_index: 0,
                start: Some(ContentBlockStart {
                    tool_use: Some(ToolUseStart {
                        name: name.into(),
                        tool_use_id: tool_use_id.into(),
                    }),
                }),
            },
            ModelStreamEvent::ContentBlockDelta {
                content_block_index: 0,
                delta: ContentBlockDelta::ToolUseInput { input: input_json },
            },
            ModelStreamEvent::ContentBlockStop {
                content_block_index: 0,
            },
            ModelStreamEvent::MessageStop {
                stop_reason: StopReason::ToolUse,
            },
            ModelStreamEvent::Metadata {
                usage: Usage::new(10, 5),
            },
        ]
    }
}

#[async_trait]
impl ModelProvider for MockModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, request: ModelRequest) -> Result<ModelEventStream, Error> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let stream: ModelEventStream = match script {
            Some(Script::Events(events)) => stream::iter(events.into_iter().map(Ok)).boxed(),
            Some(Script::InfiniteText(chunk)) => {
                let header = stream::iter(vec![
                    Ok::<ModelStreamEvent, Error>(ModelStreamEvent::MessageStart {
                        role: Role::Assistant,
                    }),
                    Ok(ModelStreamEvent::ContentBlockStart {
                        content_block_index: 0,
                        start: None,
                    }),
                ]);
                let body = stream::repeat_with(move || {
                    Ok::<ModelStreamEvent, Error>(ModelStreamEvent::ContentBlockDelta {
                        content_block_index: 0,
                        delta: ContentBlockDelta::Text {
                            text: chunk.clone(),
                        },
                    })
                });
                header.chain(body).boxed()
            }
            None => stream::iter(
                Self::text_events("", StopReason::EndTurn)
                    .into_iter()
                    .map(Ok),
            )
            .boxed(),
        };
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Scripts replay in order, one per call.
    #[tokio::test]
    async fn scripts_replay_in_order() {
        let model = MockModel::new("mock-1");
        model.enqueue_text("first", StopReason::EndTurn);
        model.enqueue_text("second", StopReason::EndTurn);

        for expected in ["first", "second"] {
            let mut stream = model.stream(ModelRequest::default()).await.unwrap();
            let mut text = String::new();
            while let Some(ev) = stream.next().await {
                if let ModelStreamEvent::ContentBlockDelta {
                    delta: ContentBlockDelta::Text { text: t },
                    ..
                } = ev.unwrap()
                {
                    text.push_str(&t);
                }
            }
            assert_eq!(text, expected);
        }
        assert_eq!(model.requests().len(), 2);
    }

    /// **Scenario**: The infinite script keeps producing deltas.
    #[tokio::test]
    async fn infinite_script_streams_on() {
        let model = MockModel::new("mock-1");
        model.enqueue_infinite_text("x");
        let mut stream = model.stream(ModelRequest::default()).await.unwrap();
        let mut deltas = 0;
        while let Some(ev) = stream.next().await {
            if matches!(ev.unwrap(), ModelStreamEvent::ContentBlockDelta { .. }) {
                deltas += 1;
                if deltas >= 50 {
                    break;
                }
            }
        }
        assert_eq!(deltas, 50);
    }

    /// **Scenario**: An exhausted queue yields an empty end-turn, not a hang.
    #[tokio::test]
    async fn exhausted_queue_ends_turn() {
        let model = MockModel::new("mock-1");
        let mut stream = model.stream(ModelRequest::default()).await.unwrap();
        let mut stop = None;
        while let Some(ev) = stream.next().await {
            if let ModelStreamEvent::MessageStop { stop_reason } = ev.unwrap() {
                stop = Some(stop_reason);
            }
        }
        assert_eq!(stop, Some(StopReason::EndTurn));
    }
}
