//! Content blocks: the smallest unit of message content.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one tool invocation, carried inside a `toolResult` block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

/// One content item inside a tool result: plain text or structured JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text { text: String },
    Json { json: Value },
}

impl ToolResultContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolResultContent::Text { text: text.into() }
    }

    pub fn json(json: Value) -> Self {
        ToolResultContent::Json { json }
    }
}

/// Source of a media block: inline bytes (base64) or a URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaSource {
    Bytes { bytes: String },
    Url { url: String },
}

/// Smallest unit of message content.
///
/// The `Other` fallback keeps unknown block types intact across a serde
/// round-trip, so messages recorded by a newer producer survive an older
/// consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolUse {
        name: String,
        tool_use_id: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_use_id: String,
        status: ToolResultStatus,
        content: Vec<ToolResultContent>,
    },
    #[serde(rename_all = "camelCase")]
    Reasoning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        redacted_content: Option<String>,
    },
    CachePoint {
        kind: String,
    },
    Image {
        source: MediaSource,
    },
    Video {
        source: MediaSource,
    },
    Document {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    #[serde(untagged)]
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(name: impl Into<String>, tool_use_id: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            name: name.into(),
            tool_use_id: tool_use_id.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        status: ToolResultStatus,
        content: Vec<ToolResultContent>,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            status,
            content,
        }
    }

    /// Shorthand for an error tool result with a single text item.
    pub fn tool_error(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        ContentBlock::tool_result(
            tool_use_id,
            ToolResultStatus::Error,
            vec![ToolResultContent::text(message)],
        )
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, ContentBlock::ToolUse { .. })
    }

    /// Text payload when this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: Each known variant serializes with its camelCase tag and
    /// deserializes back to the identical value.
    #[test]
    fn known_variants_round_trip() {
        let blocks = vec![
            ContentBlock::text("hi"),
            ContentBlock::tool_use("add", "t1", json!({"a": 2, "b": 3})),
            ContentBlock::tool_result(
                "t1",
                ToolResultStatus::Success,
                vec![ToolResultContent::text("5"), ToolResultContent::json(json!({"n": 5}))],
            ),
            ContentBlock::Reasoning {
                text: Some("thinking".into()),
                signature: Some("sig".into()),
                redacted_content: None,
            },
            ContentBlock::CachePoint {
                kind: "default".into(),
            },
            ContentBlock::Image {
                source: MediaSource::Url {
                    url: "https://example.com/a.png".into(),
                },
            },
            ContentBlock::Document {
                source: MediaSource::Bytes {
                    bytes: "aGVsbG8=".into(),
                },
                name: Some("notes.txt".into()),
            },
        ];
        for block in blocks {
            let s = serde_json::to_string(&block).unwrap();
            let back: ContentBlock = serde_json::from_str(&s).unwrap();
            assert_eq!(back, block, "round trip failed for {s}");
        }
    }

    /// **Scenario**: Tag spellings on the wire are camelCase.
    #[test]
    fn wire_tags_are_camel_case() {
        let v = serde_json::to_value(ContentBlock::tool_use("add", "t1", json!({}))).unwrap();
        assert_eq!(v["type"], "toolUse");
        assert_eq!(v["toolUseId"], "t1");

        let v = serde_json::to_value(ContentBlock::CachePoint {
            kind: "default".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "cachePoint");
    }

    /// **Scenario**: An unknown block type survives a round trip through the
    /// Other fallback.
    #[test]
    fn unknown_block_round_trips() {
        let raw = json!({"type": "citation", "source": "doc-1", "span": [3, 9]});
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();
        match &block {
            ContentBlock::Other(v) => assert_eq!(v, &raw),
            other => panic!("expected Other fallback, got {other:?}"),
        }
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
    }

    /// **Scenario**: tool_error builds an error-status result with the message.
    #[test]
    fn tool_error_shorthand() {
        match ContentBlock::tool_error("t9", "Unknown tool: frobnicate") {
            ContentBlock::ToolResult {
                tool_use_id,
                status,
                content,
            } => {
                assert_eq!(tool_use_id, "t9");
                assert_eq!(status, ToolResultStatus::Error);
                assert_eq!(
                    content,
                    vec![ToolResultContent::text("Unknown tool: frobnicate")]
                );
            }
            other => panic!("expected ToolResult, got {other:?}"),
        }
    }
}
