//! Server-Sent-Events framing.
//!
//! Each chunk is exactly one `event:` line and one `data:` line, terminated
//! by a blank line. Consumers accumulate until the blank-line delimiter.
//! Streams are not resumable: a reconnect is a new run.

use serde_json::Value;

/// Terminal frame name carrying the final result fields.
pub const DONE_EVENT: &str = "done";

/// Terminal frame name carrying `{runId?, message}`.
pub const ERROR_EVENT: &str = "error";

/// Frames one event for the wire.
pub fn sse_frame(event: &str, data: &Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_has_event_data_and_delimiter() {
        let frame = sse_frame("contentBlock", &json!({"type": "contentBlock"}));
        assert!(frame.starts_with("event: contentBlock\n"));
        assert!(frame.contains("\ndata: {\"type\":\"contentBlock\"}"));
        assert!(frame.ends_with("\n\n"));
        // Exactly one event line and one data line.
        assert_eq!(frame.matches("event: ").count(), 1);
        assert_eq!(frame.matches("data: ").count(), 1);
    }

    #[test]
    fn terminal_frame_names() {
        assert_eq!(sse_frame(DONE_EVENT, &json!({})), "event: done\ndata: {}\n\n");
        let err = sse_frame(ERROR_EVENT, &json!({"message": "boom"}));
        assert!(err.starts_with("event: error\n"));
    }
}
