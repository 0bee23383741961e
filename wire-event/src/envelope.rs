//! Envelope fields attached to each frame.

use serde_json::Value;

/// Envelope recommended for each frame: run id, node id, and a per-stream
/// sequence number.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Run id; constant within a stream.
    pub run_id: Option<String>,
    /// Node id of the span the frame belongs to, when any.
    pub node_id: Option<String>,
    /// Monotonically increasing sequence number within a stream.
    pub event_id: Option<u64>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    pub fn with_node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    pub fn with_event_id(mut self, id: u64) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Merges envelope fields into the given JSON object (top level only).
    /// Existing keys are not overwritten.
    pub fn inject_into(&self, obj: &mut Value) {
        let Some(obj) = obj.as_object_mut() else {
            return;
        };
        if let Some(ref id) = self.run_id {
            obj.entry("runId").or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(ref id) = self.node_id {
            obj.entry("nodeId")
                .or_insert_with(|| Value::String(id.clone()));
        }
        if let Some(id) = self.event_id {
            obj.entry("eventId")
                .or_insert_with(|| Value::Number(serde_json::Number::from(id)));
        }
    }
}

/// Per-stream envelope sequencing: hands out envelopes with an increasing
/// event id.
#[derive(Clone, Debug)]
pub struct EnvelopeState {
    run_id: String,
    next_event_id: u64,
}

impl EnvelopeState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            next_event_id: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Next envelope for a frame, optionally scoped to a node.
    pub fn next(&mut self, node_id: Option<&str>) -> Envelope {
        let event_id = self.next_event_id;
        self.next_event_id += 1;
        Envelope {
            run_id: Some(self.run_id.clone()),
            node_id: node_id.map(str::to_string),
            event_id: Some(event_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inject_does_not_overwrite() {
        let mut obj = json!({"type": "contentBlock", "nodeId": "existing"});
        Envelope::new()
            .with_run_id("r-1")
            .with_node_id("n-1")
            .with_event_id(7)
            .inject_into(&mut obj);
        assert_eq!(obj["runId"], "r-1");
        assert_eq!(obj["nodeId"], "existing");
        assert_eq!(obj["eventId"], 7);
    }

    #[test]
    fn envelope_state_sequences() {
        let mut state = EnvelopeState::new("r-1");
        let a = state.next(None);
        let b = state.next(Some("node"));
        assert_eq!(a.event_id, Some(0));
        assert_eq!(b.event_id, Some(1));
        assert_eq!(b.node_id.as_deref(), Some("node"));
        assert_eq!(state.run_id(), "r-1");
    }

    #[test]
    fn inject_ignores_non_objects() {
        let mut v = json!("scalar");
        Envelope::new().with_run_id("r").inject_into(&mut v);
        assert_eq!(v, json!("scalar"));
    }
}
