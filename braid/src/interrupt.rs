//! Deterministic pause tokens for human-in-the-loop.
//!
//! A hook callback may raise an interrupt to pause the run and ask the
//! consumer for input. The interrupt id is a pure function of
//! `(phase, tool_use_id, name)`, so resuming and re-running the same phase
//! finds the stored response instead of pausing again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pending (or answered) pause token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Deterministic id: `v1:<phase>:<tool_use_id>:<uuid5(name)>`.
    pub id: String,
    /// Name chosen by the hook that raised it (e.g. `approve_write`).
    pub name: String,
    /// Human-readable reason shown to whoever answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<serde_json::Value>,
    /// Answer supplied via [`InterruptState::resume`]; `None` while pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// Computes the deterministic interrupt id for `(phase, tool_use_id, name)`.
///
/// The name component is hashed with UUIDv5 in the OID namespace so that ids
/// stay stable across processes.
pub fn interrupt_id(phase: &str, tool_use_id: &str, name: &str) -> String {
    let name_uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
    format!("v1:{phase}:{tool_use_id}:{name_uuid}")
}

/// Interrupt bookkeeping owned by an agent.
///
/// Entries persist across a pause so that re-entering the loop at the phase
/// that raised them finds the response and continues.
#[derive(Clone, Debug, Default)]
pub struct InterruptState {
    pub interrupts: HashMap<String, Interrupt>,
}

impl InterruptState {
    /// Records a pending interrupt. Existing entries are kept (the second
    /// raise of the same id must observe the stored response, not reset it).
    pub fn record(&mut self, interrupt: Interrupt) {
        self.interrupts.entry(interrupt.id.clone()).or_insert(interrupt);
    }

    /// Looks up an interrupt by id.
    pub fn get(&self, id: &str) -> Option<&Interrupt> {
        self.interrupts.get(id)
    }

    /// Returns interrupts that still have no response.
    pub fn pending(&self) -> Vec<&Interrupt> {
        self.interrupts
            .values()
            .filter(|i| i.response.is_none())
            .collect()
    }

    /// Stores responses for the given interrupt ids. Unknown ids are ignored;
    /// the next invocation simply re-raises anything still unanswered.
    pub fn resume(&mut self, responses: HashMap<String, serde_json::Value>) {
        for (id, value) in responses {
            if let Some(interrupt) = self.interrupts.get_mut(&id) {
                interrupt.response = Some(value);
            }
        }
    }

    /// Drops answered interrupts after a completed invocation so a later pause
    /// with the same name starts fresh.
    pub fn clear_answered(&mut self) {
        self.interrupts.retain(|_, i| i.response.is_none());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: The same (phase, tool_use_id, name) always yields the same id.
    #[test]
    fn interrupt_id_is_deterministic() {
        let a = interrupt_id("before_tool_call", "t1", "approve_write");
        let b = interrupt_id("before_tool_call", "t1", "approve_write");
        assert_eq!(a, b);
        assert!(a.starts_with("v1:before_tool_call:t1:"));
    }

    /// **Scenario**: Different names or phases yield different ids.
    #[test]
    fn interrupt_id_varies_with_inputs() {
        let base = interrupt_id("before_tool_call", "t1", "approve_write");
        assert_ne!(base, interrupt_id("before_tool_call", "t1", "approve_read"));
        assert_ne!(base, interrupt_id("after_tool_call", "t1", "approve_write"));
        assert_ne!(base, interrupt_id("before_tool_call", "t2", "approve_write"));
    }

    /// **Scenario**: record keeps the first entry; resume fills the response.
    #[test]
    fn record_then_resume_round_trip() {
        let mut state = InterruptState::default();
        let id = interrupt_id("before_tool_call", "t1", "approve_write");
        state.record(Interrupt {
            id: id.clone(),
            name: "approve_write".into(),
            reason: Some(json!("will write")),
            response: None,
        });
        assert_eq!(state.pending().len(), 1);

        state.resume(HashMap::from([(id.clone(), json!("ok"))]));
        assert_eq!(state.pending().len(), 0);
        assert_eq!(state.get(&id).unwrap().response, Some(json!("ok")));

        // A second record of the same id must not clobber the response.
        state.record(Interrupt {
            id: id.clone(),
            name: "approve_write".into(),
            reason: None,
            response: None,
        });
        assert_eq!(state.get(&id).unwrap().response, Some(json!("ok")));
    }

    /// **Scenario**: clear_answered drops answered entries, keeps pending ones.
    #[test]
    fn clear_answered_keeps_pending() {
        let mut state = InterruptState::default();
        state.record(Interrupt {
            id: "a".into(),
            name: "a".into(),
            reason: None,
            response: Some(json!(1)),
        });
        state.record(Interrupt {
            id: "b".into(),
            name: "b".into(),
            reason: None,
            response: None,
        });
        state.clear_answered();
        assert!(state.get("a").is_none());
        assert!(state.get("b").is_some());
    }
}
