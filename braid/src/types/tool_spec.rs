//! Tool specifications and name validation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub const TOOL_NAME_MAX_LEN: usize = 64;

static TOOL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("tool name regex"));

/// What a tool publishes to the model: name, description, JSON Schema input.
///
/// Spec fields are aligned with the wire shape published to providers; the
/// runtime never inspects `input_schema` beyond validation in the
/// schema-checked tool factory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Validates a tool name: 1–64 characters of `[A-Za-z0-9_-]`.
pub fn validate_tool_name(name: &str) -> Result<(), Error> {
    if name.is_empty() || name.len() > TOOL_NAME_MAX_LEN {
        return Err(Error::validation(format!(
            "tool name must be 1-{TOOL_NAME_MAX_LEN} characters, got {}",
            name.len()
        )));
    }
    if !TOOL_NAME_RE.is_match(name) {
        return Err(Error::validation(format!(
            "tool name {name:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

impl ToolSpec {
    /// Validates name and description. Called on every registry insert.
    pub fn validate(&self) -> Result<(), Error> {
        validate_tool_name(&self.name)?;
        if let Some(desc) = &self.description {
            if desc.is_empty() {
                return Err(Error::validation(format!(
                    "tool {}: description must be non-empty when present",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, description: Option<&str>) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: description.map(Into::into),
            input_schema: json!({"type": "object"}),
        }
    }

    /// **Scenario**: Valid names pass; empty, overlong, and bad-charset names fail.
    #[test]
    fn name_validation_boundaries() {
        assert!(validate_tool_name("add").is_ok());
        assert!(validate_tool_name("Add_2-fast").is_ok());
        assert!(validate_tool_name(&"a".repeat(64)).is_ok());

        assert!(validate_tool_name("").is_err());
        assert!(validate_tool_name(&"a".repeat(65)).is_err());
        assert!(validate_tool_name("has space").is_err());
        assert!(validate_tool_name("dot.name").is_err());
    }

    /// **Scenario**: Empty description is rejected; absent description is fine.
    #[test]
    fn description_must_be_non_empty_when_present() {
        assert!(spec("ok", None).validate().is_ok());
        assert!(spec("ok", Some("adds numbers")).validate().is_ok());
        let err = spec("ok", Some("")).validate().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    /// **Scenario**: Spec serializes with camelCase field names.
    #[test]
    fn spec_serializes_camel_case() {
        let v = serde_json::to_value(spec("add", Some("adds"))).unwrap();
        assert!(v.get("inputSchema").is_some());
    }
}
