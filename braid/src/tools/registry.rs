//! Tool registry: validated name → tool mapping.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Error;
use crate::types::ToolSpec;

use super::Tool;

/// Mapping from tool name to tool instance.
///
/// Inserts validate the spec and are atomic: a rejected insert leaves the
/// registry unchanged. Reads are lock-free after registration settles.
#[derive(Default)]
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Rejects invalid specs and duplicate names.
    pub fn add(&self, tool: Arc<dyn Tool>) -> Result<(), Error> {
        tool.spec().validate()?;
        let name = tool.name().to_string();
        match self.tools.entry(name) {
            Entry::Occupied(e) => Err(Error::validation(format!(
                "tool {:?} already registered",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(tool);
                Ok(())
            }
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove_by_name(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name).map(|(_, tool)| tool)
    }

    /// All registered tools. Order is unspecified.
    pub fn values(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Specs published to the model, sorted by name for a stable request shape.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.iter().map(|e| e.value().spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolContext, ToolResult, ToolStreamEvent};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.0.into(),
                description: Some("test tool".into()),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn stream(
            &self,
            ctx: ToolContext,
            _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
        ) -> Result<ToolResult, Error> {
            Ok(ToolResult::success(ctx.tool_use.tool_use_id, vec![]))
        }
    }

    struct BadDescriptionTool;

    #[async_trait]
    impl Tool for BadDescriptionTool {
        fn name(&self) -> &str {
            "bad"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "bad".into(),
                description: Some(String::new()),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn stream(
            &self,
            ctx: ToolContext,
            _progress_tx: Option<mpsc::Sender<ToolStreamEvent>>,
        ) -> Result<ToolResult, Error> {
            Ok(ToolResult::success(ctx.tool_use.tool_use_id, vec![]))
        }
    }

    /// **Scenario**: add / get / remove / values round trip.
    #[test]
    fn add_get_remove() {
        let registry = ToolRegistry::new();
        registry.add(Arc::new(NamedTool("alpha"))).unwrap();
        registry.add(Arc::new(NamedTool("beta"))).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get_by_name("alpha").is_some());
        assert!(registry.get_by_name("missing").is_none());

        let removed = registry.remove_by_name("alpha").unwrap();
        assert_eq!(removed.name(), "alpha");
        assert!(registry.get_by_name("alpha").is_none());
        assert_eq!(registry.len(), 1);
    }

    /// **Scenario**: Duplicate names are rejected and the original survives.
    #[test]
    fn duplicate_name_rejected() {
        let registry = ToolRegistry::new();
        registry.add(Arc::new(NamedTool("alpha"))).unwrap();
        let err = registry.add(Arc::new(NamedTool("alpha"))).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(registry.len(), 1);
    }

    /// **Scenario**: Insert is atomic; a failed validation leaves the
    /// registry unchanged.
    #[test]
    fn failed_insert_leaves_registry_unchanged() {
        let registry = ToolRegistry::new();
        registry.add(Arc::new(NamedTool("alpha"))).unwrap();
        assert!(registry.add(Arc::new(BadDescriptionTool)).is_err());
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_name("bad").is_none());
    }

    /// **Scenario**: specs() is sorted by name.
    #[test]
    fn specs_sorted_by_name() {
        let registry = ToolRegistry::new();
        registry.add(Arc::new(NamedTool("zeta"))).unwrap();
        registry.add(Arc::new(NamedTool("alpha"))).unwrap();
        let names: Vec<_> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
