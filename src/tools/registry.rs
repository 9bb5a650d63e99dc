//! Tool registry - manages available tools for the agent
//!
//! Also hosts the pure tool-visibility computation used by the agent loop
//! (spec "Tool visibility computation"): a function of (registry, active
//! capability tags, excluded tools, optional delegation gating list).

use std::collections::{HashMap, HashSet};

use crate::agent::types::ToolDefinition;
use crate::error::Result;

use super::traits::{Tool, ToolCall, ToolResult};

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        match self.get(&call.name) {
            Some(tool) => tool.execute(call.arguments.clone()).await,
            None => Ok(ToolResult::failure(format!(
                "Unknown tool: {}",
                call.name
            ))),
        }
    }

    /// Get tool count
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// List tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Compute the set of tool names visible for one agent-loop iteration.
    ///
    /// Order of application (spec §4.1 "Tool visibility computation"):
    /// 1. Start from all registered tools.
    /// 2. If `gated` is `Some`, restrict to that list (delegation gating).
    /// 3. Unless `skip_tag_filter`, keep only tools with an active tag or no tags at all.
    /// 4. Remove anything in `exclude_tools`.
    pub fn visible_tool_names(
        &self,
        active_tags: &HashSet<String>,
        exclude_tools: &[String],
        skip_tag_filter: bool,
        gated: Option<&[String]>,
    ) -> Vec<String> {
        let exclude: HashSet<&str> = exclude_tools.iter().map(|s| s.as_str()).collect();

        let base: Vec<&str> = match gated {
            Some(list) => list
                .iter()
                .map(|s| s.as_str())
                .filter(|name| self.tools.contains_key(*name))
                .collect(),
            None => self.tools.keys().map(|s| s.as_str()).collect(),
        };

        base.into_iter()
            .filter(|name| {
                if exclude.contains(*name) {
                    return false;
                }
                if skip_tag_filter {
                    return true;
                }
                let tags = self.tools.get(*name).map(|t| t.tags()).unwrap_or(&[]);
                tags.is_empty() || tags.iter().any(|t| active_tags.contains(t))
            })
            .map(|s| s.to_string())
            .collect()
    }

    /// Tool definitions restricted to the given visible names, preserving
    /// registry order.
    pub fn definitions_for(&self, visible: &[String]) -> Vec<ToolDefinition> {
        let visible: HashSet<&str> = visible.iter().map(|s| s.as_str()).collect();
        self.tools
            .iter()
            .filter(|(name, _)| visible.contains(name.as_str()))
            .map(|(_, t)| t.to_definition())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::traits::ToolResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct TaggedTool {
        name: String,
        tags: Vec<String>,
    }

    #[async_trait]
    impl Tool for TaggedTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success("ok"))
        }
        fn tags(&self) -> &[String] {
            &self.tags
        }
    }

    #[test]
    fn test_tool_result() {
        let success = ToolResult::success("Done!");
        assert!(success.success);
        assert_eq!(success.content.as_deref(), Some("Done!"));

        let failure = ToolResult::failure("Oops!");
        assert!(!failure.success);
        assert_eq!(failure.error.as_deref(), Some("Oops!"));
    }

    fn registry_with_tagged_tools() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(TaggedTool {
            name: "untagged_tool".into(),
            tags: vec![],
        });
        reg.register(TaggedTool {
            name: "home_tool".into(),
            tags: vec!["home".into()],
        });
        reg.register(TaggedTool {
            name: "finance_tool".into(),
            tags: vec!["finance".into()],
        });
        reg
    }

    #[test]
    fn test_untagged_tools_always_visible() {
        let reg = registry_with_tagged_tools();
        let active = HashSet::new();
        let visible = reg.visible_tool_names(&active, &[], false, None);
        assert!(visible.contains(&"untagged_tool".to_string()));
        assert!(!visible.contains(&"home_tool".to_string()));
    }

    #[test]
    fn test_active_tag_unlocks_tool() {
        let reg = registry_with_tagged_tools();
        let mut active = HashSet::new();
        active.insert("home".to_string());
        let visible = reg.visible_tool_names(&active, &[], false, None);
        assert!(visible.contains(&"home_tool".to_string()));
        assert!(!visible.contains(&"finance_tool".to_string()));
    }

    #[test]
    fn test_skip_tag_filter_reveals_everything() {
        let reg = registry_with_tagged_tools();
        let active = HashSet::new();
        let visible = reg.visible_tool_names(&active, &[], true, None);
        assert_eq!(visible.len(), 3);
    }

    #[test]
    fn test_exclude_tools_removed_even_when_gated() {
        let reg = registry_with_tagged_tools();
        let active = HashSet::new();
        let gated = vec!["untagged_tool".to_string(), "home_tool".to_string()];
        let visible = reg.visible_tool_names(
            &active,
            &["untagged_tool".to_string()],
            true,
            Some(&gated),
        );
        assert_eq!(visible, vec!["home_tool".to_string()]);
    }

    #[test]
    fn test_gating_restricts_to_list() {
        let reg = registry_with_tagged_tools();
        let mut active = HashSet::new();
        active.insert("home".to_string());
        active.insert("finance".to_string());
        let gated = vec!["home_tool".to_string()];
        let visible = reg.visible_tool_names(&active, &[], false, Some(&gated));
        assert_eq!(visible, vec!["home_tool".to_string()]);
    }
}
