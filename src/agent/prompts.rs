//! Prompt templates and the persona/context-provider building blocks (spec
//! §4.1 "build the system prompt from the context-provider chain").

use chrono::Utc;
use handlebars::Handlebars;
use serde::Serialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Default path for the persona file, relative to the workspace.
pub const PERSONA_FILE_PATH: &str = "persona.md";

/// Embedded default persona, deployed by `hearth init` (spec §6).
pub const DEFAULT_PERSONA: &str = include_str!("../../assets/persona.md");

/// The base system prompt every Run starts from, before persona/channel/
/// capability/ego context is layered on.
pub const BASE_SYSTEM_PROMPT: &str = r#"You are Hearth, an autonomous household assistant. You watch over the home, \
respond to the people who live there, and act on their behalf using the tools available to you.

Be direct and conversational. Use a tool when a request requires it; otherwise just answer. \
Never claim to have done something you didn't actually do with a tool."#;

/// A prompt template using Handlebars syntax.
pub struct PromptTemplate {
    name: String,
    registry: Handlebars<'static>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, template: &str) -> Result<Self> {
        let name = name.into();
        let mut registry = Handlebars::new();

        registry
            .register_template_string(&name, template)
            .map_err(|e| Error::Internal(format!("Invalid template: {}", e)))?;

        Ok(PromptTemplate { name, registry })
    }

    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(&self.name, data)
            .map_err(|e| Error::Internal(format!("Template render error: {}", e)))
    }
}

// ============================================================================
// Persona
// ============================================================================

/// The household's persona file: tone, standing preferences, house rules.
/// Distinct from "ego self-notes" (`agent::context::EgoNotes`), which is the
/// agent's own running journal rather than household-authored configuration.
#[derive(Debug, Clone)]
pub struct Persona {
    pub content: String,
    path: String,
}

impl Persona {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to load persona file: {}", e)))?;
        Ok(Persona {
            content,
            path: path.to_string_lossy().to_string(),
        })
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load_from(&path).unwrap_or_else(|_| Persona {
            content: DEFAULT_PERSONA.to_string(),
            path: path.as_ref().to_string_lossy().to_string(),
        })
    }

    pub fn as_context_block(&self) -> String {
        format!("## Persona\n\n{}", self.content.trim())
    }
}

impl Default for Persona {
    fn default() -> Self {
        Persona {
            content: DEFAULT_PERSONA.to_string(),
            path: PERSONA_FILE_PATH.to_string(),
        }
    }
}

/// Summarization prompt template, used by the loop's post-Run Compact step.
pub const SUMMARIZATION_PROMPT: &str = r#"Summarize the conversation below into a short paragraph that preserves \
names, preferences, decisions, and open tasks a household assistant would need to remember.

{{content}}

{{#if max_length}}
**Maximum length:** {{max_length}} words
{{/if}}
"#;

/// Self-reflection prompt template for the scheduled self-reflection task
/// (spec §4.4 "periodic self-reflection reads a self-notes file").
pub const SELF_REFLECTION_PROMPT: &str = r#"Take a moment to reflect on the household and your own recent activity.

{{#if notes}}
**Your notes so far:**
{{notes}}
{{/if}}

Note anything worth remembering for next time, and update your notes if useful."#;

/// A simple builder for assembling multi-section system prompts, mirroring
/// the teacher's section/text/list composition style.
#[derive(Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        PromptBuilder { parts: Vec::new() }
    }

    pub fn section(mut self, header: &str, content: &str) -> Self {
        if !content.trim().is_empty() {
            self.parts.push(format!("## {}\n{}", header, content));
        }
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        if !text.trim().is_empty() {
            self.parts.push(text.to_string());
        }
        self
    }

    pub fn list(mut self, items: &[&str]) -> Self {
        if !items.is_empty() {
            let list = items.iter().map(|item| format!("- {}", item)).collect::<Vec<_>>().join("\n");
            self.parts.push(list);
        }
        self
    }

    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}

pub fn format_timestamp_note() -> String {
    format!("Current time: {}", Utc::now().format("%Y-%m-%d %H:%M UTC"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_template() {
        let template = PromptTemplate::new("test", "Hello, {{name}}!").unwrap();
        let result = template.render(&json!({"name": "World"})).unwrap();
        assert_eq!(result, "Hello, World!");
    }

    #[test]
    fn test_prompt_builder_skips_empty_sections() {
        let prompt = PromptBuilder::new()
            .section("Introduction", "This is a test")
            .section("Empty", "")
            .list(&["Item 1", "Item 2"])
            .build();

        assert!(prompt.contains("## Introduction"));
        assert!(!prompt.contains("## Empty"));
        assert!(prompt.contains("- Item 1"));
    }

    #[test]
    fn test_default_persona_loads() {
        let persona = Persona::default();
        assert!(!persona.content.is_empty());
    }
}
