//! Context-provider chain (spec §4.1 "build the system prompt from the
//! context-provider chain: persona, channel context, capability context,
//! ego self-notes, optional conversation-history JSON block").
//!
//! Grounded in the teacher's `agent/prompts.rs` `Soul`/`PromptBuilder`
//! section-composition style, generalized from a single persona document
//! into a chain of independently-optional providers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::agent::prompts::{Persona, PromptBuilder, BASE_SYSTEM_PROMPT};
use crate::config::CapabilityTagConfig;

/// The agent's own running journal — distinct from the household-authored
/// `Persona`. Read by the scheduled self-reflection task and substituted
/// into its prompt (spec §4.4); the agent appends to it via its own tools.
pub struct EgoNotes {
    path: PathBuf,
}

impl EgoNotes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EgoNotes { path: path.into() }
    }

    /// Current contents, or empty if the notes file doesn't exist yet.
    pub fn read(&self) -> String {
        std::fs::read_to_string(&self.path).unwrap_or_default()
    }

    /// Append a dated note, creating the file if absent.
    pub fn append(&self, note: &str) -> std::io::Result<()> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "## {}\n{}\n", chrono::Utc::now().format("%Y-%m-%d %H:%M UTC"), note.trim())
    }
}

/// Resolves active-capability-tag seeding and the capability context block
/// from the configured tag set (spec §5 "always-active" vs. channel-pinned).
pub struct CapabilityContext<'a> {
    tags: &'a [CapabilityTagConfig],
}

impl<'a> CapabilityContext<'a> {
    pub fn new(tags: &'a [CapabilityTagConfig]) -> Self {
        CapabilityContext { tags }
    }

    /// Tags active at the start of a Run: every `always_active` tag, plus
    /// any tags pinned for the originating channel.
    pub fn seed_active_tags(&self, channel_pins: &[String]) -> HashSet<String> {
        let mut active: HashSet<String> = self
            .tags
            .iter()
            .filter(|t| t.always_active)
            .map(|t| t.name.clone())
            .collect();
        active.extend(channel_pins.iter().cloned());
        active
    }

    /// Concatenated contents of every active tag's `context_files`,
    /// one section per tag. Missing files are skipped (logged by the caller
    /// if it cares); a tag with no files contributes nothing.
    pub fn render(&self, active: &HashSet<String>, talents_dir: &Path) -> String {
        let mut blocks = Vec::new();
        for tag in self.tags {
            if !active.contains(&tag.name) {
                continue;
            }
            for file in &tag.context_files {
                let path = talents_dir.join(file);
                if let Ok(content) = std::fs::read_to_string(&path) {
                    blocks.push(format!("### {}\n{}", tag.name, content.trim()));
                }
            }
        }
        blocks.join("\n\n")
    }
}

/// Assembles the full system prompt from the context-provider chain. Any
/// empty section is omitted (via `PromptBuilder::section`'s blank-skip).
pub fn build_system_prompt(
    persona: &Persona,
    channel_context: Option<&str>,
    capability_context: &str,
    ego_notes: &str,
    history_block: Option<&str>,
) -> String {
    PromptBuilder::new()
        .text(BASE_SYSTEM_PROMPT)
        .section("Persona", &persona.content)
        .section("Channel context", channel_context.unwrap_or(""))
        .section("Capabilities", capability_context)
        .section("Notes", ego_notes)
        .section("Recent context", history_block.unwrap_or(""))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str, always_active: bool, context_files: Vec<&str>) -> CapabilityTagConfig {
        CapabilityTagConfig {
            name: name.to_string(),
            description: String::new(),
            tools: vec![],
            context_files: context_files.into_iter().map(String::from).collect(),
            always_active,
        }
    }

    #[test]
    fn test_seed_active_tags_combines_always_active_and_pins() {
        let tags = vec![tag("home", true, vec![]), tag("finance", false, vec![])];
        let ctx = CapabilityContext::new(&tags);
        let active = ctx.seed_active_tags(&["finance".to_string()]);
        assert!(active.contains("home"));
        assert!(active.contains("finance"));
    }

    #[test]
    fn test_render_skips_inactive_tags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("home.md"), "Kitchen is on the first floor.").unwrap();
        let tags = vec![tag("home", true, vec!["home.md"]), tag("finance", false, vec!["finance.md"])];
        let ctx = CapabilityContext::new(&tags);
        let active: HashSet<String> = ["home".to_string()].into_iter().collect();
        let rendered = ctx.render(&active, dir.path());
        assert!(rendered.contains("Kitchen is on the first floor."));
        assert!(!rendered.contains("finance"));
    }

    #[test]
    fn test_build_system_prompt_omits_empty_sections() {
        let persona = Persona::default();
        let prompt = build_system_prompt(&persona, None, "", "", None);
        assert!(prompt.contains("## Persona"));
        assert!(!prompt.contains("## Channel context"));
        assert!(!prompt.contains("## Capabilities"));
    }

    #[test]
    fn test_ego_notes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let notes = EgoNotes::new(dir.path().join("notes.md"));
        assert_eq!(notes.read(), "");
        notes.append("Remember the guest room heater is finicky.").unwrap();
        assert!(notes.read().contains("finicky"));
    }
}
