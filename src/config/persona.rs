// Persona for post generation
//
// One explicit value loaded at startup and shared by every stage and the
// reviewer, so the voice stays identical across retries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Author persona injected into stage and review prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    /// Display name
    pub name: String,

    /// Account handle, e.g. "@quill"
    pub handle: String,

    /// Current role, shown in prompts as "<role>"
    pub role: String,

    /// Background facts the writer may draw on (real experience only)
    pub background: Vec<String>,

    /// Tone description ("Professional but approachable")
    pub voice: String,

    /// Hard rules for every post
    pub content_rules: Vec<String>,

    /// Openers that sound like the author
    pub authentic_phrases: Vec<String>,

    /// Phrases and claims the author never makes
    pub avoid_phrases: Vec<String>,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Quill".to_string(),
            handle: "@quill".to_string(),
            role: "Automation engineer".to_string(),
            background: vec![
                "Builds AI automation for small teams".to_string(),
                "Writes about what worked and what did not".to_string(),
            ],
            voice: "Professional but approachable, concrete, no hype".to_string(),
            content_rules: vec![
                "Only reference real experience".to_string(),
                "Prefer specific numbers over adjectives".to_string(),
                "One idea per post".to_string(),
            ],
            authentic_phrases: vec![
                "From what I've shipped...".to_string(),
                "In my own projects...".to_string(),
            ],
            avoid_phrases: vec![
                "Made-up client stories".to_string(),
                "Exaggerated or fictional credentials".to_string(),
                "Game changer".to_string(),
            ],
        }
    }
}

impl Persona {
    /// Load persona from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read persona from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse persona TOML: {}", path.display()))
    }

    /// Load from `path` when given, otherwise the built-in default
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Persona block appended to stage system prompts
    pub fn to_system_block(&self) -> String {
        let mut block = format!(
            "AUTHOR PERSONA:\n- Name: {} ({})\n- Role: {}\n- Voice: {}\n",
            self.name, self.handle, self.role, self.voice
        );

        push_list(&mut block, "Background", &self.background);
        push_list(&mut block, "Rules", &self.content_rules);
        push_list(&mut block, "Phrases that sound like the author", &self.authentic_phrases);
        push_list(&mut block, "Never use", &self.avoid_phrases);

        block
    }
}

fn push_list(block: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    block.push_str(title);
    block.push_str(":\n");
    for item in items {
        block.push_str("  - ");
        block.push_str(item);
        block.push('\n');
    }
}
