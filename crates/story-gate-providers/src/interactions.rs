// crates/story-gate-providers/src/interactions.rs
// ============================================================================
// Module: File Interaction Log Source
// Description: Interaction log source backed by per-story JSON files.
// Purpose: Feed agent prompts and responses to the security scanner.
// Dependencies: story-gate-core, serde, serde_json, tracing
// ============================================================================

//! ## Overview
//! Logs live at `<root>/story-<story>-interactions.json` and hold a JSON
//! array. Each element is either a plain string or an object with optional
//! `agent`, `prompt`, and `response` fields; objects are flattened to
//! `"<prompt> <response>"`. A missing file yields an empty sequence, which
//! the scanner treats as no findings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde::Deserialize;
use story_gate_core::InteractionLogSource;
use story_gate_core::ProviderError;
use story_gate_core::StoryId;
use tracing::debug;

use crate::files::DEFAULT_MAX_FILE_BYTES;
use crate::files::Resolved;
use crate::files::read_file_limited;
use crate::files::resolve_in_root;
use crate::files::story_file_stem;

// ============================================================================
// SECTION: Log Entries
// ============================================================================

/// One logged interaction.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogEntry {
    /// Raw interaction text.
    Text(String),
    /// Structured prompt/response pair; other keys such as `agent` are ignored.
    Exchange {
        /// Prompt sent to the agent.
        #[serde(default)]
        prompt: String,
        /// Agent response.
        #[serde(default)]
        response: String,
    },
}

impl LogEntry {
    /// Flattens the entry into scannable text.
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Exchange {
                prompt,
                response,
                ..
            } => format!("{prompt} {response}"),
        }
    }
}

// ============================================================================
// SECTION: Source
// ============================================================================

/// Interaction log source reading per-story JSON files.
#[derive(Debug, Clone)]
pub struct FileInteractionLogSource {
    /// Directory holding interaction logs.
    root: PathBuf,
    /// Maximum log size in bytes.
    max_bytes: usize,
}

impl FileInteractionLogSource {
    /// Creates a source rooted at `root` with the default size limit.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Overrides the maximum log size.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl InteractionLogSource for FileInteractionLogSource {
    fn interactions(&self, story_id: &StoryId) -> Result<Vec<String>, ProviderError> {
        let stem = story_file_stem(story_id)?;
        let name = format!("story-{stem}-interactions.json");
        let path = match resolve_in_root(&self.root, &name)? {
            Resolved::Found(path) => path,
            Resolved::Missing => {
                debug!(story_id = %story_id, "no interaction log");
                return Ok(Vec::new());
            }
        };
        let bytes = read_file_limited(&path, self.max_bytes)?;
        let entries: Vec<LogEntry> = serde_json::from_slice(&bytes)
            .map_err(|err| ProviderError::Failed(format!("invalid interaction log: {err}")))?;
        let texts: Vec<String> = entries.into_iter().map(LogEntry::into_text).collect();
        debug!(story_id = %story_id, entries = texts.len(), "interaction log loaded");
        Ok(texts)
    }
}
