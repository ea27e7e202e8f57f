// crates/story-gate-providers/src/functional.rs
// ============================================================================
// Module: File Functional Check Provider
// Description: Functional-check provider backed by JSON or YAML report files.
// Purpose: Supply functional results and debt metrics produced by external tooling.
// Dependencies: story-gate-core, serde_json, serde_yaml, tracing
// ============================================================================

//! ## Overview
//! External test runners write one report per story to
//! `<root>/<story>.json` (or `.yaml` / `.yml`). A report has the shape
//! `{ "passed": bool, "debt_metrics": { "<metric>": number } }`. A story
//! without a report fails closed: the gate never treats absence as success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use story_gate_core::FunctionalCheckProvider;
use story_gate_core::FunctionalReport;
use story_gate_core::ProviderError;
use story_gate_core::StoryId;
use tracing::debug;

use crate::files::DEFAULT_MAX_FILE_BYTES;
use crate::files::Resolved;
use crate::files::read_file_limited;
use crate::files::resolve_in_root;
use crate::files::story_file_stem;

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Report file extensions in lookup order.
const REPORT_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Functional-check provider reading per-story report files.
#[derive(Debug, Clone)]
pub struct FileFunctionalCheckProvider {
    /// Directory holding report files.
    root: PathBuf,
    /// Maximum report size in bytes.
    max_bytes: usize,
}

impl FileFunctionalCheckProvider {
    /// Creates a provider rooted at `root` with the default size limit.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Overrides the maximum report size.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Returns the report directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds the first existing report file for a story.
    fn locate(&self, story_id: &StoryId) -> Result<PathBuf, ProviderError> {
        let stem = story_file_stem(story_id)?;
        for extension in REPORT_EXTENSIONS {
            let name = format!("{stem}.{extension}");
            if let Resolved::Found(path) = resolve_in_root(&self.root, &name)? {
                return Ok(path);
            }
        }
        Err(ProviderError::Failed(format!("no functional report for story {story_id}")))
    }
}

impl FunctionalCheckProvider for FileFunctionalCheckProvider {
    fn run(&self, story_id: &StoryId) -> Result<FunctionalReport, ProviderError> {
        let path = self.locate(story_id)?;
        let bytes = read_file_limited(&path, self.max_bytes)?;
        let report = parse_report(&path, &bytes)?;
        debug!(
            story_id = %story_id,
            passed = report.passed,
            metrics = report.debt_metrics.len(),
            "functional report loaded"
        );
        Ok(report)
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a JSON or YAML report based on the file extension.
fn parse_report(path: &Path, bytes: &[u8]) -> Result<FunctionalReport, ProviderError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension == "yaml" || extension == "yml" {
        return serde_yaml::from_slice(bytes)
            .map_err(|err| ProviderError::Failed(format!("invalid yaml report: {err}")));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| ProviderError::Failed(format!("invalid json report: {err}")))
}
