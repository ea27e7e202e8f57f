// crates/story-gate-providers/src/files.rs
// ============================================================================
// Module: Confined File Access
// Description: Root-confined, size-limited file reads for providers.
// Purpose: Keep provider file access inside an operator-chosen directory.
// Dependencies: story-gate-core
// ============================================================================

//! ## Overview
//! Providers derive file names from story identifiers, which come from
//! callers. Identifiers are restricted to a safe character set, the joined
//! path is canonicalized, and the result must stay under the canonical root.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use story_gate_core::ProviderError;
use story_gate_core::StoryId;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default maximum provider file size in bytes.
pub const DEFAULT_MAX_FILE_BYTES: usize = 1024 * 1024;
/// Maximum story identifier length usable in a file name.
const MAX_STORY_FILE_STEM: usize = 200;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Result of resolving a file under the root.
pub(crate) enum Resolved {
    /// File exists inside the root.
    Found(PathBuf),
    /// File does not exist.
    Missing,
}

/// Validates a story identifier for use inside a file name.
pub(crate) fn story_file_stem(story_id: &StoryId) -> Result<&str, ProviderError> {
    let stem = story_id.as_str();
    let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.');
    if stem.is_empty()
        || stem.len() > MAX_STORY_FILE_STEM
        || stem.starts_with('.')
        || !stem.chars().all(allowed)
    {
        return Err(ProviderError::Failed(format!(
            "story id '{stem}' cannot be mapped to a file name"
        )));
    }
    Ok(stem)
}

/// Canonicalizes the root directory.
pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf, ProviderError> {
    let canonical = root
        .canonicalize()
        .map_err(|_| ProviderError::Failed(format!("invalid provider root {}", root.display())))?;
    if !canonical.is_dir() {
        return Err(ProviderError::Failed(format!(
            "provider root {} is not a directory",
            root.display()
        )));
    }
    Ok(canonical)
}

/// Resolves `name` under `root`, rejecting paths that escape it.
pub(crate) fn resolve_in_root(root: &Path, name: &str) -> Result<Resolved, ProviderError> {
    let root = canonical_root(root)?;
    let joined = root.join(name);
    let resolved = match joined.canonicalize() {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Resolved::Missing),
        Err(_) => {
            return Err(ProviderError::Failed(format!("unable to resolve provider file {name}")));
        }
    };
    if !resolved.starts_with(&root) {
        return Err(ProviderError::Failed(format!("provider file {name} escapes root")));
    }
    if !resolved.is_file() {
        return Err(ProviderError::Failed(format!("provider file {name} is not a regular file")));
    }
    Ok(Resolved::Found(resolved))
}

/// Reads a file while enforcing a maximum byte limit.
pub(crate) fn read_file_limited(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ProviderError> {
    let file = File::open(path).map_err(|err| {
        ProviderError::Failed(format!("unable to open {}: {err}", path.display()))
    })?;
    let limit = u64::try_from(max_bytes.saturating_add(1))
        .map_err(|_| ProviderError::Failed("file size limit exceeds u64".to_string()))?;
    let mut buf = Vec::new();
    file.take(limit).read_to_end(&mut buf).map_err(|err| {
        ProviderError::Failed(format!("unable to read {}: {err}", path.display()))
    })?;
    if buf.len() > max_bytes {
        return Err(ProviderError::Failed(format!(
            "{} exceeds size limit of {max_bytes} bytes",
            path.display()
        )));
    }
    Ok(buf)
}
