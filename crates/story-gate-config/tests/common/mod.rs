// crates/story-gate-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across integration tests for story-gate-config.
// ============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use story_gate_config::ConfigError;
use story_gate_config::StoryGateConfig;

/// Result type for config tests.
pub type TestResult = Result<(), String>;

/// Parses a TOML string into a `StoryGateConfig` without validation.
pub fn config_from_toml(toml_str: &str) -> Result<StoryGateConfig, String> {
    toml::from_str(toml_str).map_err(|err| err.to_string())
}

/// Writes `content` to `name` under `dir` and returns the path.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf, String> {
    let path = dir.join(name);
    fs::write(&path, content).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Asserts that a result is an error whose message contains `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
