// crates/story-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Tests for file loading limits and path handling.
// Purpose: Ensure oversized, non-UTF-8, or badly addressed files fail closed.
// ============================================================================

//! ## Overview
//! Exercises `StoryGateConfig::load` against path length limits, file size
//! limits, encoding checks, and relative path resolution.

use std::path::PathBuf;

use story_gate_config::ConfigError;
use story_gate_config::StoryGateConfig;

mod common;

use common::TestResult;
use common::assert_invalid;
use common::write_file;

#[test]
fn load_rejects_overlong_path() -> TestResult {
    let path = PathBuf::from("a".repeat(5000));
    assert_invalid(StoryGateConfig::load(Some(&path)), "config path exceeds max length")
}

#[test]
fn load_rejects_overlong_path_component() -> TestResult {
    let path = PathBuf::from(format!("configs/{}/story-gate.toml", "c".repeat(300)));
    assert_invalid(StoryGateConfig::load(Some(&path)), "config path component too long")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let mut content = b"# ".to_vec();
    content.resize(1_048_577, b'x');
    let path = write_file(dir.path(), "story-gate.toml", &content)?;
    assert_invalid(StoryGateConfig::load(Some(&path)), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = write_file(dir.path(), "story-gate.toml", &[0x5b, 0xff, 0xfe, 0x5d])?;
    assert_invalid(StoryGateConfig::load(Some(&path)), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io_error() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    match StoryGateConfig::load(Some(&dir.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {other:?}")),
    }
}

#[test]
fn load_reports_syntax_errors_as_parse_errors() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = write_file(dir.path(), "story-gate.toml", b"[project\nid = 1")?;
    match StoryGateConfig::load(Some(&path)) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {other:?}")),
    }
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = write_file(dir.path(), "story-gate.toml", b"[project]\nname = \"x\"\n")?;
    assert_invalid(StoryGateConfig::load(Some(&path)), "unknown field")
}

#[test]
fn load_resolves_relative_paths_against_config_dir() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = write_file(
        dir.path(),
        "story-gate.toml",
        b"[store]\ntype = \"sqlite\"\npath = \"state/gate.db\"\n",
    )?;
    let config = StoryGateConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    let sqlite = config.sqlite_config().ok_or("expected sqlite config")?;
    if sqlite.path != dir.path().join("state/gate.db") {
        return Err(format!("unexpected store path {}", sqlite.path.display()));
    }
    Ok(())
}

#[test]
fn load_reads_pattern_file_next_to_config() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    write_file(
        dir.path(),
        "patterns.toml",
        br#"
[[rules]]
id = "custom-exfil"
category = "suspicious_language"
phrase = "send the api keys"
weight = 0.9
"#,
    )?;
    let path = write_file(
        dir.path(),
        "story-gate.toml",
        b"[security]\nbuiltin = false\npattern_file = \"patterns.toml\"\n",
    )?;
    let config = StoryGateConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    let library = config.pattern_library().map_err(|err| err.to_string())?;
    if library.rule_count() != 1 {
        return Err(format!("expected one rule, got {}", library.rule_count()));
    }
    Ok(())
}

#[test]
fn load_reads_json_pattern_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    write_file(
        dir.path(),
        "patterns.json",
        br#"{"thresholds":{"low":0.2,"medium":0.5,"high":0.7},"rules":[{"id":"j1","category":"jailbreak","phrase":"unlock hidden mode","weight":0.7}]}"#,
    )?;
    let path = write_file(
        dir.path(),
        "story-gate.toml",
        b"[security]\npattern_file = \"patterns.json\"\n",
    )?;
    let config = StoryGateConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    let library = config.pattern_library().map_err(|err| err.to_string())?;
    let builtin = story_gate_core::PatternLibrary::builtin().map_err(|err| err.to_string())?;
    if library.rule_count() != builtin.rule_count() + 1 {
        return Err("pattern file rules should extend the builtin catalog".to_string());
    }
    if (library.thresholds().low - 0.2).abs() > f64::EPSILON {
        return Err("pattern file thresholds should apply".to_string());
    }
    Ok(())
}

#[test]
fn load_fails_when_pattern_file_is_missing() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = write_file(
        dir.path(),
        "story-gate.toml",
        b"[security]\npattern_file = \"missing.toml\"\n",
    )?;
    let config = StoryGateConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    assert_invalid(config.pattern_library(), "pattern file")
}
