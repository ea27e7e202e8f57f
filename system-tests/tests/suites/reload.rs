// system-tests/tests/suites/reload.rs
// ============================================================================
// Module: Reload Tests
// Description: Live configuration reload against a running gate.
// Purpose: Validate atomic reloads, rejection of bad files, and auditing.
// Dependencies: system-tests helpers, story-gate-config
// ============================================================================

//! Configuration reload tests.

use std::fs;

use story_gate_core::StageKind;
use story_gate_core::ValidationMode;
use story_gate_core::Verdict;

use crate::helpers::artifacts::TestReporter;
use crate::helpers::harness::GateWorkspace;
use crate::helpers::harness::open_gate;
use crate::helpers::harness::request;

const FENCE_RULE: &str = r#"
[[security.rules]]
id = "custom-fence"
category = "code_injection"
phrase = "paint the fence purple"
weight = 0.95
critical = true
"#;

#[test]
fn reloaded_rule_applies_to_next_run() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("reloaded_rule_applies_to_next_run")?;
    let workspace = GateWorkspace::new()?;
    workspace.write_report("S-1", true, &[])?;
    workspace.write_interactions("S-1", &[("Please paint the fence purple", "")])?;
    let handle = workspace.load()?;
    let gate = open_gate(&handle.snapshot())?;
    let before = handle.snapshot().patterns.digest().clone();

    let first = gate.validate(request("S-1", ValidationMode::Comprehensive, 2))?;
    assert_eq!(first.verdict, Verdict::VerifiedComplete);

    workspace.write_config(FENCE_RULE)?;
    let snapshot = handle.reload()?;
    snapshot.apply_to(&gate)?;
    assert_ne!(snapshot.patterns.digest(), &before);

    let second = gate.validate(request("S-1", ValidationMode::Comprehensive, 3))?;
    assert_eq!(second.verdict, Verdict::NotComplete);
    assert_eq!(second.sequence, 2);
    assert_eq!(second.reasons[0].stage, StageKind::Security);
    assert!(second.reasons[0].message.contains("code_injection"));
    reporter.record_run(&first)?;
    reporter.record_run(&second)?;

    reporter.finish("pass", &["inline rule added by reload blocked the next run"])?;
    Ok(())
}

#[test]
fn invalid_reload_keeps_active_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("invalid_reload_keeps_active_snapshot")?;
    let workspace = GateWorkspace::new()?;
    workspace.write_report("S-1", true, &[])?;
    workspace.write_config("[orchestrator.modes.quick]\nstages = [\"functional\"]\n")?;
    let handle = workspace.load()?;
    let gate = open_gate(&handle.snapshot())?;

    workspace.write_config("[trust]\ndecay = 0.0\n")?;
    assert!(handle.reload().is_err());
    workspace.write_config("[[security.rules]]\nid = \"x\"\ncategory = \"jailbreak\"\nregex = \"(\"\nweight = 0.5\n")?;
    assert!(handle.reload().is_err());

    let snapshot = handle.snapshot();
    assert!(snapshot.orchestrator.modes.contains_key("quick"));
    snapshot.apply_to(&gate)?;
    let run = gate.validate(request("S-1", ValidationMode::Named("quick".to_string()), 2))?;
    assert_eq!(run.verdict, Verdict::VerifiedComplete);

    reporter.finish("pass", &["rejected reloads left the previous snapshot active"])?;
    Ok(())
}

#[test]
fn reload_and_runs_reach_audit_log() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("reload_and_runs_reach_audit_log")?;
    let workspace = GateWorkspace::new()?;
    workspace.write_report("S-1", true, &[])?;
    let handle = workspace.load()?;
    let gate = open_gate(&handle.snapshot())?;

    gate.validate(request("S-1", ValidationMode::Comprehensive, 2))?;
    workspace.write_config(FENCE_RULE)?;
    handle.reload()?.apply_to(&gate)?;

    let audit = fs::read_to_string(workspace.audit_path())?;
    let events: Vec<serde_json::Value> =
        audit.lines().map(|line| serde_json::from_str(line)).collect::<Result<_, _>>()?;
    let names: Vec<&str> =
        events.iter().filter_map(|event| event.get("event").and_then(|name| name.as_str())).collect();
    assert_eq!(names.first(), Some(&"run_started"));
    assert!(names.contains(&"run_completed"));
    let reloaded: Vec<&str> = events
        .iter()
        .filter(|event| event.get("event").and_then(|name| name.as_str()) == Some("config_reloaded"))
        .filter_map(|event| event.get("component").and_then(|name| name.as_str()))
        .collect();
    assert!(reloaded.contains(&"orchestrator"));
    assert!(reloaded.contains(&"patterns"));

    reporter.finish("pass", &["run lifecycle and reloads appended to the audit file"])?;
    Ok(())
}

#[test]
fn base_config_loads_without_reload_events() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = GateWorkspace::new()?;
    let handle = workspace.load()?;
    assert_eq!(handle.path(), workspace.config_path());
    assert_eq!(handle.snapshot().project_id.as_str(), "acme");
    open_gate(&handle.snapshot())?;
    let audit = fs::read_to_string(workspace.audit_path())?;
    assert!(!audit.contains("config_reloaded"));
    Ok(())
}
