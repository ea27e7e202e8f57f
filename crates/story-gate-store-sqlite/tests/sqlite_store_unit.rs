// crates/story-gate-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Gate Store Unit Tests
// Description: Integrity tests for the SQLite baseline, ledger, and run stores.
// Purpose: Validate path safety, schema versioning, ordering rules, persistence,
//          and corruption detection.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks (empty/component/directory rejection)
//! - Schema version validation
//! - Baseline seeding, history, and listing across reopen
//! - Ledger monotonicity and window queries
//! - Run sequencing and ordering
//! - Tamper detection on every table
//! - Concurrent seeding of the same key

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use rusqlite::Connection;
use rusqlite::params;
use story_gate_core::AgentId;
use story_gate_core::BaselineEntry;
use story_gate_core::BaselineOrigin;
use story_gate_core::BaselineStore;
use story_gate_core::CostEvent;
use story_gate_core::CostLedgerStore;
use story_gate_core::DEFAULT_HASH_ALGORITHM;
use story_gate_core::HashDigest;
use story_gate_core::LedgerAppendError;
use story_gate_core::MetricName;
use story_gate_core::ModelId;
use story_gate_core::Money;
use story_gate_core::ProjectId;
use story_gate_core::RunHistoryStore;
use story_gate_core::RunId;
use story_gate_core::RunPhase;
use story_gate_core::SeedOutcome;
use story_gate_core::StageSet;
use story_gate_core::StoreError;
use story_gate_core::StoryId;
use story_gate_core::TimeWindow;
use story_gate_core::Timestamp;
use story_gate_core::ValidationMode;
use story_gate_core::ValidationRun;
use story_gate_core::Verdict;
use story_gate_store_sqlite::SqliteGateStore;
use story_gate_store_sqlite::SqliteStoreConfig;
use story_gate_store_sqlite::SqliteStoreError;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const T0: i64 = 1_773_100_800_000;

fn at(offset_ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + offset_ms)
}

fn store_for(path: &Path) -> SqliteGateStore {
    SqliteGateStore::new(SqliteStoreConfig::new(path.to_path_buf())).expect("store init")
}

fn entry(value: f64, offset_ms: i64, origin: BaselineOrigin) -> BaselineEntry {
    BaselineEntry {
        value,
        recorded_at: at(offset_ms),
        note: None,
        origin,
    }
}

fn event(offset_ms: i64, input_tokens: u64) -> CostEvent {
    CostEvent {
        timestamp: at(offset_ms),
        agent_id: AgentId::new("alpha"),
        model_id: ModelId::new("gpt-4o"),
        input_tokens,
        output_tokens: 0,
        story_id: Some(StoryId::new("S-1")),
        description: "implementation".to_string(),
    }
}

fn run(story: &str, sequence: u64, offset_ms: i64) -> ValidationRun {
    let story_id = StoryId::new(story);
    let mut run = ValidationRun {
        run_id: RunId::for_story(&story_id, sequence),
        story_id,
        sequence,
        agent_id: AgentId::new("alpha"),
        project_id: ProjectId::new("acme"),
        mode: ValidationMode::Basic,
        stage_set: StageSet::BASIC,
        requested_at: at(offset_ms),
        modified_paths: vec!["src/lib.rs".to_string()],
        phases: vec![RunPhase::Pending, RunPhase::Assembling, RunPhase::NotComplete],
        stages: Vec::new(),
        findings: Vec::new(),
        warnings: Vec::new(),
        verdict: Verdict::NotComplete,
        reasons: Vec::new(),
        evidence_hash: HashDigest::new(DEFAULT_HASH_ALGORITHM, &[]),
        signature: None,
    };
    run.evidence_hash = run.compute_evidence_hash(DEFAULT_HASH_ALGORITHM).expect("hash");
    run
}

fn temp_db() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("gate.sqlite");
    (temp, path)
}

// ============================================================================
// SECTION: Path Validation
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let Err(err) = SqliteGateStore::new(SqliteStoreConfig::new(temp.path().to_path_buf())) else {
        panic!("expected invalid directory path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_empty_path() {
    let Err(err) = SqliteGateStore::new(SqliteStoreConfig::new(PathBuf::new())) else {
        panic!("expected empty path to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

#[test]
fn sqlite_store_rejects_overlong_component() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a".repeat(300));
    let Err(err) = SqliteGateStore::new(SqliteStoreConfig::new(path)) else {
        panic!("expected overlong component to fail");
    };
    assert!(matches!(err, SqliteStoreError::Invalid(_)));
}

// ============================================================================
// SECTION: Schema Versioning
// ============================================================================

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let (_temp, path) = temp_db();
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE store_meta (version INTEGER NOT NULL);").unwrap();
    conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![999_i64]).unwrap();
    drop(conn);

    let Err(err) = SqliteGateStore::new(SqliteStoreConfig::new(path)) else {
        panic!("expected schema mismatch to fail");
    };
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
}

#[test]
fn sqlite_store_reopens_existing_schema() {
    let (_temp, path) = temp_db();
    drop(store_for(&path));
    let store = store_for(&path);
    store.integrity_check().expect("empty store is consistent");
}

// ============================================================================
// SECTION: Baselines
// ============================================================================

#[test]
fn seed_if_absent_seeds_once() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    let project = ProjectId::new("acme");
    let metric = MetricName::new("type_errors");

    let first =
        store.seed_if_absent(&project, &metric, entry(49.0, 0, BaselineOrigin::Seed)).unwrap();
    let SeedOutcome::Seeded(seeded) = first else {
        panic!("expected first seed to be stored");
    };
    assert_eq!(seeded.value(), Some(49.0));

    let second =
        store.seed_if_absent(&project, &metric, entry(52.0, 1, BaselineOrigin::Seed)).unwrap();
    let SeedOutcome::Existing(existing) = second else {
        panic!("expected existing baseline to win");
    };
    assert_eq!(existing.history.len(), 1);
    assert_eq!(existing.value(), Some(49.0));
}

#[test]
fn baseline_history_survives_reopen() {
    let (_temp, path) = temp_db();
    let project = ProjectId::new("acme");
    let errors = MetricName::new("type_errors");
    let coverage = MetricName::new("coverage");
    {
        let store = store_for(&path);
        store.seed_if_absent(&project, &errors, entry(49.0, 0, BaselineOrigin::Seed)).unwrap();
        let mut accepted = entry(52.0, 10, BaselineOrigin::Accepted);
        accepted.note = Some("new strictness flag".to_string());
        BaselineStore::append(&store, &project, &errors, accepted).unwrap();
        store.seed_if_absent(&project, &coverage, entry(81.5, 0, BaselineOrigin::Seed)).unwrap();
        store
            .seed_if_absent(&ProjectId::new("other"), &errors, entry(3.0, 0, BaselineOrigin::Seed))
            .unwrap();
    }

    let store = store_for(&path);
    let baseline = store.get(&project, &errors).unwrap().expect("baseline");
    assert_eq!(baseline.history.len(), 2);
    assert_eq!(baseline.value(), Some(52.0));
    assert_eq!(baseline.history[1].origin, BaselineOrigin::Accepted);
    assert_eq!(baseline.history[1].note.as_deref(), Some("new strictness flag"));

    let metrics: Vec<String> =
        store.list(&project).unwrap().iter().map(|baseline| baseline.metric.to_string()).collect();
    assert_eq!(metrics, vec!["coverage".to_string(), "type_errors".to_string()]);
    assert!(store.get(&project, &MetricName::new("lint")).unwrap().is_none());
}

#[test]
fn non_finite_baseline_is_rejected() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    let nan = entry(f64::NAN, 0, BaselineOrigin::Accepted);
    let err = BaselineStore::append(&store, &ProjectId::new("acme"), &MetricName::new("m"), nan)
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn concurrent_seeding_stores_exactly_one_entry() {
    let (_temp, path) = temp_db();
    let store = Arc::new(store_for(&path));
    let project = ProjectId::new("acme");
    let metric = MetricName::new("type_errors");

    let seeded: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0 .. 8_u32)
            .map(|index| {
                let store = Arc::clone(&store);
                let project = project.clone();
                let metric = metric.clone();
                scope.spawn(move || {
                    let outcome = store
                        .seed_if_absent(
                            &project,
                            &metric,
                            entry(f64::from(index), 0, BaselineOrigin::Seed),
                        )
                        .unwrap();
                    usize::from(matches!(outcome, SeedOutcome::Seeded(_)))
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).sum()
    });

    assert_eq!(seeded, 1);
    assert_eq!(store.get(&project, &metric).unwrap().expect("baseline").history.len(), 1);
}

// ============================================================================
// SECTION: Cost Ledger
// ============================================================================

#[test]
fn ledger_assigns_sequences_and_rejects_out_of_order() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    let cost = Money::parse("0.005").unwrap();

    let first = CostLedgerStore::append(&store, event(1_000, 1_000), cost.clone()).unwrap();
    let second = CostLedgerStore::append(&store, event(1_000, 500), cost.clone()).unwrap();
    assert_eq!((first.sequence, second.sequence), (1, 2));

    let err = CostLedgerStore::append(&store, event(999, 10), cost).unwrap_err();
    assert!(matches!(
        err,
        LedgerAppendError::OutOfOrder { latest, attempted } if latest == at(1_000) && attempted == at(999)
    ));
    assert_eq!(store.entries(&TimeWindow::unbounded()).unwrap().len(), 2);
}

#[test]
fn ledger_entries_respect_closed_window_and_survive_reopen() {
    let (_temp, path) = temp_db();
    {
        let store = store_for(&path);
        for offset in [0, 1_000, 2_000, 3_000] {
            let cost = Money::parse("0.0005").unwrap();
            CostLedgerStore::append(&store, event(offset, 100), cost).unwrap();
        }
    }

    let store = store_for(&path);
    let window = TimeWindow::new(at(1_000), at(2_000)).unwrap();
    let entries = store.entries(&window).unwrap();
    let sequences: Vec<u64> = entries.iter().map(|entry| entry.sequence).collect();
    assert_eq!(sequences, vec![2, 3]);
    assert_eq!(entries[0].cost, Money::parse("0.0005").unwrap());
    assert_eq!(entries[0].event.story_id, Some(StoryId::new("S-1")));
}

// ============================================================================
// SECTION: Run History
// ============================================================================

#[test]
fn run_history_enforces_next_sequence() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    store.append_run(&run("S-1", 1, 0)).unwrap();

    let duplicate = store.append_run(&run("S-1", 1, 5)).unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));
    let gap = store.append_run(&run("S-1", 3, 5)).unwrap_err();
    assert!(matches!(gap, StoreError::Conflict(_)));

    store.append_run(&run("S-1", 2, 10)).unwrap();
    let runs = store.runs_for_story(&StoryId::new("S-1")).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[1].run_id.as_str(), "S-1#2");
    assert_eq!(runs[1].evidence_hash, run("S-1", 2, 10).evidence_hash);
}

#[test]
fn all_runs_follow_append_order() {
    let (_temp, path) = temp_db();
    {
        let store = store_for(&path);
        store.append_run(&run("S-2", 1, 0)).unwrap();
        store.append_run(&run("S-1", 1, 0)).unwrap();
        store.append_run(&run("S-1", 2, 20)).unwrap();
        store.append_run(&run("S-2", 2, 10)).unwrap();
    }

    let store = store_for(&path);
    let order: Vec<String> =
        store.all_runs().unwrap().iter().map(|run| run.run_id.to_string()).collect();
    assert_eq!(order, vec!["S-2#1", "S-1#1", "S-1#2", "S-2#2"]);
    assert!(store.runs_for_story(&StoryId::new("S-3")).unwrap().is_empty());
}

// ============================================================================
// SECTION: Hash Integrity and Corruption
// ============================================================================

#[test]
fn tampered_cost_event_is_detected() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    CostLedgerStore::append(&store, event(0, 1_000), Money::parse("0.005").unwrap()).unwrap();

    let conn = Connection::open(&path).unwrap();
    let tampered = String::from_utf8(
        conn.query_row("SELECT entry_json FROM cost_events WHERE sequence = 1", [], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .unwrap(),
    )
    .unwrap()
    .replace("0.005", "0.001");
    conn.execute(
        "UPDATE cost_events SET entry_json = ?1 WHERE sequence = 1",
        params![tampered.into_bytes()],
    )
    .unwrap();

    let err = store.entries(&TimeWindow::unbounded()).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(matches!(store.integrity_check(), Err(SqliteStoreError::Corrupt(_))));
}

#[test]
fn tampered_baseline_value_is_detected() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    let project = ProjectId::new("acme");
    let metric = MetricName::new("type_errors");
    store.seed_if_absent(&project, &metric, entry(49.0, 0, BaselineOrigin::Seed)).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE baseline_history SET value = 99.0", []).unwrap();

    let err = store.get(&project, &metric).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn tampered_run_is_detected() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    store.append_run(&run("S-1", 1, 0)).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE validation_runs SET run_hash = ?1", params!["00".repeat(32)]).unwrap();

    assert!(matches!(store.runs_for_story(&StoryId::new("S-1")), Err(StoreError::Corrupt(_))));
    assert!(matches!(store.all_runs(), Err(StoreError::Corrupt(_))));
}

#[test]
fn unknown_hash_algorithm_is_invalid() {
    let (_temp, path) = temp_db();
    let store = store_for(&path);
    store.append_run(&run("S-1", 1, 0)).unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute("UPDATE validation_runs SET hash_algorithm = 'md5'", []).unwrap();

    assert!(matches!(store.all_runs(), Err(StoreError::Invalid(_))));
}
