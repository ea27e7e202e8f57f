// system-tests/tests/helpers/artifacts.rs
// ============================================================================
// Module: Test Artifacts
// Description: Per-test artifact directories and run summaries.
// Purpose: Keep validation runs and a canonical summary for every test.
// Dependencies: system-tests, serde, serde_jcs, story-gate-core
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use story_gate_core::ValidationRun;
use story_gate_core::Verdict;
use system_tests::config::SystemTestConfig;

/// Run digest kept in the summary.
#[derive(Debug, Serialize)]
struct RunDigest {
    run_id: String,
    verdict: Verdict,
    reasons: Vec<String>,
    evidence_hash: String,
    signed: bool,
}

impl RunDigest {
    fn of(run: &ValidationRun) -> Self {
        Self {
            run_id: run.run_id.as_str().to_string(),
            verdict: run.verdict,
            reasons: run.reasons.iter().map(|reason| reason.message.clone()).collect(),
            evidence_hash: run.evidence_hash.value.clone(),
            signed: run.signature.is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TestSummary<'a> {
    test_name: &'a str,
    status: &'a str,
    duration_ms: u128,
    notes: &'a [String],
    runs: &'a [RunDigest],
    files: &'a [String],
}

fn unix_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis())
}

/// Artifact directory owned by one test.
#[derive(Debug, Clone)]
pub struct TestArtifacts {
    root: PathBuf,
}

impl TestArtifacts {
    /// Creates `<run root>/<test_name>`, defaulting the run root to a
    /// timestamped directory under `target/system-tests`.
    pub fn new(test_name: &str) -> io::Result<Self> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let run_root = config.run_root.unwrap_or_else(|| {
            PathBuf::from("target/system-tests").join(format!("run_{}", unix_millis()))
        });
        let root = run_root.join(test_name);
        fs::create_dir_all(root.join("runs"))?;
        Ok(Self {
            root,
        })
    }

    /// Returns the artifact directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `value` as canonical JSON to `name` and returns the relative name.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> io::Result<String> {
        let bytes = serde_jcs::to_vec(value).map_err(|err| io::Error::other(err.to_string()))?;
        fs::write(self.root.join(name), bytes)?;
        Ok(name.to_string())
    }

    /// Writes a validation run to `runs/<story>-<sequence>.json`.
    pub fn write_run(&self, run: &ValidationRun) -> io::Result<String> {
        let name = format!("runs/{}-{}.json", run.story_id.as_str(), run.sequence);
        self.write_json(&name, run)
    }
}

/// Collects runs for a test and writes `summary.json` on finish or drop.
pub struct TestReporter {
    name: String,
    artifacts: TestArtifacts,
    started_at_ms: u128,
    runs: Vec<RunDigest>,
    files: Vec<String>,
    finished: bool,
}

impl TestReporter {
    /// Creates a reporter for the named test.
    pub fn new(test_name: &str) -> io::Result<Self> {
        Ok(Self {
            name: test_name.to_string(),
            artifacts: TestArtifacts::new(test_name)?,
            started_at_ms: unix_millis(),
            runs: Vec::new(),
            files: Vec::new(),
            finished: false,
        })
    }

    /// Returns the artifact directory.
    pub fn artifacts(&self) -> &TestArtifacts {
        &self.artifacts
    }

    /// Persists `run` and adds it to the summary.
    pub fn record_run(&mut self, run: &ValidationRun) -> io::Result<()> {
        let file = self.artifacts.write_run(run)?;
        self.files.push(file);
        self.runs.push(RunDigest::of(run));
        Ok(())
    }

    /// Writes the summary with the final `status`.
    pub fn finish(&mut self, status: &str, notes: &[&str]) -> io::Result<()> {
        let notes: Vec<String> = notes.iter().map(|note| (*note).to_string()).collect();
        let summary = TestSummary {
            test_name: &self.name,
            status,
            duration_ms: unix_millis().saturating_sub(self.started_at_ms),
            notes: &notes,
            runs: &self.runs,
            files: &self.files,
        };
        self.artifacts.write_json("summary.json", &summary)?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for TestReporter {
    fn drop(&mut self) {
        if !self.finished {
            let status = if std::thread::panicking() { "panic" } else { "unfinished" };
            let _ = self.finish(status, &["test ended without a summary"]);
        }
    }
}
