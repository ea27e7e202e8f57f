// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Gate Harness
// Description: Builds a file-backed gate from a configuration file.
// Purpose: Wire config, providers, SQLite, and the orchestrator end to end.
// Dependencies: story-gate-config, story-gate-core, story-gate-providers,
//               story-gate-store-sqlite, tempfile
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use serde_json::Value;
use serde_json::json;
use story_gate_config::ConfigHandle;
use story_gate_config::GateSnapshot;
use story_gate_core::AgentId;
use story_gate_core::BudgetMonitor;
use story_gate_core::CostLedger;
use story_gate_core::OrchestratorComponents;
use story_gate_core::ProjectId;
use story_gate_core::RegressionGate;
use story_gate_core::SecurityScanner;
use story_gate_core::StoryId;
use story_gate_core::Timestamp;
use story_gate_core::ValidationMode;
use story_gate_core::ValidationRequest;
use story_gate_core::VerificationOrchestrator;
use story_gate_providers::Ed25519ArtifactSigner;
use story_gate_providers::Ed25519ArtifactVerifier;
use story_gate_providers::FileFunctionalCheckProvider;
use story_gate_providers::FileInteractionLogSource;
use story_gate_store_sqlite::SqliteGateStore;
use system_tests::config::SystemTestConfig;
use tempfile::TempDir;

/// Orchestrator wired over file providers and one `SQLite` store.
pub type Gate = VerificationOrchestrator<
    FileFunctionalCheckProvider,
    FileInteractionLogSource,
    SqliteGateStore,
    SqliteGateStore,
    SqliteGateStore,
>;

/// Fixed time origin for requests (2026-03-10T00:00:00Z).
pub const T0: i64 = 1_773_100_800_000;
/// One hour in milliseconds.
pub const HOUR: i64 = 3_600_000;
/// Agent used by every request.
pub const AGENT: &str = "agent-7";

/// Signing seed written to `keys/signing.key`.
const SIGNING_SEED: [u8; 32] = [7; 32];

/// Base configuration shared by every workspace.
const BASE_CONFIG: &str = r#"
[project]
id = "acme"

[[budgets]]
period = "daily"
ceiling = 25

[providers]
reports_dir = "reports"
interactions_dir = "interactions"
signing_key = "keys/signing.key"
signing_key_id = "gate-1"

[audit]
sink = "file"
path = "audit.jsonl"

[store]
type = "sqlite"
path = "state/gate.db"
"#;

/// Temporary directory laid out like a gate deployment.
pub struct GateWorkspace {
    dir: TempDir,
    /// Functional timeout override from the system-test environment.
    timeout_ms: Option<u128>,
}

impl GateWorkspace {
    /// Creates the directory layout, signing keys, and base configuration.
    pub fn new() -> Result<Self, String> {
        let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
        for sub in ["reports", "interactions", "keys"] {
            fs::create_dir_all(dir.path().join(sub)).map_err(|err| err.to_string())?;
        }
        fs::write(dir.path().join("keys/signing.key"), SIGNING_SEED)
            .map_err(|err| err.to_string())?;
        let signer = Ed25519ArtifactSigner::from_bytes(&SIGNING_SEED, None);
        fs::write(
            dir.path().join("keys/signing.pub"),
            Base64.encode(signer.verifying_key().as_bytes()),
        )
        .map_err(|err| err.to_string())?;
        let config = SystemTestConfig::load()?;
        let workspace = Self {
            dir,
            timeout_ms: config.functional_timeout.map(|timeout| timeout.as_millis()),
        };
        workspace.write_config("")?;
        Ok(workspace)
    }

    /// Returns the workspace root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.root().join("story-gate.toml")
    }

    /// Returns the audit log path.
    pub fn audit_path(&self) -> PathBuf {
        self.root().join("audit.jsonl")
    }

    /// Rewrites the configuration as the base plus `extra` TOML.
    pub fn write_config(&self, extra: &str) -> Result<(), String> {
        let orchestrator = self
            .timeout_ms
            .map(|ms| format!("[orchestrator]\ndefault_timeout_ms = {ms}\n"))
            .unwrap_or_default();
        fs::write(self.config_path(), format!("{BASE_CONFIG}\n{orchestrator}\n{extra}"))
            .map_err(|err| err.to_string())
    }

    /// Writes a functional report for `story`.
    pub fn write_report(&self, story: &str, passed: bool, metrics: &[(&str, f64)]) -> Result<(), String> {
        let debt_metrics: serde_json::Map<String, Value> =
            metrics.iter().map(|(name, value)| ((*name).to_string(), json!(value))).collect();
        let report = json!({ "passed": passed, "debt_metrics": debt_metrics });
        fs::write(self.root().join("reports").join(format!("{story}.json")), report.to_string())
            .map_err(|err| err.to_string())
    }

    /// Writes the interaction log for `story` as prompt/response exchanges.
    pub fn write_interactions(&self, story: &str, exchanges: &[(&str, &str)]) -> Result<(), String> {
        let entries: Vec<Value> = exchanges
            .iter()
            .map(|(prompt, response)| json!({ "prompt": prompt, "response": response }))
            .collect();
        fs::write(
            self.root().join("interactions").join(format!("story-{story}-interactions.json")),
            Value::Array(entries).to_string(),
        )
        .map_err(|err| err.to_string())
    }

    /// Loads the configuration file into a reloadable handle.
    pub fn load(&self) -> Result<ConfigHandle, String> {
        ConfigHandle::load(&self.config_path()).map_err(|err| err.to_string())
    }

    /// Returns a verifier trusting the workspace public key as `gate-1`.
    pub fn verifier(&self) -> Result<Ed25519ArtifactVerifier, String> {
        Ed25519ArtifactVerifier::new()
            .with_public_key_file("gate-1", &self.root().join("keys/signing.pub"))
            .map_err(|err| err.to_string())
    }
}

/// Opens a gate the way a host process would from a compiled snapshot.
pub fn open_gate(snapshot: &GateSnapshot) -> Result<Gate, String> {
    let config = &snapshot.config;
    let sqlite = config.sqlite_config().ok_or_else(|| "sqlite store not configured".to_string())?;
    let store = SqliteGateStore::new(sqlite).map_err(|err| err.to_string())?;
    let audit = config.audit_sink().map_err(|err| err.to_string())?;

    let ledger = Arc::new(
        CostLedger::new(store.clone(), snapshot.pricing.clone())
            .with_value_model(snapshot.value_model.clone())
            .with_audit(Arc::clone(&audit)),
    );
    let budgets = BudgetMonitor::new(Arc::clone(&ledger), snapshot.budgets.clone())
        .map_err(|err| err.to_string())?
        .with_audit(Arc::clone(&audit));
    let gate = RegressionGate::new(store.clone(), snapshot.registry.clone())
        .with_audit(Arc::clone(&audit));

    let reports = config
        .providers
        .reports_dir
        .as_ref()
        .ok_or_else(|| "providers.reports_dir not configured".to_string())?;
    let interactions = config
        .providers
        .interactions_dir
        .as_ref()
        .ok_or_else(|| "providers.interactions_dir not configured".to_string())?;
    let key_path = config
        .providers
        .signing_key
        .as_ref()
        .ok_or_else(|| "providers.signing_key not configured".to_string())?;
    let signer = Ed25519ArtifactSigner::from_key_file(
        &config.resolve(key_path),
        config.providers.signing_key_id.clone(),
    )
    .map_err(|err| err.to_string())?;

    let components = OrchestratorComponents {
        functional: FileFunctionalCheckProvider::new(config.resolve(reports)),
        interactions: FileInteractionLogSource::new(config.resolve(interactions)),
        scanner: SecurityScanner::new(snapshot.patterns.clone()),
        gate,
        ledger,
        budgets,
        history: store,
        trust_policy: snapshot.trust,
    };
    let orchestrator = VerificationOrchestrator::new(components, snapshot.orchestrator.clone())
        .map_err(|err| err.to_string())?
        .with_signer(Arc::new(signer))
        .with_audit(audit);
    Ok(orchestrator)
}

/// Returns the timestamp `hours` after [`T0`].
pub fn at(hours: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + hours * HOUR)
}

/// Builds a request for `story` by [`AGENT`] in project `acme`.
pub fn request(story: &str, mode: ValidationMode, hours: i64) -> ValidationRequest {
    ValidationRequest::new(
        StoryId::new(story),
        AgentId::new(AGENT),
        ProjectId::new("acme"),
        mode,
        at(hours),
    )
}
