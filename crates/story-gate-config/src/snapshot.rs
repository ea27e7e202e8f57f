// crates/story-gate-config/src/snapshot.rs
// ============================================================================
// Module: Configuration Snapshots
// Description: Compiled configuration snapshots and the reload handle.
// Purpose: Validate a whole configuration before any component sees it.
// Dependencies: story-gate-core
// ============================================================================

//! ## Overview
//! A [`GateSnapshot`] is a configuration compiled into the core types the
//! runtime consumes. [`ConfigHandle`] re-reads the configuration file on
//! demand, compiles it completely, and only then swaps the new snapshot in.
//! A reload that fails at any step leaves the previous snapshot active.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use story_gate_core::BaselineStore;
use story_gate_core::Budget;
use story_gate_core::CostLedgerStore;
use story_gate_core::FunctionalCheckProvider;
use story_gate_core::InteractionLogSource;
use story_gate_core::MetricRegistry;
use story_gate_core::OrchestratorConfig;
use story_gate_core::PatternLibrary;
use story_gate_core::PricingTable;
use story_gate_core::ProjectId;
use story_gate_core::RoiValueModel;
use story_gate_core::RunHistoryStore;
use story_gate_core::TrustPolicy;
use story_gate_core::VerificationOrchestrator;
use story_gate_core::runtime::SnapshotCell;

use crate::config::ConfigError;
use crate::config::StoryGateConfig;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Fully compiled configuration.
#[derive(Debug, Clone)]
pub struct GateSnapshot {
    /// Source configuration.
    pub config: StoryGateConfig,
    /// Project identifier.
    pub project_id: ProjectId,
    /// Compiled pattern library.
    pub patterns: PatternLibrary,
    /// Model pricing table.
    pub pricing: PricingTable,
    /// Validated budgets.
    pub budgets: Vec<Budget>,
    /// ROI value model.
    pub value_model: RoiValueModel,
    /// Trust policy.
    pub trust: TrustPolicy,
    /// Metric polarity registry.
    pub registry: MetricRegistry,
    /// Orchestrator configuration.
    pub orchestrator: OrchestratorConfig,
}

impl GateSnapshot {
    /// Compiles a validated configuration into runtime types.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any section fails to compile.
    pub fn compile(config: StoryGateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            project_id: config.project_id(),
            patterns: config.pattern_library()?,
            pricing: config.pricing_table()?,
            budgets: config.budget_set()?,
            value_model: config.roi.value_model()?,
            trust: config.trust_policy(),
            registry: config.metric_registry(),
            orchestrator: config.orchestrator_config()?,
            config,
        })
    }

    /// Pushes the snapshot into a running orchestrator.
    ///
    /// Trust policy changes take effect on restart; the tracker's scores are
    /// derived from history under the policy it was built with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a component rejects its section.
    pub fn apply_to<F, L, B, C, H>(
        &self,
        orchestrator: &VerificationOrchestrator<F, L, B, C, H>,
    ) -> Result<(), ConfigError>
    where
        F: FunctionalCheckProvider + 'static,
        L: InteractionLogSource,
        B: BaselineStore,
        C: CostLedgerStore,
        H: RunHistoryStore,
    {
        orchestrator
            .reload_config(self.orchestrator.clone())
            .map_err(|err| ConfigError::Invalid(format!("orchestrator: {err}")))?;
        orchestrator
            .budgets()
            .reload(self.budgets.clone())
            .map_err(|err| ConfigError::Invalid(format!("budgets: {err}")))?;
        orchestrator.reload_patterns(self.patterns.clone());
        orchestrator.ledger().reload_pricing(self.pricing.clone());
        orchestrator.gate().reload_registry(self.registry.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Reloadable configuration bound to a file.
#[derive(Debug)]
pub struct ConfigHandle {
    /// Configuration file path.
    path: PathBuf,
    /// Active snapshot.
    current: SnapshotCell<GateSnapshot>,
}

impl ConfigHandle {
    /// Loads and compiles the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or compilation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let snapshot = GateSnapshot::compile(StoryGateConfig::load(Some(path))?)?;
        Ok(Self {
            path: path.to_path_buf(),
            current: SnapshotCell::new(snapshot),
        })
    }

    /// Returns the configuration file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the active snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GateSnapshot> {
        self.current.load()
    }

    /// Re-reads the file and swaps in the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and keeps the active snapshot when the file
    /// fails to load or compile.
    pub fn reload(&self) -> Result<Arc<GateSnapshot>, ConfigError> {
        let snapshot = GateSnapshot::compile(StoryGateConfig::load(Some(&self.path))?)?;
        self.current.swap(snapshot);
        Ok(self.current.load())
    }
}
