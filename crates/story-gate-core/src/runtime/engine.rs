// crates/story-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Story Gate Verification Orchestrator
// Description: Sequences verification stages into one composite verdict.
// Purpose: Produce a hashed, append-only validation artifact for each request.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! The orchestrator is the single canonical path that marks a story complete.
//! Each request runs its enabled stages sequentially: functional, baseline,
//! claims, security, cost. A failing gating stage short-circuits the gating
//! stages after it, but security and cost always run so the evidence bundle
//! is complete.
//!
//! Stage-level failures (provider timeouts, log source errors) are recorded
//! in the run and never abort it. Only configuration errors, run history
//! persistence, hashing, signing, and a concurrent validation of the same
//! story abort [`VerificationOrchestrator::validate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::AgentId;
use crate::core::BaselineCheck;
use crate::core::BudgetTier;
use crate::core::ClaimStatus;
use crate::core::ClaimsPolicy;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::FailureReason;
use crate::core::Finding;
use crate::core::FindingCounts;
use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::MetricName;
use crate::core::Money;
use crate::core::PatternLibrary;
use crate::core::ProjectId;
use crate::core::RoiPercent;
use crate::core::RoiReport;
use crate::core::RunId;
use crate::core::RunPhase;
use crate::core::RunWarning;
use crate::core::SkipReason;
use crate::core::StageDetail;
use crate::core::StageError;
use crate::core::StageErrorCode;
use crate::core::StageKind;
use crate::core::StageOutcome;
use crate::core::StageRecord;
use crate::core::StageSet;
use crate::core::Story;
use crate::core::StoryId;
use crate::core::StoryState;
use crate::core::Timestamp;
use crate::core::TrustPolicy;
use crate::core::ValidationMode;
use crate::core::ValidationRun;
use crate::core::Verdict;
use crate::core::hashing::HashError;
use crate::interfaces::ArtifactSigner;
use crate::interfaces::BaselineStore;
use crate::interfaces::CostLedgerStore;
use crate::interfaces::FunctionalCheckProvider;
use crate::interfaces::FunctionalReport;
use crate::interfaces::InteractionLogSource;
use crate::interfaces::ProviderError;
use crate::interfaces::RunHistoryStore;
use crate::interfaces::SignerError;
use crate::interfaces::StoreError;
use crate::runtime::audit::AuditEvent;
use crate::runtime::audit::AuditSink;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::baseline::RegressionGate;
use crate::runtime::budget::BudgetMonitor;
use crate::runtime::claims::ClaimEvidence;
use crate::runtime::claims::ClaimExtractor;
use crate::runtime::claims::check_claims;
use crate::runtime::ledger::CostLedger;
use crate::runtime::scanner::SecurityScanner;
use crate::runtime::scanner::blocking_categories;
use crate::runtime::snapshot::SnapshotCell;
use crate::runtime::trust::TrustTracker;
use crate::runtime::trust::outcome_for;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default functional-check timeout.
pub const DEFAULT_FUNCTIONAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Orchestrator configuration snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Timeout applied when a request does not supply one.
    pub default_timeout: Duration,
    /// Claims cross-check policy.
    pub claims: ClaimsPolicy,
    /// Operator-defined stage sets keyed by mode name.
    pub modes: BTreeMap<String, StageSet>,
    /// Hash algorithm for evidence digests.
    pub hash_algorithm: HashAlgorithm,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_FUNCTIONAL_TIMEOUT,
            claims: ClaimsPolicy::default(),
            modes: BTreeMap::new(),
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
        }
    }
}

impl OrchestratorConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Configuration`] when the snapshot is malformed.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.default_timeout.is_zero() {
            return Err(OrchestratorError::Configuration(
                "default timeout must be positive".to_string(),
            ));
        }
        for name in self.modes.keys() {
            if name.trim().is_empty() || name == "basic" || name == "comprehensive" {
                return Err(OrchestratorError::Configuration(format!(
                    "mode name '{name}' is empty or reserved"
                )));
            }
        }
        if self.claims.error_metric.trim().is_empty()
            || self.claims.coverage_metric.trim().is_empty()
        {
            return Err(OrchestratorError::Configuration(
                "claims metrics must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves a mode into its stage set.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::UnknownMode`] for an undeclared named mode.
    pub fn stage_set(&self, mode: &ValidationMode) -> Result<StageSet, OrchestratorError> {
        match mode {
            ValidationMode::Basic => Ok(StageSet::BASIC),
            ValidationMode::Comprehensive => Ok(StageSet::COMPREHENSIVE),
            ValidationMode::Named(name) => self
                .modes
                .get(name)
                .copied()
                .ok_or_else(|| OrchestratorError::UnknownMode(name.clone())),
        }
    }
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Validation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRequest {
    /// Story to validate.
    pub story_id: StoryId,
    /// Agent the work is attributed to.
    pub agent_id: AgentId,
    /// Project whose baselines apply.
    pub project_id: ProjectId,
    /// Stage selection mode.
    pub mode: ValidationMode,
    /// Paths of the modified artifacts.
    pub modified_paths: Vec<String>,
    /// Request time; also the `now` for baselines and budgets.
    pub requested_at: Timestamp,
    /// Functional-check timeout; the configured default when absent.
    pub timeout: Option<Duration>,
    /// Estimated value of the work for ROI; the value model when absent.
    pub estimated_value: Option<Money>,
    /// Metrics whose regression the operator accepted in advance.
    pub accepted_regressions: BTreeSet<MetricName>,
}

impl ValidationRequest {
    /// Creates a request with no modified paths, overrides, or acceptances.
    #[must_use]
    pub const fn new(
        story_id: StoryId,
        agent_id: AgentId,
        project_id: ProjectId,
        mode: ValidationMode,
        requested_at: Timestamp,
    ) -> Self {
        Self {
            story_id,
            agent_id,
            project_id,
            mode,
            modified_paths: Vec::new(),
            requested_at,
            timeout: None,
            estimated_value: None,
            accepted_regressions: BTreeSet::new(),
        }
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Collaborators wired into an orchestrator.
pub struct OrchestratorComponents<F, L, B, C, H> {
    /// Functional check provider.
    pub functional: F,
    /// Interaction log source.
    pub interactions: L,
    /// Security scanner.
    pub scanner: SecurityScanner,
    /// Regression gate.
    pub gate: RegressionGate<B>,
    /// Shared cost ledger.
    pub ledger: Arc<CostLedger<C>>,
    /// Budget monitor over the same ledger.
    pub budgets: BudgetMonitor<C>,
    /// Validation run history.
    pub history: H,
    /// Trust scoring policy.
    pub trust_policy: TrustPolicy,
}

/// Stories currently being validated, with the request identity.
type InFlight = BTreeMap<StoryId, (AgentId, Vec<String>)>;

/// Verification orchestrator.
pub struct VerificationOrchestrator<F, L, B, C, H> {
    /// Functional check provider, shared with timeout workers.
    functional: Arc<F>,
    /// Interaction log source.
    interactions: L,
    /// Security scanner.
    scanner: SecurityScanner,
    /// Regression gate.
    gate: RegressionGate<B>,
    /// Cost ledger.
    ledger: Arc<CostLedger<C>>,
    /// Budget monitor.
    budgets: BudgetMonitor<C>,
    /// Trust tracker derived from run history.
    trust: TrustTracker,
    /// Run history.
    history: H,
    /// Claim extractor.
    claims: ClaimExtractor,
    /// Configuration snapshot.
    config: SnapshotCell<OrchestratorConfig>,
    /// Optional artifact signer.
    signer: Option<Arc<dyn ArtifactSigner>>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Stories with a run in progress.
    in_flight: Mutex<InFlight>,
}

impl<F, L, B, C, H> VerificationOrchestrator<F, L, B, C, H>
where
    F: FunctionalCheckProvider + 'static,
    L: InteractionLogSource,
    B: BaselineStore,
    C: CostLedgerStore,
    H: RunHistoryStore,
{
    /// Creates an orchestrator and rebuilds trust from the run history.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the configuration is invalid or the
    /// history cannot be loaded.
    pub fn new(
        components: OrchestratorComponents<F, L, B, C, H>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        if let Some(message) = components.trust_policy.violation() {
            return Err(OrchestratorError::Configuration(message));
        }
        let claims = ClaimExtractor::new()
            .map_err(|err| OrchestratorError::Configuration(err.to_string()))?;
        let runs = components.history.all_runs()?;
        let trust = TrustTracker::replay(components.trust_policy, &runs);
        Ok(Self {
            functional: Arc::new(components.functional),
            interactions: components.interactions,
            scanner: components.scanner,
            gate: components.gate,
            ledger: components.ledger,
            budgets: components.budgets,
            trust,
            history: components.history,
            claims,
            config: SnapshotCell::new(config),
            signer: None,
            audit: Arc::new(NoopAuditSink),
            in_flight: Mutex::new(BTreeMap::new()),
        })
    }

    /// Signs every assembled run with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn ArtifactSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the security scanner.
    #[must_use]
    pub const fn scanner(&self) -> &SecurityScanner {
        &self.scanner
    }

    /// Returns the regression gate.
    #[must_use]
    pub const fn gate(&self) -> &RegressionGate<B> {
        &self.gate
    }

    /// Returns the cost ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Arc<CostLedger<C>> {
        &self.ledger
    }

    /// Returns the budget monitor.
    #[must_use]
    pub const fn budgets(&self) -> &BudgetMonitor<C> {
        &self.budgets
    }

    /// Returns the trust tracker.
    #[must_use]
    pub const fn trust(&self) -> &TrustTracker {
        &self.trust
    }

    /// Returns the run history store.
    #[must_use]
    pub const fn history(&self) -> &H {
        &self.history
    }

    /// Returns the current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<OrchestratorConfig> {
        self.config.load()
    }

    /// Swaps in a new configuration snapshot after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Configuration`] and keeps the previous
    /// snapshot when the new one is invalid.
    pub fn reload_config(&self, config: OrchestratorConfig) -> Result<(), OrchestratorError> {
        config.validate()?;
        self.config.swap(config);
        self.audit.record(&AuditEvent::ConfigReloaded {
            component: "orchestrator".to_string(),
            digest: None,
        });
        Ok(())
    }

    /// Swaps in a new pattern library; scans in progress keep their snapshot.
    pub fn reload_patterns(&self, library: PatternLibrary) {
        let digest = library.digest().clone();
        self.scanner.reload(library);
        self.audit.record(&AuditEvent::ConfigReloaded {
            component: "patterns".to_string(),
            digest: Some(digest),
        });
    }

    /// Returns the story replayed from history, reporting VALIDATING while a
    /// run is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the history cannot be read.
    pub fn story(&self, story_id: &StoryId) -> Result<Option<Story>, StoreError> {
        let runs = self.history.runs_for_story(story_id)?;
        let replayed = Story::replay(&runs);
        let in_flight = self.lock_in_flight().get(story_id).cloned();
        Ok(match (replayed, in_flight) {
            (Some(mut story), Some(_)) => {
                story.state = StoryState::Validating;
                Some(story)
            }
            (None, Some((agent_id, modified_paths))) => {
                let mut story = Story::pending(story_id.clone(), agent_id, modified_paths);
                story.state = StoryState::Validating;
                Some(story)
            }
            (replayed, None) => replayed,
        })
    }

    /// Validates a story and returns the assembled, persisted run.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] for an unknown mode, a concurrent
    /// validation of the same story, or a hashing, signing, or history failure.
    pub fn validate(&self, request: ValidationRequest) -> Result<ValidationRun, OrchestratorError> {
        let config = self.config.load();
        let stage_set = config.stage_set(&request.mode)?;
        let _guard = self.claim_story(&request)?;

        let prior = self.history.runs_for_story(&request.story_id)?;
        let sequence = prior.last().map_or(1, |run| run.sequence + 1);
        let run_id = RunId::for_story(&request.story_id, sequence);
        self.audit.record(&AuditEvent::RunStarted {
            run_id: run_id.clone(),
            story_id: request.story_id.clone(),
            agent_id: request.agent_id.clone(),
            requested_at: request.requested_at,
        });

        let mut builder = RunBuilder::new(run_id.clone(), Arc::clone(&self.audit));
        let report = self.functional_stage(&mut builder, &request, &config, stage_set);
        let baseline_checks =
            self.baseline_stage(&mut builder, &request, stage_set, report.as_ref());
        let needs_log = stage_set.claims || stage_set.security;
        let interactions = needs_log.then(|| self.interactions.interactions(&request.story_id));
        self.claims_stage(
            &mut builder,
            &request,
            &config.claims,
            stage_set,
            interactions.as_ref(),
            report.as_ref(),
            &baseline_checks,
        );
        self.security_stage(&mut builder, stage_set, interactions.as_ref());
        self.cost_stage(&mut builder, &request, stage_set);

        builder.enter(RunPhase::Assembling);
        let verdict =
            if builder.reasons.is_empty() { Verdict::VerifiedComplete } else { Verdict::NotComplete };
        builder.enter(match verdict {
            Verdict::VerifiedComplete => RunPhase::VerifiedComplete,
            Verdict::NotComplete => RunPhase::NotComplete,
        });

        let mut run = ValidationRun {
            run_id,
            story_id: request.story_id,
            sequence,
            agent_id: request.agent_id,
            project_id: request.project_id,
            mode: request.mode,
            stage_set,
            requested_at: request.requested_at,
            modified_paths: request.modified_paths,
            phases: builder.phases,
            stages: builder.stages,
            findings: builder.findings,
            warnings: builder.warnings,
            verdict,
            reasons: builder.reasons,
            evidence_hash: HashDigest::new(config.hash_algorithm, &[]),
            signature: None,
        };
        run.evidence_hash = run.compute_evidence_hash(config.hash_algorithm)?;
        if let Some(signer) = &self.signer {
            run.signature = Some(signer.sign(&run.evidence_hash)?);
        }
        self.history.append_run(&run)?;
        self.trust.record_outcome(&run.agent_id, outcome_for(&run));
        self.audit.record(&AuditEvent::RunCompleted {
            run_id: run.run_id.clone(),
            verdict: run.verdict,
            reason_count: run.reasons.len(),
            evidence_hash: run.evidence_hash.clone(),
        });
        info!(
            run = %run.run_id,
            complete = run.verdict == Verdict::VerifiedComplete,
            reasons = run.reasons.len(),
            hash = %run.evidence_hash,
            "validation run assembled"
        );
        Ok(run)
    }

    // ------------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------------

    /// Runs the functional stage and returns the report when one was produced.
    fn functional_stage(
        &self,
        builder: &mut RunBuilder,
        request: &ValidationRequest,
        config: &OrchestratorConfig,
        stage_set: StageSet,
    ) -> Option<FunctionalReport> {
        builder.enter(RunPhase::RunningFunctional);
        if !stage_set.functional {
            builder.record(StageRecord::skipped(StageKind::Functional, SkipReason::DisabledByMode));
            builder.fail(StageKind::Functional, "functional check was not run".to_string());
            return None;
        }
        let timeout = request.timeout.unwrap_or(config.default_timeout);
        let result = run_with_timeout(&self.functional, &request.story_id, timeout)
            .and_then(require_finite_metrics);
        match result {
            Ok(report) => {
                let outcome = if report.passed { StageOutcome::Passed } else { StageOutcome::Failed };
                builder.record(StageRecord::completed(
                    StageKind::Functional,
                    outcome,
                    StageDetail::Functional {
                        passed: report.passed,
                        debt_metrics: report.debt_metrics.clone(),
                    },
                ));
                if !report.passed {
                    builder.fail(StageKind::Functional, "functional check failed".to_string());
                    builder.short_circuit();
                }
                Some(report)
            }
            Err(err) => {
                let code = match err {
                    ProviderError::Timeout {
                        ..
                    } => StageErrorCode::Timeout,
                    ProviderError::Failed(_) => StageErrorCode::ProviderFailed,
                };
                warn!(story = %request.story_id, error = %err, "functional check errored");
                builder.record(StageRecord::errored(
                    StageKind::Functional,
                    StageError {
                        code,
                        message: err.to_string(),
                    },
                ));
                builder.fail(StageKind::Functional, err.to_string());
                builder.short_circuit();
                None
            }
        }
    }

    /// Runs the baseline stage and returns the checks performed.
    fn baseline_stage(
        &self,
        builder: &mut RunBuilder,
        request: &ValidationRequest,
        stage_set: StageSet,
        report: Option<&FunctionalReport>,
    ) -> Vec<BaselineCheck> {
        builder.enter(RunPhase::RunningBaseline);
        if !stage_set.baseline {
            builder.record(StageRecord::skipped(StageKind::Baseline, SkipReason::DisabledByMode));
            return Vec::new();
        }
        if builder.short_circuited {
            builder.record(StageRecord::skipped(StageKind::Baseline, SkipReason::ShortCircuited));
            return Vec::new();
        }
        let Some(report) = report else {
            builder.record(StageRecord::skipped(StageKind::Baseline, SkipReason::NoMeasurements));
            return Vec::new();
        };
        let mut checks = Vec::new();
        for (metric, measured) in &report.debt_metrics {
            match self.gate.check(&request.project_id, metric, *measured, request.requested_at) {
                Ok(check) => checks.push(check),
                Err(err) => {
                    builder.record(StageRecord::errored(
                        StageKind::Baseline,
                        StageError {
                            code: StageErrorCode::StoreFailed,
                            message: err.to_string(),
                        },
                    ));
                    builder.fail(StageKind::Baseline, format!("baseline check failed: {err}"));
                    builder.short_circuit();
                    return checks;
                }
            }
        }
        let mut accepted = Vec::new();
        let mut blocking = Vec::new();
        for check in checks.iter().filter(|check| check.is_regression()) {
            if request.accepted_regressions.contains(&check.metric) {
                accepted.push(check.metric.clone());
            } else {
                blocking.push(format!(
                    "{} {} -> {} (delta {})",
                    check.metric, check.baseline, check.measured, check.delta
                ));
            }
        }
        let outcome = if blocking.is_empty() { StageOutcome::Passed } else { StageOutcome::Failed };
        builder.record(StageRecord::completed(
            StageKind::Baseline,
            outcome,
            StageDetail::Baseline {
                checks: checks.clone(),
                accepted_regressions: accepted,
            },
        ));
        if !blocking.is_empty() {
            builder.fail(StageKind::Baseline, format!("regression: {}", blocking.join(", ")));
            builder.short_circuit();
        }
        checks
    }

    /// Runs the claims cross-check stage.
    #[allow(clippy::too_many_arguments, reason = "Stage inputs are passed explicitly.")]
    fn claims_stage(
        &self,
        builder: &mut RunBuilder,
        request: &ValidationRequest,
        policy: &ClaimsPolicy,
        stage_set: StageSet,
        interactions: Option<&Result<Vec<String>, ProviderError>>,
        report: Option<&FunctionalReport>,
        baseline_checks: &[BaselineCheck],
    ) {
        builder.enter(RunPhase::RunningClaims);
        if !stage_set.claims {
            builder.record(StageRecord::skipped(StageKind::Claims, SkipReason::DisabledByMode));
            return;
        }
        if builder.short_circuited {
            builder.record(StageRecord::skipped(StageKind::Claims, SkipReason::ShortCircuited));
            return;
        }
        let texts = match interactions {
            Some(Ok(texts)) => texts.as_slice(),
            Some(Err(err)) => {
                builder.record(StageRecord::errored(
                    StageKind::Claims,
                    StageError {
                        code: StageErrorCode::SourceFailed,
                        message: err.to_string(),
                    },
                ));
                let message = format!("interaction log unavailable: {err}");
                if policy.blocking {
                    builder.fail(StageKind::Claims, message);
                    builder.short_circuit();
                } else {
                    builder.warn(StageKind::Claims, message);
                }
                return;
            }
            None => &[],
        };
        let evidence = ClaimEvidence {
            modified_paths: &request.modified_paths,
            debt_metrics: report.map(|report| &report.debt_metrics),
            baseline_checks,
        };
        let checks = check_claims(self.claims.extract(texts), &evidence, policy);
        let unsupported: Vec<String> = checks
            .iter()
            .filter(|check| check.status == ClaimStatus::Unsupported)
            .map(|check| format!("\"{}\" ({})", check.claim.text, check.note))
            .collect();
        let outcome = if unsupported.is_empty() {
            StageOutcome::Passed
        } else if policy.blocking {
            StageOutcome::Failed
        } else {
            StageOutcome::Informational
        };
        builder.record(StageRecord::completed(
            StageKind::Claims,
            outcome,
            StageDetail::Claims {
                checks,
            },
        ));
        if unsupported.is_empty() {
            return;
        }
        if policy.blocking {
            builder.fail(StageKind::Claims, format!("unsupported claims: {}", unsupported.join("; ")));
            builder.short_circuit();
        } else {
            for claim in unsupported {
                builder.warn(StageKind::Claims, format!("unsupported claim {claim}"));
            }
        }
    }

    /// Runs the security stage; always runs when enabled.
    fn security_stage(
        &self,
        builder: &mut RunBuilder,
        stage_set: StageSet,
        interactions: Option<&Result<Vec<String>, ProviderError>>,
    ) {
        builder.enter(RunPhase::RunningSecurity);
        if !stage_set.security {
            builder.record(StageRecord::skipped(StageKind::Security, SkipReason::DisabledByMode));
            return;
        }
        let texts = match interactions {
            Some(Ok(texts)) => texts.as_slice(),
            Some(Err(err)) => {
                builder.record(StageRecord::errored(
                    StageKind::Security,
                    StageError {
                        code: StageErrorCode::SourceFailed,
                        message: err.to_string(),
                    },
                ));
                builder.fail(StageKind::Security, format!("interaction log unavailable: {err}"));
                return;
            }
            None => &[],
        };
        let library_digest = self.scanner.library().digest().clone();
        let findings = self.scanner.scan_interaction_set(texts);
        let blocking = blocking_findings(&findings);
        let outcome = if blocking.is_empty() { StageOutcome::Passed } else { StageOutcome::Failed };
        builder.record(StageRecord::completed(
            StageKind::Security,
            outcome,
            StageDetail::Security {
                interactions_scanned: texts.len(),
                library_digest,
                counts: FindingCounts::from_findings(&findings),
            },
        ));
        if !blocking.is_empty() {
            builder.fail(StageKind::Security, format!("blocking findings: {}", blocking.join(", ")));
        }
        builder.findings = findings;
    }

    /// Runs the informational cost stage.
    fn cost_stage(&self, builder: &mut RunBuilder, request: &ValidationRequest, stage_set: StageSet) {
        builder.enter(RunPhase::RunningCost);
        if !stage_set.cost {
            builder.record(StageRecord::skipped(StageKind::Cost, SkipReason::DisabledByMode));
            return;
        }
        let now = request.requested_at;
        let story = match self.ledger.story_cost(&request.story_id, now) {
            Ok(aggregate) => aggregate,
            Err(err) => {
                builder.record(StageRecord::errored(
                    StageKind::Cost,
                    StageError {
                        code: StageErrorCode::StoreFailed,
                        message: err.to_string(),
                    },
                ));
                builder.warn(StageKind::Cost, format!("cost ledger unavailable: {err}"));
                return;
            }
        };
        let budgets = match self.budgets.check_all(now) {
            Ok(budgets) => {
                self.budgets.emit_alerts(&budgets);
                budgets
            }
            Err(err) => {
                builder.warn(StageKind::Cost, format!("budget check failed: {err}"));
                Vec::new()
            }
        };
        for status in &budgets {
            let label = match status.tier {
                BudgetTier::None => continue,
                BudgetTier::Warning => "WARNING",
                BudgetTier::Critical => "CRITICAL",
            };
            builder.warn(
                StageKind::Cost,
                format!(
                    "{} budget at {label}: spent {} of {}",
                    status.period, status.spent, status.ceiling
                ),
            );
        }
        let value = request
            .estimated_value
            .clone()
            .unwrap_or_else(|| self.ledger.estimate_value(&story.total_cost));
        let roi = RoiReport::compute(request.story_id.clone(), story.total_cost.clone(), value);
        if roi.is_negative() {
            builder.warn(
                StageKind::Cost,
                format!("negative ROI: cost {} exceeds value {}", roi.cost, roi.value),
            );
        } else if roi.roi_percent == RoiPercent::Undefined {
            builder.warn(StageKind::Cost, "ROI undefined: no cost attributed to story".to_string());
        }
        builder.record(StageRecord::completed(
            StageKind::Cost,
            StageOutcome::Informational,
            StageDetail::Cost {
                story_cost: story.total_cost,
                event_count: story.event_count,
                budgets,
                roi: Some(roi),
            },
        ));
    }

    // ------------------------------------------------------------------------
    // In-flight tracking
    // ------------------------------------------------------------------------

    /// Marks a story in flight, rejecting a concurrent validation.
    fn claim_story(&self, request: &ValidationRequest) -> Result<InFlightGuard<'_>, OrchestratorError> {
        let mut in_flight = self.lock_in_flight();
        if in_flight.contains_key(&request.story_id) {
            return Err(OrchestratorError::StoryBusy(request.story_id.clone()));
        }
        in_flight.insert(
            request.story_id.clone(),
            (request.agent_id.clone(), request.modified_paths.clone()),
        );
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            story_id: request.story_id.clone(),
        })
    }

    /// Locks the in-flight table, recovering from poisoning.
    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Releases a story's in-flight marker when dropped.
struct InFlightGuard<'a> {
    /// Shared in-flight table.
    in_flight: &'a Mutex<InFlight>,
    /// Story to release.
    story_id: StoryId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        in_flight.remove(&self.story_id);
    }
}

// ============================================================================
// SECTION: Run Assembly
// ============================================================================

/// Accumulates stage results for one run.
struct RunBuilder {
    /// Run identifier used for audit events.
    run_id: RunId,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Phase trace.
    phases: Vec<RunPhase>,
    /// Stage records in execution order.
    stages: Vec<StageRecord>,
    /// Security findings.
    findings: Vec<Finding>,
    /// Non-blocking warnings.
    warnings: Vec<RunWarning>,
    /// Failing gates in stage order.
    reasons: Vec<FailureReason>,
    /// Whether a gating stage failed.
    short_circuited: bool,
}

impl RunBuilder {
    /// Creates a builder in the pending phase.
    fn new(run_id: RunId, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            run_id,
            audit,
            phases: vec![RunPhase::Pending],
            stages: Vec::new(),
            findings: Vec::new(),
            warnings: Vec::new(),
            reasons: Vec::new(),
            short_circuited: false,
        }
    }

    /// Appends a phase to the trace.
    fn enter(&mut self, phase: RunPhase) {
        self.phases.push(phase);
    }

    /// Records a stage result.
    fn record(&mut self, record: StageRecord) {
        debug!(run = %self.run_id, stage = %record.stage, "stage completed");
        self.audit.record(&AuditEvent::StageCompleted {
            run_id: self.run_id.clone(),
            stage: record.stage,
            outcome: record.outcome,
        });
        self.stages.push(record);
    }

    /// Adds a failing reason for a gate.
    fn fail(&mut self, stage: StageKind, message: String) {
        self.reasons.push(FailureReason {
            stage,
            message,
        });
    }

    /// Adds a warning.
    fn warn(&mut self, stage: StageKind, message: String) {
        self.warnings.push(RunWarning {
            stage,
            message,
        });
    }

    /// Skips the remaining gating stages.
    const fn short_circuit(&mut self) {
        self.short_circuited = true;
    }
}

/// Formats blocking findings as `category (TIER)`.
fn blocking_findings(findings: &[Finding]) -> Vec<String> {
    let categories = blocking_categories(findings);
    findings
        .iter()
        .filter(|finding| categories.contains(&finding.category))
        .map(|finding| format!("{} ({})", finding.category, finding.tier))
        .collect()
}

/// Rejects reports carrying NaN or infinite debt metrics.
fn require_finite_metrics(report: FunctionalReport) -> Result<FunctionalReport, ProviderError> {
    match report.debt_metrics.iter().find(|(_, value)| !value.is_finite()) {
        Some((metric, _)) => {
            Err(ProviderError::Failed(format!("debt metric {metric} is not finite")))
        }
        None => Ok(report),
    }
}

/// Thread name for functional provider workers.
const FUNCTIONAL_WORKER_NAME: &str = "story-gate-functional";

/// Runs the functional provider on a worker thread bounded by `timeout`.
///
/// A timed-out worker is detached; its late result is dropped.
fn run_with_timeout<F: FunctionalCheckProvider + 'static>(
    provider: &Arc<F>,
    story_id: &StoryId,
    timeout: Duration,
) -> Result<FunctionalReport, ProviderError> {
    let (sender, receiver) = mpsc::sync_channel(1);
    let worker = Arc::clone(provider);
    let story = story_id.clone();
    thread::Builder::new()
        .name(FUNCTIONAL_WORKER_NAME.to_string())
        .spawn(move || {
            let _ = sender.send(worker.run(&story));
        })
        .map_err(|err| ProviderError::Failed(format!("failed to spawn provider worker: {err}")))?;
    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ProviderError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
        Err(RecvTimeoutError::Disconnected) => {
            Err(ProviderError::Failed("provider worker exited without a report".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that abort a validation request.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Named mode is not configured.
    #[error("unknown validation mode: {0}")]
    UnknownMode(String),
    /// Another validation of the story is in flight.
    #[error("story {0} is already being validated")]
    StoryBusy(StoryId),
    /// Run history or store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Evidence hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Artifact signing failed.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// Configuration is invalid.
    #[error("invalid orchestrator configuration: {0}")]
    Configuration(String),
}
