// crates/story-gate-core/src/core/story.rs
// ============================================================================
// Module: Story Gate Stories and Validation Runs
// Description: Story lifecycle, validation run records, and evidence bundles.
// Purpose: Define the tamper-evident artifact produced by every validation.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! A [`ValidationRun`] is immutable once assembled. Its evidence hash covers
//! every field except the hash and signature themselves. A [`Story`] is never
//! stored directly; it is always replayed from the story's run history.
//!
//! ## Invariants
//! - Run sequences are 1-based and contiguous per story.
//! - A story's state equals the verdict of its latest run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::baseline::BaselineCheck;
use crate::core::claims::ClaimCheck;
use crate::core::cost::BudgetStatus;
use crate::core::cost::Money;
use crate::core::cost::RoiReport;
use crate::core::finding::Finding;
use crate::core::finding::FindingCounts;
use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::AgentId;
use crate::core::identifiers::MetricName;
use crate::core::identifiers::ProjectId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StoryId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Story lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryState {
    /// Validation was requested but has not started.
    Pending,
    /// A validation run is in flight.
    Validating,
    /// The latest run verified the story.
    VerifiedComplete,
    /// The latest run rejected the story.
    NotComplete,
}

/// Binary composite verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Every blocking gate passed.
    VerifiedComplete,
    /// At least one blocking gate failed.
    NotComplete,
}

impl From<Verdict> for StoryState {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::VerifiedComplete => Self::VerifiedComplete,
            Verdict::NotComplete => Self::NotComplete,
        }
    }
}

/// Run phase trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Run created.
    Pending,
    /// Functional check in progress.
    RunningFunctional,
    /// Regression gate in progress.
    RunningBaseline,
    /// Claim cross-check in progress.
    RunningClaims,
    /// Security scan in progress.
    RunningSecurity,
    /// Cost accounting in progress.
    RunningCost,
    /// Artifact assembly in progress.
    Assembling,
    /// Terminal: verified.
    VerifiedComplete,
    /// Terminal: rejected.
    NotComplete,
}

// ============================================================================
// SECTION: Modes
// ============================================================================

/// Stage kinds in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// External functional check.
    Functional,
    /// Baseline regression gate.
    Baseline,
    /// Claim-vs-evidence cross-check.
    Claims,
    /// Security scan of interaction text.
    Security,
    /// Cost, budget, and ROI accounting.
    Cost,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Functional => "functional",
            Self::Baseline => "baseline",
            Self::Claims => "claims",
            Self::Security => "security",
            Self::Cost => "cost",
        };
        f.write_str(label)
    }
}

/// Set of enabled stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools, reason = "One flag per independently skippable stage.")]
pub struct StageSet {
    /// Run the functional stage.
    pub functional: bool,
    /// Run the baseline stage.
    pub baseline: bool,
    /// Run the claims stage.
    pub claims: bool,
    /// Run the security stage.
    pub security: bool,
    /// Run the cost stage.
    pub cost: bool,
}

impl StageSet {
    /// Functional stage only.
    pub const BASIC: Self = Self {
        functional: true,
        baseline: false,
        claims: false,
        security: false,
        cost: false,
    };

    /// Every stage.
    pub const COMPREHENSIVE: Self = Self {
        functional: true,
        baseline: true,
        claims: true,
        security: true,
        cost: true,
    };

    /// Returns true when the stage is enabled.
    #[must_use]
    pub const fn enabled(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Functional => self.functional,
            StageKind::Baseline => self.baseline,
            StageKind::Claims => self.claims,
            StageKind::Security => self.security,
            StageKind::Cost => self.cost,
        }
    }
}

/// Validation mode requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Functional stage only.
    Basic,
    /// Every stage.
    Comprehensive,
    /// Operator-defined stage set.
    Named(String),
}

// ============================================================================
// SECTION: Stage Records
// ============================================================================

/// Stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Gate passed.
    Passed,
    /// Gate failed.
    Failed,
    /// Stage could not complete.
    Errored,
    /// Stage did not run.
    Skipped,
    /// Stage ran and only contributes warnings.
    Informational,
}

/// Reason a stage did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Disabled by the validation mode.
    DisabledByMode,
    /// An earlier gating stage failed.
    ShortCircuited,
    /// No measurements were available.
    NoMeasurements,
}

/// Stage error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageErrorCode {
    /// Provider exceeded the caller-supplied timeout.
    Timeout,
    /// Functional provider failed.
    ProviderFailed,
    /// Interaction log source failed.
    SourceFailed,
    /// Shared store failed.
    StoreFailed,
}

/// Stage-level error recorded in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// Error code.
    pub code: StageErrorCode,
    /// Error message.
    pub message: String,
}

/// Stage-specific evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageDetail {
    /// Functional provider report.
    Functional {
        /// Whether the check passed.
        passed: bool,
        /// Reported debt metrics.
        debt_metrics: BTreeMap<MetricName, f64>,
    },
    /// Regression checks.
    Baseline {
        /// Per-metric checks.
        checks: Vec<BaselineCheck>,
        /// Regressions tolerated because they were pre-accepted.
        accepted_regressions: Vec<MetricName>,
    },
    /// Claim cross-checks.
    Claims {
        /// Per-claim checks.
        checks: Vec<ClaimCheck>,
    },
    /// Security scan summary.
    Security {
        /// Number of interactions scanned.
        interactions_scanned: usize,
        /// Digest of the pattern library used.
        library_digest: HashDigest,
        /// Findings by tier.
        counts: FindingCounts,
    },
    /// Cost summary.
    Cost {
        /// Spend attributed to the story.
        story_cost: Money,
        /// Events attributed to the story.
        event_count: u64,
        /// Budget statuses at validation time.
        budgets: Vec<BudgetStatus>,
        /// ROI report when a value was available.
        roi: Option<RoiReport>,
    },
}

/// Recorded stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage kind.
    pub stage: StageKind,
    /// Stage outcome.
    pub outcome: StageOutcome,
    /// Stage evidence.
    pub detail: Option<StageDetail>,
    /// Stage error, when errored.
    pub error: Option<StageError>,
    /// Skip reason, when skipped.
    pub skip_reason: Option<SkipReason>,
}

impl StageRecord {
    /// Builds a completed stage record.
    #[must_use]
    pub const fn completed(stage: StageKind, outcome: StageOutcome, detail: StageDetail) -> Self {
        Self {
            stage,
            outcome,
            detail: Some(detail),
            error: None,
            skip_reason: None,
        }
    }

    /// Builds an errored stage record.
    #[must_use]
    pub const fn errored(stage: StageKind, error: StageError) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Errored,
            detail: None,
            error: Some(error),
            skip_reason: None,
        }
    }

    /// Builds a skipped stage record.
    #[must_use]
    pub const fn skipped(stage: StageKind, reason: SkipReason) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            detail: None,
            error: None,
            skip_reason: Some(reason),
        }
    }
}

/// One failing gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Stage that failed.
    pub stage: StageKind,
    /// Explanation.
    pub message: String,
}

/// Non-blocking note attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    /// Stage that raised the warning.
    pub stage: StageKind,
    /// Explanation.
    pub message: String,
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Supported artifact signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Ed25519 over the canonical evidence digest.
    Ed25519,
}

/// Detached signature over a run's evidence digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSignature {
    /// Signature scheme.
    pub scheme: SignatureScheme,
    /// Signer key identifier.
    pub key_id: String,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

// ============================================================================
// SECTION: Validation Run
// ============================================================================

/// Immutable validation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    /// Run identifier (`<story>#<sequence>`).
    pub run_id: RunId,
    /// Story identifier.
    pub story_id: StoryId,
    /// 1-based sequence within the story.
    pub sequence: u64,
    /// Attributed agent.
    pub agent_id: AgentId,
    /// Project the baselines belong to.
    pub project_id: ProjectId,
    /// Requested mode.
    pub mode: ValidationMode,
    /// Stage set the mode resolved to.
    pub stage_set: StageSet,
    /// Request timestamp supplied by the caller.
    pub requested_at: Timestamp,
    /// Modified artifact paths.
    pub modified_paths: Vec<String>,
    /// Phase trace.
    pub phases: Vec<RunPhase>,
    /// Stage records in execution order.
    pub stages: Vec<StageRecord>,
    /// Security findings.
    pub findings: Vec<Finding>,
    /// Non-blocking warnings.
    pub warnings: Vec<RunWarning>,
    /// Composite verdict.
    pub verdict: Verdict,
    /// Failing gates in stage order.
    pub reasons: Vec<FailureReason>,
    /// Canonical digest of the evidence bundle.
    pub evidence_hash: HashDigest,
    /// Optional signature over the evidence digest.
    pub signature: Option<RunSignature>,
}

/// Hashed view of a run: every field except the digest and signature.
#[derive(Debug, Serialize)]
pub struct EvidenceBundle<'a> {
    /// Run identifier.
    pub run_id: &'a RunId,
    /// Story identifier.
    pub story_id: &'a StoryId,
    /// Sequence.
    pub sequence: u64,
    /// Agent.
    pub agent_id: &'a AgentId,
    /// Project.
    pub project_id: &'a ProjectId,
    /// Mode.
    pub mode: &'a ValidationMode,
    /// Stage set.
    pub stage_set: &'a StageSet,
    /// Request timestamp.
    pub requested_at: Timestamp,
    /// Modified paths.
    pub modified_paths: &'a [String],
    /// Phase trace.
    pub phases: &'a [RunPhase],
    /// Stage records.
    pub stages: &'a [StageRecord],
    /// Findings.
    pub findings: &'a [Finding],
    /// Warnings.
    pub warnings: &'a [RunWarning],
    /// Verdict.
    pub verdict: Verdict,
    /// Reasons.
    pub reasons: &'a [FailureReason],
}

impl ValidationRun {
    /// Returns the hashed view of the run.
    #[must_use]
    pub fn evidence_bundle(&self) -> EvidenceBundle<'_> {
        EvidenceBundle {
            run_id: &self.run_id,
            story_id: &self.story_id,
            sequence: self.sequence,
            agent_id: &self.agent_id,
            project_id: &self.project_id,
            mode: &self.mode,
            stage_set: &self.stage_set,
            requested_at: self.requested_at,
            modified_paths: &self.modified_paths,
            phases: &self.phases,
            stages: &self.stages,
            findings: &self.findings,
            warnings: &self.warnings,
            verdict: self.verdict,
            reasons: &self.reasons,
        }
    }

    /// Computes the canonical digest of the evidence bundle.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn compute_evidence_hash(&self, algorithm: HashAlgorithm) -> Result<HashDigest, HashError> {
        hash_canonical_json(algorithm, &self.evidence_bundle())
    }

    /// Returns the record for a stage.
    #[must_use]
    pub fn stage(&self, stage: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == stage)
    }
}

// ============================================================================
// SECTION: Story
// ============================================================================

/// Story view replayed from run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    /// Story identifier.
    pub story_id: StoryId,
    /// Lifecycle state.
    pub state: StoryState,
    /// Attributed agent from the latest request.
    pub agent_id: AgentId,
    /// Modified artifact paths from the latest request.
    pub modified_paths: Vec<String>,
    /// Number of completed runs.
    pub run_count: u64,
    /// Latest completed run.
    pub latest_run_id: Option<RunId>,
}

impl Story {
    /// Builds a story that has been requested but not validated yet.
    #[must_use]
    pub const fn pending(story_id: StoryId, agent_id: AgentId, modified_paths: Vec<String>) -> Self {
        Self {
            story_id,
            state: StoryState::Pending,
            agent_id,
            modified_paths,
            run_count: 0,
            latest_run_id: None,
        }
    }

    /// Replays a story from its runs (ordered by sequence).
    ///
    /// Returns `None` when the story has no runs.
    #[must_use]
    pub fn replay(runs: &[ValidationRun]) -> Option<Self> {
        let latest = runs.iter().max_by_key(|run| run.sequence)?;
        Some(Self {
            story_id: latest.story_id.clone(),
            state: latest.verdict.into(),
            agent_id: latest.agent_id.clone(),
            modified_paths: latest.modified_paths.clone(),
            run_count: u64::try_from(runs.len()).unwrap_or(u64::MAX),
            latest_run_id: Some(latest.run_id.clone()),
        })
    }
}
