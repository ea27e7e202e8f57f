// crates/story-gate-core/src/core/trust.rs
// ============================================================================
// Module: Story Gate Agent Trust
// Description: Agent profiles, trust policy, and the trust score function.
// Purpose: Derive reproducible reliability scores from validation outcomes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Trust is recomputed from the ordered outcome history of an agent. Finding
//! penalties decay exponentially with the number of later validation runs,
//! never with wall-clock time, so scores are reproducible in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::finding::FindingCounts;
use crate::core::identifiers::AgentId;
use crate::core::story::Verdict;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Default penalty per HIGH finding.
pub const DEFAULT_HIGH_PENALTY: f64 = 0.1;
/// Default penalty per CRITICAL finding.
pub const DEFAULT_CRITICAL_PENALTY: f64 = 0.25;
/// Default per-run decay factor.
pub const DEFAULT_DECAY: f64 = 0.8;

/// Trust score weighting policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Penalty per HIGH finding.
    pub high_penalty: f64,
    /// Penalty per CRITICAL finding.
    pub critical_penalty: f64,
    /// Multiplier applied per later validation run, in `(0, 1]`.
    pub decay: f64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            high_penalty: DEFAULT_HIGH_PENALTY,
            critical_penalty: DEFAULT_CRITICAL_PENALTY,
            decay: DEFAULT_DECAY,
        }
    }
}

impl TrustPolicy {
    /// Returns an error message when the policy is malformed.
    #[must_use]
    pub fn violation(&self) -> Option<String> {
        let invalid = |penalty: f64| penalty.is_nan() || penalty < 0.0;
        if invalid(self.high_penalty) || invalid(self.critical_penalty) {
            return Some("trust penalties must be non-negative".to_string());
        }
        if self.decay.is_nan() || self.decay <= 0.0 || self.decay > 1.0 {
            return Some("trust decay must be in (0, 1]".to_string());
        }
        None
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// One validation outcome attributed to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Composite verdict.
    pub verdict: Verdict,
    /// Findings by tier produced by the run.
    pub findings: FindingCounts,
}

/// Trust score, or an explicit lack of data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TrustScore {
    /// Score in `[0, 1]`.
    Score(f64),
    /// The agent has no attempts.
    InsufficientData,
}

impl TrustScore {
    /// Returns the numeric score when defined.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Score(value) => Some(value),
            Self::InsufficientData => None,
        }
    }
}

/// Derived per-agent rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent identifier.
    pub agent_id: AgentId,
    /// Stories attempted.
    pub attempted: u64,
    /// Stories verified complete.
    pub verified: u64,
    /// Stories rejected.
    pub rejected: u64,
    /// Findings ever attributed, by tier.
    pub findings: FindingCounts,
    /// Derived trust score.
    pub trust_score: TrustScore,
}

impl AgentProfile {
    /// Rebuilds a profile from an agent's ordered outcomes.
    #[must_use]
    pub fn from_outcomes(agent_id: AgentId, outcomes: &[AgentOutcome], policy: &TrustPolicy) -> Self {
        let mut profile = Self {
            agent_id,
            attempted: 0,
            verified: 0,
            rejected: 0,
            findings: FindingCounts::default(),
            trust_score: TrustScore::InsufficientData,
        };
        for outcome in outcomes {
            profile.attempted += 1;
            match outcome.verdict {
                Verdict::VerifiedComplete => profile.verified += 1,
                Verdict::NotComplete => profile.rejected += 1,
            }
            profile.findings.merge(outcome.findings);
        }
        profile.trust_score = trust_score(outcomes, policy);
        profile
    }
}

/// Computes the trust score for ordered outcomes (oldest first).
///
/// `score = verified / attempted - sum(penalty(run) * decay^age)` where `age`
/// counts the agent's later runs; the result is clamped to `[0, 1]`.
#[must_use]
pub fn trust_score(outcomes: &[AgentOutcome], policy: &TrustPolicy) -> TrustScore {
    if outcomes.is_empty() {
        return TrustScore::InsufficientData;
    }
    let attempted = outcomes.len();
    let verified =
        outcomes.iter().filter(|outcome| outcome.verdict == Verdict::VerifiedComplete).count();
    let base = ratio(verified, attempted);
    let mut penalty = 0.0;
    let mut weight = 1.0;
    for outcome in outcomes.iter().rev() {
        let run_penalty = f64::from(outcome.findings.high) * policy.high_penalty
            + f64::from(outcome.findings.critical) * policy.critical_penalty;
        penalty += run_penalty * weight;
        weight *= policy.decay;
    }
    TrustScore::Score((base - penalty).clamp(0.0, 1.0))
}

/// Returns `numerator / denominator` as a float for small counts.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    let numerator = u32::try_from(numerator).unwrap_or(u32::MAX);
    let denominator = u32::try_from(denominator).unwrap_or(u32::MAX);
    f64::from(numerator) / f64::from(denominator)
}
