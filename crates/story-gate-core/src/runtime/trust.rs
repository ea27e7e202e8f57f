// crates/story-gate-core/src/runtime/trust.rs
// ============================================================================
// Module: Story Gate Trust Tracker
// Description: Per-agent outcome history and derived trust profiles.
// Purpose: Attribute validation outcomes to agents and score their reliability.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The tracker is a derived view: it can always be rebuilt from validation
//! run history. Profiles are recomputed on read so a policy change applies
//! to every agent consistently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AgentId;
use crate::core::AgentOutcome;
use crate::core::AgentProfile;
use crate::core::FindingCounts;
use crate::core::TrustPolicy;
use crate::core::TrustScore;
use crate::core::ValidationRun;
use crate::core::trust::trust_score;

// ============================================================================
// SECTION: Tracker
// ============================================================================

/// Agent trust tracker.
#[derive(Debug)]
pub struct TrustTracker {
    /// Ordered outcomes per agent (oldest first).
    outcomes: Mutex<BTreeMap<AgentId, Vec<AgentOutcome>>>,
    /// Scoring policy.
    policy: TrustPolicy,
}

impl TrustTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(policy: TrustPolicy) -> Self {
        Self {
            outcomes: Mutex::new(BTreeMap::new()),
            policy,
        }
    }

    /// Rebuilds a tracker from runs ordered by request time.
    #[must_use]
    pub fn replay(policy: TrustPolicy, runs: &[ValidationRun]) -> Self {
        let tracker = Self::new(policy);
        for run in runs {
            tracker.record_outcome(&run.agent_id, outcome_for(run));
        }
        tracker
    }

    /// Returns the scoring policy.
    #[must_use]
    pub const fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// Appends an outcome for an agent.
    pub fn record_outcome(&self, agent_id: &AgentId, outcome: AgentOutcome) {
        self.lock().entry(agent_id.clone()).or_default().push(outcome);
    }

    /// Returns the agent's trust score.
    #[must_use]
    pub fn trust_score(&self, agent_id: &AgentId) -> TrustScore {
        let outcomes = self.lock();
        outcomes
            .get(agent_id)
            .map_or(TrustScore::InsufficientData, |history| trust_score(history, &self.policy))
    }

    /// Returns the agent's profile, or `None` for an agent never seen.
    #[must_use]
    pub fn profile(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        let outcomes = self.lock();
        outcomes
            .get(agent_id)
            .map(|history| AgentProfile::from_outcomes(agent_id.clone(), history, &self.policy))
    }

    /// Returns every known agent's profile ordered by agent id.
    #[must_use]
    pub fn profiles(&self) -> Vec<AgentProfile> {
        let outcomes = self.lock();
        outcomes
            .iter()
            .map(|(agent_id, history)| {
                AgentProfile::from_outcomes(agent_id.clone(), history, &self.policy)
            })
            .collect()
    }

    /// Locks the outcome table, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<AgentId, Vec<AgentOutcome>>> {
        match self.outcomes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Derives the attributed outcome of a validation run.
#[must_use]
pub fn outcome_for(run: &ValidationRun) -> AgentOutcome {
    AgentOutcome {
        verdict: run.verdict,
        findings: FindingCounts::from_findings(&run.findings),
    }
}
