// crates/story-gate-core/src/core/claims.rs
// ============================================================================
// Module: Story Gate Completion Claims
// Description: Completion claims extracted from agent output and their checks.
// Purpose: Record claim-vs-evidence cross-checks in the evidence bundle.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Claims are statements an agent makes about its own work ("fixed 3 errors",
//! "added tests"). Each claim is checked against the modified artifact paths
//! and the debt metrics of the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Kind of completion claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimKind {
    /// "fixed N errors".
    ErrorsFixed {
        /// Claimed number of fixed errors.
        count: u64,
    },
    /// "added ... tests".
    TestsAdded,
    /// "updated <path>".
    FileModified {
        /// Claimed path.
        path: String,
    },
    /// "coverage N%".
    Coverage {
        /// Claimed coverage percentage.
        percent: f64,
    },
    /// "refactored ...".
    Refactoring,
    /// "documentation updated".
    DocumentationUpdated,
}

/// Claim extracted from an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim kind and value.
    pub kind: ClaimKind,
    /// Source line the claim was extracted from.
    pub text: String,
    /// Index of the interaction the claim came from.
    pub interaction: usize,
}

/// Result of cross-checking a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Evidence supports the claim.
    Supported,
    /// Evidence contradicts the claim.
    Unsupported,
    /// No evidence is available either way.
    Unverifiable,
}

/// Claim plus its cross-check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimCheck {
    /// Extracted claim.
    pub claim: Claim,
    /// Check status.
    pub status: ClaimStatus,
    /// Human-readable explanation.
    pub note: String,
}

/// Claims stage policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPolicy {
    /// Unsupported claims fail the gate instead of attaching warnings.
    pub blocking: bool,
    /// Metric whose decrease backs "fixed N errors" claims.
    pub error_metric: String,
    /// Metric that backs "coverage N%" claims.
    pub coverage_metric: String,
}

impl Default for ClaimsPolicy {
    fn default() -> Self {
        Self {
            blocking: false,
            error_metric: "type_errors".to_string(),
            coverage_metric: "coverage".to_string(),
        }
    }
}
