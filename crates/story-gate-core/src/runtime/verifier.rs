// crates/story-gate-core/src/runtime/verifier.rs
// ============================================================================
// Module: Story Gate Run Verifier
// Description: Offline verification of validation run artifacts.
// Purpose: Detect edits to a stored run and check its detached signature.
// Dependencies: crate::{core, interfaces}, serde
// ============================================================================

//! ## Overview
//! A run is verified by recomputing the canonical digest of its evidence
//! bundle and comparing it to the recorded hash. When a verifier is supplied
//! the signature is checked as well; an unsigned run fails signature
//! verification only if a verifier was requested.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::ValidationRun;
use crate::interfaces::ArtifactVerifier;

// ============================================================================
// SECTION: Verification Types
// ============================================================================

/// Verification status for run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Verification succeeded.
    Pass,
    /// Verification failed.
    Fail,
}

/// Offline verification report for a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Verification status.
    pub status: VerificationStatus,
    /// Whether the evidence hash matched.
    pub hash_verified: bool,
    /// Whether a signature was checked and verified.
    pub signature_verified: bool,
    /// Error messages, if any.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a run's evidence hash and, when `verifier` is supplied, its signature.
#[must_use]
pub fn verify_run(run: &ValidationRun, verifier: Option<&dyn ArtifactVerifier>) -> VerificationReport {
    let mut errors = Vec::new();
    let hash_verified = match run.compute_evidence_hash(run.evidence_hash.algorithm) {
        Ok(actual) if actual == run.evidence_hash => true,
        Ok(actual) => {
            errors.push(format!(
                "evidence hash mismatch: recorded {}, computed {actual}",
                run.evidence_hash
            ));
            false
        }
        Err(err) => {
            errors.push(format!("evidence hash unavailable: {err}"));
            false
        }
    };

    let mut signature_verified = false;
    if let Some(verifier) = verifier {
        match &run.signature {
            Some(signature) => match verifier.verify(&run.evidence_hash, signature) {
                Ok(()) => signature_verified = true,
                Err(err) => errors.push(err.to_string()),
            },
            None => errors.push("run is not signed".to_string()),
        }
    }

    let status =
        if errors.is_empty() { VerificationStatus::Pass } else { VerificationStatus::Fail };
    VerificationReport {
        status,
        hash_verified,
        signature_verified,
        errors,
    }
}
