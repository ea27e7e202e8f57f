// crates/story-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Story Gate Interfaces
// Description: Backend-agnostic interfaces for providers, stores, and signers.
// Purpose: Define the contract between the verification engine and its collaborators.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the orchestrator integrates with external systems:
//! the functional-check provider, the interaction log source, persistent
//! stores, and artifact signers. Implementations must be deterministic for
//! the same inputs and fail closed on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::Baseline;
use crate::core::BaselineEntry;
use crate::core::CostEvent;
use crate::core::HashDigest;
use crate::core::LedgerEntry;
use crate::core::MetricName;
use crate::core::Money;
use crate::core::ProjectId;
use crate::core::RunSignature;
use crate::core::StoryId;
use crate::core::TimeWindow;
use crate::core::Timestamp;
use crate::core::ValidationRun;

// ============================================================================
// SECTION: Functional Check Provider
// ============================================================================

/// Report returned by a functional check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionalReport {
    /// Whether the functional check passed.
    pub passed: bool,
    /// Debt metrics measured alongside the check.
    #[serde(default)]
    pub debt_metrics: BTreeMap<MetricName, f64>,
}

/// External provider errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Provider exceeded the caller-supplied timeout.
    #[error("provider timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },
    /// Provider failed.
    #[error("provider error: {0}")]
    Failed(String),
}

/// Opaque functional check (type checker, test runner, ...).
pub trait FunctionalCheckProvider: Send + Sync {
    /// Runs the functional check for a story.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the check cannot produce a report.
    fn run(&self, story_id: &StoryId) -> Result<FunctionalReport, ProviderError>;
}

// ============================================================================
// SECTION: Interaction Log Source
// ============================================================================

/// Read-only source of recorded agent interactions.
pub trait InteractionLogSource: Send + Sync {
    /// Returns the ordered interaction texts for a story.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the log cannot be read.
    fn interactions(&self, story_id: &StoryId) -> Result<Vec<String>, ProviderError>;
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Store errors shared by every persistent backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Write conflicts with existing data.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("store error: {0}")]
    Store(String),
}

/// Outcome of an atomic seed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedOutcome {
    /// A baseline already existed and was left untouched.
    Existing(Baseline),
    /// The entry became the first history entry.
    Seeded(Baseline),
}

/// Baseline history table keyed by `(project, metric)`.
///
/// Writes for the same key must be serialized.
pub trait BaselineStore: Send + Sync {
    /// Loads a baseline with its full history.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, project: &ProjectId, metric: &MetricName)
    -> Result<Option<Baseline>, StoreError>;

    /// Appends a history entry and returns the updated baseline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<Baseline, StoreError>;

    /// Appends `entry` only when no history exists for the key, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails.
    fn seed_if_absent(
        &self,
        project: &ProjectId,
        metric: &MetricName,
        entry: BaselineEntry,
    ) -> Result<SeedOutcome, StoreError>;

    /// Lists every baseline for a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list(&self, project: &ProjectId) -> Result<Vec<Baseline>, StoreError>;
}

/// Ledger append errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerAppendError {
    /// Event timestamp precedes the latest ledger entry.
    #[error("event at {attempted} precedes latest ledger entry at {latest}")]
    OutOfOrder {
        /// Latest recorded timestamp.
        latest: Timestamp,
        /// Rejected timestamp.
        attempted: Timestamp,
    },
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Append-only cost event log.
pub trait CostLedgerStore: Send + Sync {
    /// Appends an event with its computed cost atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerAppendError`] when the event is out of order or the store fails.
    fn append(&self, event: CostEvent, cost: Money) -> Result<LedgerEntry, LedgerAppendError>;

    /// Returns entries inside the window in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn entries(&self, window: &TimeWindow) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// Append-only validation run history keyed by story.
pub trait RunHistoryStore: Send + Sync {
    /// Appends a run; the run's sequence must be the next one for its story.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] for a duplicate or out-of-order sequence.
    fn append_run(&self, run: &ValidationRun) -> Result<(), StoreError>;

    /// Returns a story's runs ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn runs_for_story(&self, story_id: &StoryId) -> Result<Vec<ValidationRun>, StoreError>;

    /// Returns every run in the order it was appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn all_runs(&self) -> Result<Vec<ValidationRun>, StoreError>;
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Artifact signing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Key material is missing or invalid.
    #[error("signer key error: {0}")]
    Key(String),
    /// Signing failed.
    #[error("signing failed: {0}")]
    Sign(String),
    /// Signature did not verify.
    #[error("signature verification failed: {0}")]
    Verify(String),
}

/// Pluggable signer over a run's evidence digest.
pub trait ArtifactSigner: Send + Sync {
    /// Signs the digest.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] when signing fails.
    fn sign(&self, digest: &HashDigest) -> Result<RunSignature, SignerError>;
}

/// Verifier for detached run signatures.
pub trait ArtifactVerifier {
    /// Verifies a signature over the digest.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] when the signature is invalid.
    fn verify(&self, digest: &HashDigest, signature: &RunSignature) -> Result<(), SignerError>;
}
